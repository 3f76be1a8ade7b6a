//! VM Operation execution logic
//!
//! This module provides the opcode handlers and the static dispatch table
//! that maps opcode numbers to them.
//!
//! Every handler follows the same discipline:
//! - read operands are resolved through the operand rule
//! - write targets stay raw and must name a register
//! - all operands are resolved before any state changes, so a failing
//!   handler leaves the machine untouched
//!
//! Handlers receive the address of the instruction being executed; the
//! program counter has already been moved past it.

use std::io::Write;
use std::sync::atomic::Ordering;

use crate::storage::traits::WordStorage;
use crate::vm::errors::{InstructionFault, VMError};
use crate::vm::input::{CharInput, InputEvent};
use crate::vm::registers::Registers;
use crate::vm::types::{HaltReason, Instruction, StepState, Word, WriteMode, WORD_MASK};
use crate::vm::vm::VM;

/// Signature shared by all opcode handlers
pub(crate) type Handler<I, O> = fn(&mut VM<I, O>, Word, &[Word]) -> Result<StepState, VMError>;

impl<I, O> VM<I, O>
where
    I: CharInput,
    O: Write,
{
    /// Handlers indexed by opcode number
    const HANDLERS: [Handler<I, O>; 22] = [
        Self::op_halt,
        Self::op_set,
        Self::op_push,
        Self::op_pop,
        Self::op_eq,
        Self::op_gt,
        Self::op_jmp,
        Self::op_jt,
        Self::op_jf,
        Self::op_add,
        Self::op_mult,
        Self::op_mod,
        Self::op_and,
        Self::op_or,
        Self::op_not,
        Self::op_rmem,
        Self::op_wmem,
        Self::op_call,
        Self::op_ret,
        Self::op_out,
        Self::op_in,
        Self::op_noop,
    ];

    pub(crate) fn dispatch(&mut self, address: Word, instruction: &Instruction) -> Result<StepState, VMError> {
        // The opcode table and the handler table have the same length, so
        // this index is always in bounds.
        let handler = Self::HANDLERS[instruction.opcode.code() as usize];
        handler(self, address, instruction.args())
    }

    /// Resolve a read operand
    fn read(&self, address: Word, raw: Word) -> Result<Word, VMError> {
        self.resolve(raw).map_err(|fault| VMError::invalid(address, fault))
    }

    /// Validate a write target and return its register index
    fn target(&self, address: Word, raw: Word) -> Result<usize, VMError> {
        Registers::index_of(raw).ok_or(VMError::invalid(address, InstructionFault::InvalidRegister(raw)))
    }

    fn load_word(&self, location: Word) -> Result<Word, VMError> {
        let location = location as usize;
        let word = match self.config.write_mode {
            WriteMode::Direct => self.memory.read_committed(location)?,
            WriteMode::Journaled => self.memory.read(location)?,
        };
        Ok(word)
    }

    fn store_word(&mut self, location: Word, value: Word) -> Result<(), VMError> {
        let location = location as usize;
        match self.config.write_mode {
            WriteMode::Direct => self.memory.committed_mut().store(location, value)?,
            WriteMode::Journaled => self.memory.write(location, value)?,
        }
        Ok(())
    }

    fn set_register(&mut self, index: usize, value: Word) -> Result<StepState, VMError> {
        self.registers.set(index, value)?;
        Ok(StepState::Running)
    }

    fn op_halt(&mut self, _address: Word, _args: &[Word]) -> Result<StepState, VMError> {
        Ok(StepState::Halted(HaltReason::Instruction))
    }

    fn op_set(&mut self, address: Word, args: &[Word]) -> Result<StepState, VMError> {
        let a = self.target(address, args[0])?;
        let b = self.read(address, args[1])?;
        self.set_register(a, b)
    }

    fn op_push(&mut self, address: Word, args: &[Word]) -> Result<StepState, VMError> {
        let a = self.read(address, args[0])?;
        self.stack.push(a);
        Ok(StepState::Running)
    }

    fn op_pop(&mut self, address: Word, args: &[Word]) -> Result<StepState, VMError> {
        let a = self.target(address, args[0])?;
        match self.stack.pop() {
            Some(value) => self.set_register(a, value & WORD_MASK),
            None => Ok(StepState::Halted(HaltReason::StackUnderflow)),
        }
    }

    fn op_eq(&mut self, address: Word, args: &[Word]) -> Result<StepState, VMError> {
        let a = self.target(address, args[0])?;
        let b = self.read(address, args[1])?;
        let c = self.read(address, args[2])?;
        self.set_register(a, Word::from(b == c))
    }

    fn op_gt(&mut self, address: Word, args: &[Word]) -> Result<StepState, VMError> {
        let a = self.target(address, args[0])?;
        let b = self.read(address, args[1])?;
        let c = self.read(address, args[2])?;
        self.set_register(a, Word::from(b > c))
    }

    fn op_jmp(&mut self, address: Word, args: &[Word]) -> Result<StepState, VMError> {
        self.pc = self.read(address, args[0])?;
        Ok(StepState::Running)
    }

    fn op_jt(&mut self, address: Word, args: &[Word]) -> Result<StepState, VMError> {
        let a = self.read(address, args[0])?;
        let b = self.read(address, args[1])?;
        if a != 0 {
            self.pc = b;
        }
        Ok(StepState::Running)
    }

    fn op_jf(&mut self, address: Word, args: &[Word]) -> Result<StepState, VMError> {
        let a = self.read(address, args[0])?;
        let b = self.read(address, args[1])?;
        if a == 0 {
            self.pc = b;
        }
        Ok(StepState::Running)
    }

    fn op_add(&mut self, address: Word, args: &[Word]) -> Result<StepState, VMError> {
        let a = self.target(address, args[0])?;
        let b = self.read(address, args[1])?;
        let c = self.read(address, args[2])?;
        self.set_register(a, b.wrapping_add(c) & WORD_MASK)
    }

    fn op_mult(&mut self, address: Word, args: &[Word]) -> Result<StepState, VMError> {
        let a = self.target(address, args[0])?;
        let b = self.read(address, args[1])? as u32;
        let c = self.read(address, args[2])? as u32;
        self.set_register(a, ((b * c) & WORD_MASK as u32) as Word)
    }

    fn op_mod(&mut self, address: Word, args: &[Word]) -> Result<StepState, VMError> {
        let a = self.target(address, args[0])?;
        let b = self.read(address, args[1])?;
        let c = self.read(address, args[2])?;
        if c == 0 {
            return Err(VMError::DivisionByZero { address });
        }
        self.set_register(a, b % c)
    }

    fn op_and(&mut self, address: Word, args: &[Word]) -> Result<StepState, VMError> {
        let a = self.target(address, args[0])?;
        let b = self.read(address, args[1])?;
        let c = self.read(address, args[2])?;
        self.set_register(a, b & c)
    }

    fn op_or(&mut self, address: Word, args: &[Word]) -> Result<StepState, VMError> {
        let a = self.target(address, args[0])?;
        let b = self.read(address, args[1])?;
        let c = self.read(address, args[2])?;
        self.set_register(a, b | c)
    }

    fn op_not(&mut self, address: Word, args: &[Word]) -> Result<StepState, VMError> {
        let a = self.target(address, args[0])?;
        let b = self.read(address, args[1])?;
        self.set_register(a, b ^ WORD_MASK)
    }

    fn op_rmem(&mut self, address: Word, args: &[Word]) -> Result<StepState, VMError> {
        let a = self.target(address, args[0])?;
        let b = self.read(address, args[1])?;
        // Memory may hold raw register operands; they collapse like any operand.
        let word = self.load_word(b)?;
        let value = self.read(address, word)?;
        self.set_register(a, value)
    }

    fn op_wmem(&mut self, address: Word, args: &[Word]) -> Result<StepState, VMError> {
        let a = self.read(address, args[0])?;
        let b = self.read(address, args[1])?;
        self.store_word(a, b)?;
        Ok(StepState::Running)
    }

    fn op_call(&mut self, address: Word, args: &[Word]) -> Result<StepState, VMError> {
        let a = self.read(address, args[0])?;
        self.stack.push(self.pc);
        self.pc = a;
        Ok(StepState::Running)
    }

    fn op_ret(&mut self, _address: Word, _args: &[Word]) -> Result<StepState, VMError> {
        match self.stack.pop() {
            Some(target) => {
                self.pc = target & WORD_MASK;
                Ok(StepState::Running)
            }
            None => Ok(StepState::Halted(HaltReason::StackUnderflow)),
        }
    }

    fn op_out(&mut self, address: Word, args: &[Word]) -> Result<StepState, VMError> {
        let a = self.read(address, args[0])?;
        // Byte values pass through untouched so `in`/`out` echo arbitrary bytes.
        // Wider values are written as the UTF-8 encoding of that code point.
        match u8::try_from(a) {
            Ok(byte) => self.output.write_all(&[byte])?,
            Err(_) => {
                let ch = char::from_u32(a as u32).unwrap_or(char::REPLACEMENT_CHARACTER);
                let mut buf = [0u8; 4];
                self.output.write_all(ch.encode_utf8(&mut buf).as_bytes())?;
            }
        }
        Ok(StepState::Running)
    }

    fn op_in(&mut self, address: Word, args: &[Word]) -> Result<StepState, VMError> {
        let a = self.target(address, args[0])?;
        self.output.flush()?;

        match self.input.read_byte(&self.interrupt)? {
            InputEvent::Byte(byte) => self.set_register(a, Word::from(byte)),
            InputEvent::Closed => {
                self.pc = address;
                Ok(StepState::Halted(HaltReason::InputClosed))
            }
            InputEvent::Cancelled => {
                self.interrupt.store(false, Ordering::SeqCst);
                self.pc = address;
                Ok(StepState::Halted(HaltReason::Cancelled))
            }
        }
    }

    fn op_noop(&mut self, _address: Word, _args: &[Word]) -> Result<StepState, VMError> {
        Ok(StepState::Running)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, ErrorKind, Read};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use crate::vm::errors::{InstructionFault, VMError};
    use crate::vm::types::{Halt, HaltReason, StepState, Word, WriteMode};
    use crate::vm::vm::tests::vm_with;
    use crate::vm::vm::VM;

    const R0: Word = 32768;
    const R1: Word = 32769;
    const R2: Word = 32770;

    #[test]
    fn test_add_wraps() {
        let mut vm = vm_with(&[9, R0, 32758, 15], "");
        vm.step().unwrap();
        assert_eq!(vm.read_reg(R0).unwrap(), 5);
    }

    #[test]
    fn test_mult_wraps() {
        let mut vm = vm_with(&[10, R0, 32767, 2], "");
        vm.step().unwrap();
        assert_eq!(vm.read_reg(R0).unwrap(), 32766);
    }

    #[test]
    fn test_mod_by_zero() {
        let mut vm = vm_with(&[11, R0, 5, 0], "");
        assert_eq!(vm.step(), Err(VMError::DivisionByZero { address: 0 }));
        assert_eq!(vm.pc(), 0);
    }

    #[test]
    fn test_not_is_fifteen_bit() {
        let mut vm = vm_with(&[14, R0, 0, 14, R1, R0], "");
        vm.step().unwrap();
        vm.step().unwrap();
        assert_eq!(vm.read_reg(R0).unwrap(), 0x7FFF);
        assert_eq!(vm.read_reg(R1).unwrap(), 0);
    }

    #[test]
    fn test_write_target_must_be_register() {
        let mut vm = vm_with(&[1, 5, 7], "");
        assert_eq!(
            vm.step(),
            Err(VMError::InvalidInstruction { address: 0, fault: InstructionFault::InvalidRegister(5) })
        );
    }

    #[test]
    fn test_invalid_read_operand() {
        let mut vm = vm_with(&[2, 40000], "");
        assert_eq!(
            vm.step(),
            Err(VMError::InvalidInstruction { address: 0, fault: InstructionFault::InvalidOperand(40000) })
        );
        assert!(vm.stack().is_empty());
    }

    #[test]
    fn test_pop_empty_halts() {
        let mut vm = vm_with(&[3, R0], "");
        assert_eq!(vm.step().unwrap(), StepState::Halted(HaltReason::StackUnderflow));
    }

    #[test]
    fn test_in_reads_byte() {
        let mut vm = vm_with(&[20, R2, 20, R2], "A");
        vm.step().unwrap();
        assert_eq!(vm.read_reg(R2).unwrap(), 65);
        assert_eq!(vm.step().unwrap(), StepState::Halted(HaltReason::InputClosed));
        assert_eq!(vm.pc(), 2);
    }

    #[test]
    fn test_rmem_resolves_register_words() {
        // rmem r0, 3 where memory[3] holds the operand for r1
        let mut vm = vm_with(&[15, R0, 3, R1], "");
        vm.write_reg(R1, 77).unwrap();
        vm.step().unwrap();
        assert_eq!(vm.read_reg(R0).unwrap(), 77);
    }

    #[test]
    fn test_wmem_direct_bypasses_journal() {
        let mut vm = vm_with(&[16, 100, 42], "");
        vm.step().unwrap();
        assert_eq!(vm.peek(100, Some(1)), &[42]);
        assert!(!vm.memory().has_pending());
    }

    #[test]
    fn test_wmem_journaled_can_roll_back() {
        let mut vm = vm_with(&[16, 100, 42, 15, R0, 100], "");
        vm.set_write_mode(WriteMode::Journaled);
        vm.step().unwrap();
        vm.step().unwrap();
        assert_eq!(vm.read_reg(R0).unwrap(), 42);
        assert_eq!(vm.peek(100, Some(1)), &[0]);
        vm.memory_mut().rollback();
        assert_eq!(vm.memory().read(100).unwrap(), 0);
    }

    #[test]
    fn test_out_writes_bytes_verbatim() {
        // out 0xE9; out 0x41; out 0x100
        let mut vm = vm_with(&[19, 0xE9, 19, 0x41, 19, 0x100], "");
        for _ in 0..3 {
            vm.step().unwrap();
        }
        assert_eq!(vm.output(), &vec![0xE9, 0x41, 0xC4, 0x80]);
    }

    /// Raises the interrupt flag and reports the read as interrupted
    struct InterruptedRead(Arc<AtomicBool>);

    impl Read for InterruptedRead {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            self.0.store(true, Ordering::SeqCst);
            Err(io::Error::from(ErrorKind::Interrupted))
        }
    }

    #[test]
    fn test_in_interrupted_read_is_not_executed() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut vm = VM::with_io(InterruptedRead(Arc::clone(&flag)), Vec::new());
        vm.set_interrupt_handle(Arc::clone(&flag));
        // set r2 7; in r2
        let program: Vec<u8> = [1, R2, 7, 20, R2].iter().flat_map(|w: &Word| w.to_le_bytes()).collect();
        vm.load_image(&program, 0).unwrap();

        vm.step().unwrap();
        assert_eq!(vm.step().unwrap(), StepState::Halted(HaltReason::Cancelled));
        assert_eq!(vm.pc(), 3);
        assert_eq!(vm.read_reg(R2).unwrap(), 7);
        assert!(!flag.load(Ordering::SeqCst));

        let halt = vm.execute().unwrap();
        assert_eq!(halt, Halt { address: 3, reason: HaltReason::Cancelled });
        assert_eq!(vm.pc(), 3);
        assert_eq!(vm.read_reg(R2).unwrap(), 7);
    }
}
