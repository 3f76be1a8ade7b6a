//! Main Virtual Machine implementation
//!
//! This module brings together the register file, stack, and transactional
//! memory to implement the execution engine.
//!
//! The VM struct is the central coordinator that:
//! - Fetches and decodes instructions at the program counter
//! - Dispatches them through the static opcode table (see `execution.rs`)
//! - Exposes architectural state for inspection and patching
//! - Runs to a halt, or until its interrupt flag is raised
//!
//! Memory traffic from instructions goes to committed storage or through
//! the journal depending on [`WriteMode`].

use log::{info, trace};
use std::borrow::Cow;
use std::fmt;
use std::io::{self, Stdout, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::VMConfig;
use crate::storage::traits::WordStorage;
use crate::storage::transactional::TransactionalMemory;
use crate::storage::word_store::WordStore;
use crate::vm::decoder::fetch_decode;
use crate::vm::errors::{InstructionFault, VMError};
use crate::vm::input::{CharInput, ThreadedInput};
use crate::vm::registers::Registers;
use crate::vm::stack::VMStack;
use crate::vm::types::{
    Halt, HaltReason, Instruction, Operand, StepState, Word, WriteMode, REGISTER_COUNT, WORD_MASK,
};

/// The virtual machine
///
/// `I` supplies characters to `in`, `O` receives characters from `out`.
pub struct VM<I = ThreadedInput, O = Stdout>
where
    I: CharInput,
    O: Write,
{
    pub(crate) registers: Registers,

    pub(crate) stack: VMStack,

    pub(crate) pc: Word,

    pub(crate) memory: TransactionalMemory<WordStore>,

    pub(crate) config: VMConfig,

    pub(crate) input: I,

    pub(crate) output: O,

    pub(crate) interrupt: Arc<AtomicBool>,
}

impl VM<ThreadedInput, Stdout> {
    /// Create a VM wired to the process's standard input and output
    pub fn new() -> Self {
        Self::with_io(ThreadedInput::stdin(), io::stdout())
    }
}

impl Default for VM<ThreadedInput, Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I, O> VM<I, O>
where
    I: CharInput,
    O: Write,
{
    /// Create a VM with the given character streams and default settings
    pub fn with_io(input: I, output: O) -> Self {
        Self::with_config(VMConfig::default(), input, output)
    }

    /// Create a VM with explicit settings
    pub fn with_config(config: VMConfig, input: I, output: O) -> Self {
        Self {
            registers: Registers::new(),
            stack: VMStack::new(),
            pc: 0,
            memory: TransactionalMemory::default(),
            config,
            input,
            output,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &VMConfig {
        &self.config
    }

    /// Switch how instructions reach memory. Pending journal entries are kept.
    pub fn set_write_mode(&mut self, mode: WriteMode) {
        self.config.write_mode = mode;
    }

    /// Copy a little-endian word image into committed memory at `base`
    pub fn load_image(&mut self, image: &[u8], base: usize) -> Result<usize, VMError> {
        Ok(self.memory.committed_mut().load_image(image, base)?)
    }

    /// Flag that stops `execute` (and a blocked `in`) when raised
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Share an existing interrupt flag with this VM
    pub fn set_interrupt_handle(&mut self, flag: Arc<AtomicBool>) {
        self.interrupt = flag;
    }

    /// Registers as `(name, value)` pairs, `r0` first
    pub fn regs(&self) -> Vec<(String, Word)> {
        self.registers.named()
    }

    pub fn registers(&self) -> [Word; REGISTER_COUNT] {
        self.registers.as_array()
    }

    /// Replace the whole register file; values must be 15-bit
    pub fn set_registers(&mut self, values: [Word; REGISTER_COUNT]) -> Result<(), VMError> {
        if let Some(bad) = values.iter().find(|v| **v > WORD_MASK) {
            return Err(VMError::Deserialization(format!("register value {} is not a 15-bit word", bad)));
        }
        self.registers.replace(values);
        Ok(())
    }

    /// Current program counter
    pub fn pc(&self) -> Word {
        self.pc
    }

    /// Move the program counter; the address is reduced to 15 bits
    pub fn set_pc(&mut self, pc: Word) {
        self.pc = pc & WORD_MASK;
    }

    /// Stack contents, bottom first
    pub fn stack(&self) -> &[Word] {
        self.stack.as_slice()
    }

    /// Replace the stack; values must be 15-bit
    pub fn set_stack(&mut self, values: Vec<Word>) -> Result<(), VMError> {
        if let Some(bad) = values.iter().find(|v| **v > WORD_MASK) {
            return Err(VMError::Deserialization(format!("stack value {} is not a 15-bit word", bad)));
        }
        self.stack.replace(values);
        Ok(())
    }

    /// Committed memory from `address`; `None` reads to the end
    pub fn peek(&self, address: usize, length: Option<usize>) -> &[Word] {
        self.memory.committed().peek(address, length)
    }

    /// Memory as instructions see it: committed storage in direct mode,
    /// committed storage overlaid with the journal in journaled mode
    pub fn memory_view(&self, address: usize, length: Option<usize>) -> Cow<'_, [Word]> {
        let committed = self.peek(address, length);
        match self.config.write_mode {
            WriteMode::Direct => Cow::Borrowed(committed),
            WriteMode::Journaled => {
                let start = address.min(self.memory.size());
                Cow::Owned(
                    (start..start + committed.len())
                        .map(|location| self.memory.load(location).unwrap_or_default())
                        .collect(),
                )
            }
        }
    }

    pub fn memory(&self) -> &TransactionalMemory<WordStore> {
        &self.memory
    }

    /// The transactional layer, for pokes, commits and rollbacks
    pub fn memory_mut(&mut self) -> &mut TransactionalMemory<WordStore> {
        &mut self.memory
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }

    /// Read a register by absolute operand number (32768..=32775)
    pub fn read_reg(&self, register: Word) -> Result<Word, VMError> {
        let index = Registers::index_of(register).ok_or(VMError::InvalidRegister(register))?;
        self.registers.get(index)
    }

    /// Write a register by absolute operand number. `value` is resolved as an
    /// operand, so a register operand copies that register.
    pub fn write_reg(&mut self, register: Word, value: Word) -> Result<(), VMError> {
        let index = Registers::index_of(register).ok_or(VMError::InvalidRegister(register))?;
        let value = self.value(value)?;
        self.registers.set(index, value)
    }

    /// Resolve a raw operand: literals denote themselves, register operands
    /// denote the register's contents
    pub fn value(&self, raw: Word) -> Result<Word, VMError> {
        self.resolve(raw).map_err(|fault| VMError::invalid(self.pc, fault))
    }

    pub(crate) fn resolve(&self, raw: Word) -> Result<Word, InstructionFault> {
        match Operand::decode(raw) {
            Some(Operand::Literal(value)) => Ok(value),
            Some(Operand::Register(index)) => self
                .registers
                .get(index)
                .map_err(|_| InstructionFault::InvalidRegister(raw)),
            None => Err(InstructionFault::InvalidOperand(raw)),
        }
    }

    /// Decode the instruction at `pc` without executing it
    pub fn fetch(&self, pc: Word) -> Result<(Instruction, Word), VMError> {
        match self.config.write_mode {
            WriteMode::Direct => fetch_decode(self.memory.committed(), pc),
            WriteMode::Journaled => fetch_decode(&self.memory, pc),
        }
    }

    /// Execute one instruction.
    ///
    /// On error the machine is left exactly as it was before the call.
    pub fn step(&mut self) -> Result<StepState, VMError> {
        let address = self.pc;
        let (instruction, next) = self.fetch(address)?;
        trace!("{:#06x}: {}", address, instruction);

        self.pc = next;
        let result = self.dispatch(address, &instruction);
        if result.is_err() {
            self.pc = address;
        }
        result
    }

    /// Run until the program halts or the interrupt flag is raised
    pub fn execute(&mut self) -> Result<Halt, VMError> {
        self.interrupt.store(false, Ordering::SeqCst);

        let halt = loop {
            if self.interrupt.swap(false, Ordering::SeqCst) {
                break Halt {
                    address: self.pc,
                    reason: HaltReason::Cancelled,
                };
            }

            let address = self.pc;
            match self.step() {
                Ok(StepState::Running) => {}
                Ok(StepState::Halted(reason)) => break Halt { address, reason },
                Err(err) => {
                    self.output.flush()?;
                    return Err(err);
                }
            }
        };

        self.output.flush()?;
        info!("HALTED: stopped at address {} ({:04X}): {}", halt.address, halt.address, halt.reason);
        Ok(halt)
    }
}

impl<I, O> fmt::Debug for VM<I, O>
where
    I: CharInput,
    O: Write,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VM")
            .field("registers", &self.registers)
            .field("stack", &self.stack)
            .field("pc", &self.pc)
            .field("memory", &self.memory)
            .field("config", &self.config)
            .finish()
    }
}
