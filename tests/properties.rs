//! Property tests for operand resolution and arithmetic closure

use proptest::prelude::*;
use std::io::Cursor;

use synvm::vm::{Opcode, VMError, Word, MAX_OPERAND, REGISTER_BASE, VM, WORD_MASK};

type TestVM = VM<Cursor<Vec<u8>>, Vec<u8>>;

fn load(program: &[Word]) -> TestVM {
    let mut vm = VM::with_io(Cursor::new(Vec::new()), Vec::new());
    let bytes: Vec<u8> = program.iter().flat_map(|w| w.to_le_bytes()).collect();
    vm.load_image(&bytes, 0).unwrap();
    vm
}

fn register() -> impl Strategy<Value = Word> {
    REGISTER_BASE..=MAX_OPERAND
}

fn literal() -> impl Strategy<Value = Word> {
    0..=WORD_MASK
}

proptest! {
    #[test]
    fn write_then_read_register(reg in register(), value in literal()) {
        let mut vm = load(&[]);
        vm.write_reg(reg, value).unwrap();
        prop_assert_eq!(vm.read_reg(reg).unwrap(), value);
    }

    #[test]
    fn literals_resolve_to_themselves(value in literal()) {
        let vm = load(&[]);
        prop_assert_eq!(vm.value(value).unwrap(), value);
    }

    #[test]
    fn registers_resolve_to_contents(reg in register(), value in literal()) {
        let mut vm = load(&[]);
        vm.write_reg(reg, value).unwrap();
        prop_assert_eq!(vm.value(reg).unwrap(), value);
    }

    #[test]
    fn operands_past_registers_are_rejected(raw in (MAX_OPERAND + 1)..=Word::MAX) {
        let vm = load(&[]);
        prop_assert!(vm.value(raw).is_err());
        prop_assert_eq!(vm.read_reg(raw).unwrap_err(), VMError::InvalidRegister(raw));
    }

    #[test]
    fn add_and_mult_stay_in_range(a in literal(), b in literal()) {
        let r0 = REGISTER_BASE;
        let r1 = REGISTER_BASE + 1;
        let mut vm = load(&[
            Opcode::Add.code(), r0, a, b,
            Opcode::Mult.code(), r1, a, b,
        ]);
        vm.step().unwrap();
        vm.step().unwrap();

        let sum = vm.read_reg(r0).unwrap();
        let product = vm.read_reg(r1).unwrap();
        prop_assert!(sum <= WORD_MASK);
        prop_assert!(product <= WORD_MASK);
        prop_assert_eq!(sum as u32, (a as u32 + b as u32) % 32768);
        prop_assert_eq!(product as u32, (a as u32 * b as u32) % 32768);
    }

    #[test]
    fn not_is_an_involution(a in literal()) {
        let r0 = REGISTER_BASE;
        let mut vm = load(&[
            Opcode::Not.code(), r0, a,
            Opcode::Not.code(), r0, r0,
        ]);
        vm.step().unwrap();
        prop_assert!(vm.read_reg(r0).unwrap() <= WORD_MASK);
        vm.step().unwrap();
        prop_assert_eq!(vm.read_reg(r0).unwrap(), a);
    }

    #[test]
    fn opcode_codes_round_trip(code in 0u16..22) {
        let opcode = Opcode::try_from(code).unwrap();
        prop_assert_eq!(opcode.code(), code);
    }
}
