//! Virtual Machine for the 15-bit word architecture
//!
//! This module contains the execution engine: eight registers, an unbounded
//! stack, a program counter and 32768 words of transactional memory, driven
//! by a fixed 22-opcode instruction set.

mod errors;
mod execution;
mod input;
mod registers;
mod snapshot;
mod stack;
pub mod decoder;
pub mod types;

pub use decoder::{disassemble, fetch_decode, Disassembly};
pub use errors::{InstructionFault, VMError};
pub use input::{CharInput, InputEvent, ThreadedInput};
pub use registers::Registers;
pub use snapshot::MachineSnapshot;
pub use stack::VMStack;
pub use types::{
    Halt, HaltReason, Instruction, Opcode, Operand, StepState, Word, WriteMode, MAX_OPERAND,
    MEMORY_SIZE, REGISTER_BASE, REGISTER_COUNT, WORD_MASK,
};

// Main VM struct that coordinates components
pub(crate) mod vm;
pub use vm::VM;
