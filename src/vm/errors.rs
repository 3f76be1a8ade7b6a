//! Error types for VM operations
//!
//! This module defines all possible error conditions that can occur during VM execution.
//! Halting is not an error; see [`crate::vm::types::StepState`].

use thiserror::Error;

use crate::storage::errors::StorageError;
use crate::vm::types::Word;

/// Why an instruction could not be decoded or executed
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InstructionFault {
    /// The opcode word has no entry in the opcode table
    #[error("unknown opcode {0}")]
    UnknownOpcode(Word),

    /// The instruction's arguments run past the end of memory
    #[error("ran off the memory block while decoding")]
    Truncated,

    /// A read operand outside 0..=32775
    #[error("invalid operand {0}")]
    InvalidOperand(Word),

    /// A write target that does not name a register
    #[error("write target {0} is not a register")]
    InvalidRegister(Word),
}

/// Error variants that can occur during VM execution
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VMError {
    /// Undecodable or ill-formed instruction; fatal to the run
    #[error("Invalid instruction at {address:#06x}: {fault}")]
    InvalidInstruction { address: Word, fault: InstructionFault },

    /// Absolute register index outside 32768..=32775
    #[error("Invalid register index {0}")]
    InvalidRegister(Word),

    /// `mod` with a zero divisor
    #[error("Division by zero at {address:#06x}")]
    DivisionByZero { address: Word },

    /// I/O error on the VM's input or output stream
    #[error("IO error: {0}")]
    IOError(String),

    /// Storage-related error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Snapshot could not be restored
    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl VMError {
    pub(crate) fn invalid(address: Word, fault: InstructionFault) -> Self {
        VMError::InvalidInstruction { address, fault }
    }
}

impl From<std::io::Error> for VMError {
    fn from(err: std::io::Error) -> Self {
        VMError::IOError(err.to_string())
    }
}
