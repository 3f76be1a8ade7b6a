pub mod cli;
pub mod config;
pub mod storage;
pub mod vm;

pub use crate::config::VMConfig;
pub use crate::storage::{StorageError, StorageResult, TransactionalMemory, WordStorage, WordStore};
pub use crate::vm::{Halt, HaltReason, Opcode, StepState, VMError, Word, WriteMode, VM};
