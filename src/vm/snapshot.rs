//! Machine state snapshots
//!
//! Registers, program counter, stack and committed memory captured as one
//! serde value, so the debugger can persist and restore a session.

use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::storage::word_store::WordStore;
use crate::vm::errors::VMError;
use crate::vm::input::CharInput;
use crate::vm::types::{Word, MEMORY_SIZE, REGISTER_COUNT, WORD_MASK};
use crate::vm::vm::VM;

/// Architectural state of a VM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineSnapshot {
    pub registers: [Word; REGISTER_COUNT],
    pub pc: Word,
    pub stack: Vec<Word>,
    pub memory: Vec<Word>,
}

impl MachineSnapshot {
    pub fn to_json(&self) -> Result<String, VMError> {
        serde_json::to_string(self).map_err(|e| VMError::Deserialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, VMError> {
        serde_json::from_str(json).map_err(|e| VMError::Deserialization(e.to_string()))
    }
}

impl<I, O> VM<I, O>
where
    I: CharInput,
    O: Write,
{
    /// Capture registers, pc, stack and committed memory.
    /// Pending journal entries are not part of a snapshot.
    pub fn snapshot(&self) -> MachineSnapshot {
        MachineSnapshot {
            registers: self.registers(),
            pc: self.pc,
            stack: self.stack().to_vec(),
            memory: self.peek(0, None).to_vec(),
        }
    }

    /// Replace the machine state with `snapshot`, discarding pending writes.
    /// Nothing changes if the snapshot is invalid.
    pub fn restore(&mut self, snapshot: MachineSnapshot) -> Result<(), VMError> {
        if snapshot.pc > WORD_MASK {
            return Err(VMError::Deserialization(format!("pc {} is out of range", snapshot.pc)));
        }
        if snapshot.memory.len() != MEMORY_SIZE {
            return Err(VMError::Deserialization(format!(
                "memory holds {} words, expected {}",
                snapshot.memory.len(),
                MEMORY_SIZE
            )));
        }
        if snapshot
            .registers
            .iter()
            .chain(snapshot.stack.iter())
            .any(|v| *v > WORD_MASK)
        {
            return Err(VMError::Deserialization("register or stack value is not a 15-bit word".to_string()));
        }

        let store = WordStore::from_words(snapshot.memory)?;
        self.memory.rollback();
        *self.memory.committed_mut() = store;
        self.set_registers(snapshot.registers)?;
        self.set_stack(snapshot.stack)?;
        self.pc = snapshot.pc;
        Ok(())
    }
}
