//! Instruction fetch and decode
//!
//! `fetch_decode` reads one instruction from any [`WordStorage`]; the
//! [`Disassembly`] iterator walks a memory slice instruction by instruction
//! for listing purposes.

use crate::storage::traits::WordStorage;
use crate::vm::errors::{InstructionFault, VMError};
use crate::vm::types::{next_address, Instruction, Opcode, Word};

/// Decode the instruction at `pc`.
///
/// Returns the instruction and the address following it. Argument reads
/// wrap at the end of the address space; reading past the end of `memory`
/// is a [`InstructionFault::Truncated`] error.
pub fn fetch_decode<M>(memory: &M, pc: Word) -> Result<(Instruction, Word), VMError>
where
    M: WordStorage + ?Sized,
{
    let word = memory
        .load(pc as usize)
        .ok_or(VMError::invalid(pc, InstructionFault::Truncated))?;
    let opcode = Opcode::from_word(word)
        .ok_or(VMError::invalid(pc, InstructionFault::UnknownOpcode(word)))?;

    let mut args = [0; 3];
    let mut next = next_address(pc);
    for slot in args.iter_mut().take(opcode.arity()) {
        *slot = memory
            .load(next as usize)
            .ok_or(VMError::invalid(pc, InstructionFault::Truncated))?;
        next = next_address(next);
    }

    Ok((Instruction::new(opcode, &args), next))
}

/// Lazy instruction listing over a memory slice.
///
/// Stops, without error, at the first word that does not decode, at a
/// truncated instruction, or at the end of the slice. Clone it to restart.
#[derive(Debug, Clone)]
pub struct Disassembly<'a> {
    memory: &'a [Word],
    offset: usize,
}

impl<'a> Disassembly<'a> {
    pub fn new(memory: &'a [Word]) -> Self {
        Self { memory, offset: 0 }
    }

    /// Offset of the next instruction within the slice
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl<'a> Iterator for Disassembly<'a> {
    /// `(instruction, offset within the slice)`
    type Item = (Instruction, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.memory.len() {
            return None;
        }

        let at = self.offset;
        match fetch_decode(self.memory, at as Word) {
            Ok((instruction, next)) if next as usize > at => {
                self.offset = next as usize;
                Some((instruction, at))
            }
            _ => {
                self.offset = self.memory.len();
                None
            }
        }
    }
}

/// Disassemble `memory` from its first word
pub fn disassemble(memory: &[Word]) -> Disassembly<'_> {
    Disassembly::new(memory)
}
