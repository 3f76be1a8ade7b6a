use crate::vm::errors::VMError;
use crate::vm::types::{Word, REGISTER_BASE, REGISTER_COUNT};

/// Register file holding the eight general purpose registers.
///
/// Indices here are plain 0..8; absolute operand numbers (32768..=32775)
/// are converted by [`Registers::index_of`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registers {
    regs: [Word; REGISTER_COUNT],
}

impl Registers {
    /// Creates a zeroed register file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Converts an absolute register operand into a register index.
    pub fn index_of(absolute: Word) -> Option<usize> {
        absolute
            .checked_sub(REGISTER_BASE)
            .map(usize::from)
            .filter(|index| *index < REGISTER_COUNT)
    }

    /// Returns the value in register `index`.
    ///
    /// Returns [`VMError::InvalidRegister`] if `index` is out of bounds.
    pub fn get(&self, index: usize) -> Result<Word, VMError> {
        self.regs
            .get(index)
            .copied()
            .ok_or(VMError::InvalidRegister(absolute(index)))
    }

    /// Stores `value` in register `index`.
    pub fn set(&mut self, index: usize, value: Word) -> Result<(), VMError> {
        let slot = self
            .regs
            .get_mut(index)
            .ok_or(VMError::InvalidRegister(absolute(index)))?;
        *slot = value;
        Ok(())
    }

    pub fn as_array(&self) -> [Word; REGISTER_COUNT] {
        self.regs
    }

    pub fn replace(&mut self, values: [Word; REGISTER_COUNT]) {
        self.regs = values;
    }

    /// `(name, value)` pairs, `r0` first.
    pub fn named(&self) -> Vec<(String, Word)> {
        self.regs
            .iter()
            .enumerate()
            .map(|(i, v)| (format!("r{}", i), *v))
            .collect()
    }
}

fn absolute(index: usize) -> Word {
    REGISTER_BASE.saturating_add(index.min(Word::MAX as usize) as Word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_of() {
        assert_eq!(Registers::index_of(32768), Some(0));
        assert_eq!(Registers::index_of(32775), Some(7));
        assert_eq!(Registers::index_of(32776), None);
        assert_eq!(Registers::index_of(7), None);
    }

    #[test]
    fn test_get_set() {
        let mut regs = Registers::new();
        regs.set(3, 99).unwrap();
        assert_eq!(regs.get(3).unwrap(), 99);
        assert_eq!(regs.named()[3], ("r3".to_string(), 99));
        assert!(matches!(regs.set(8, 1), Err(VMError::InvalidRegister(32776))));
    }
}
