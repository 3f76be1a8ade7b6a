use crate::storage::errors::{StorageError, StorageResult};
use crate::vm::types::Word;

/// Word-addressed storage.
///
/// Implemented by the committed [`WordStore`](crate::storage::WordStore), by
/// plain word slices (for decoding detached memory images), and by
/// [`TransactionalMemory`](crate::storage::TransactionalMemory), whose view
/// includes pending journal entries.
pub trait WordStorage {
    /// Number of addressable words
    fn size(&self) -> usize;

    /// Word at `address`, or `None` past the end
    fn load(&self, address: usize) -> Option<Word>;

    /// Write `value` at `address`
    fn store(&mut self, address: usize, value: Word) -> StorageResult<()>;
}

impl WordStorage for [Word] {
    fn size(&self) -> usize {
        self.len()
    }

    fn load(&self, address: usize) -> Option<Word> {
        self.get(address).copied()
    }

    fn store(&mut self, address: usize, value: Word) -> StorageResult<()> {
        let size = self.len();
        let slot = self
            .get_mut(address)
            .ok_or(StorageError::InvalidAddress { address, size })?;
        *slot = value;
        Ok(())
    }
}

impl WordStorage for Vec<Word> {
    fn size(&self) -> usize {
        self.as_slice().size()
    }

    fn load(&self, address: usize) -> Option<Word> {
        self.as_slice().load(address)
    }

    fn store(&mut self, address: usize, value: Word) -> StorageResult<()> {
        self.as_mut_slice().store(address, value)
    }
}
