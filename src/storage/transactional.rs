//! Journaled, conflict-checked memory
//!
//! `TransactionalMemory` wraps committed word storage with an append-only
//! journal of pending writes. Reads see the latest journaled value for an
//! address, falling back to committed storage. `commit` applies the journal
//! only if every address still holds the value it had when it was written;
//! otherwise the transaction is rolled back and reported as corrupted.

use log::{debug, warn};
use std::collections::HashMap;

use crate::storage::errors::{StorageError, StorageResult};
use crate::storage::traits::WordStorage;
use crate::storage::word_store::WordStore;
use crate::vm::types::{Word, MAX_OPERAND};

/// One pending write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalEntry {
    pub address: usize,

    /// Committed value at the time of the write
    pub snapshot: Word,

    pub value: Word,
}

/// Committed storage plus a journal of uncommitted writes
#[derive(Debug, Clone)]
pub struct TransactionalMemory<S = WordStore>
where
    S: WordStorage,
{
    committed: S,

    journal: Vec<JournalEntry>,

    /// Latest journaled value per address
    pending: HashMap<usize, Word>,
}

impl<S> TransactionalMemory<S>
where
    S: WordStorage,
{
    /// Wrap committed storage with an empty journal
    pub fn new(committed: S) -> Self {
        Self {
            committed,
            journal: Vec::new(),
            pending: HashMap::new(),
        }
    }

    /// Number of addressable words
    pub fn size(&self) -> usize {
        self.committed.size()
    }

    /// Journal a write. Committed storage is not touched.
    pub fn write(&mut self, address: usize, value: Word) -> StorageResult<()> {
        let snapshot = self.committed.load(address).ok_or(StorageError::InvalidAddress {
            address,
            size: self.committed.size(),
        })?;
        if value > MAX_OPERAND {
            return Err(StorageError::InvalidValue { value });
        }

        self.journal.push(JournalEntry {
            address,
            snapshot,
            value,
        });
        self.pending.insert(address, value);
        Ok(())
    }

    /// Read through the journal; the latest pending write wins
    pub fn read(&self, address: usize) -> StorageResult<Word> {
        if let Some(value) = self.pending.get(&address) {
            return Ok(*value);
        }
        self.read_committed(address)
    }

    /// Read committed storage, ignoring the journal
    pub fn read_committed(&self, address: usize) -> StorageResult<Word> {
        self.committed.load(address).ok_or(StorageError::InvalidAddress {
            address,
            size: self.committed.size(),
        })
    }

    /// Whether any writes are pending
    pub fn has_pending(&self) -> bool {
        !self.journal.is_empty()
    }

    /// The pending writes in the order they were made
    pub fn journal(&self) -> &[JournalEntry] {
        &self.journal
    }

    /// Apply every pending write, or none of them.
    ///
    /// Fails with [`StorageError::CorruptedTransaction`] if committed storage
    /// no longer matches a snapshot; the transaction is rolled back first.
    pub fn commit(&mut self) -> StorageResult<()> {
        let conflict = self.journal.iter().find_map(|entry| {
            match self.committed.load(entry.address) {
                Some(found) if found == entry.snapshot => None,
                found => Some((entry.address, entry.snapshot, found.unwrap_or_default())),
            }
        });

        if let Some((address, expected, found)) = conflict {
            warn!(
                "Commit conflict at {:#06x}: expected {}, found {}; rolling back {} entries",
                address,
                expected,
                found,
                self.journal.len()
            );
            self.rollback();
            return Err(StorageError::CorruptedTransaction {
                address,
                expected,
                found,
            });
        }

        debug!("Committing {} journal entries", self.journal.len());
        for index in 0..self.journal.len() {
            let entry = self.journal[index];
            if let Err(err) = self.committed.store(entry.address, entry.value) {
                // Undo the entries already applied; snapshots still hold for the rest.
                warn!("Commit failed at {:#06x}: {}; rolling back", entry.address, err);
                self.rollback();
                return Err(err);
            }
        }
        self.journal.clear();
        self.pending.clear();
        Ok(())
    }

    /// Restore every journaled address to its snapshot and clear the journal
    pub fn rollback(&mut self) {
        let journal = std::mem::take(&mut self.journal);
        self.pending.clear();
        if !journal.is_empty() {
            debug!("Rolling back {} journal entries", journal.len());
        }
        // Every entry is attempted; one failed restore does not stop the rest.
        for entry in journal {
            if let Err(err) = self.committed.store(entry.address, entry.snapshot) {
                warn!("Rollback could not restore {:#06x}: {}", entry.address, err);
            }
        }
    }

    /// Committed storage
    pub fn committed(&self) -> &S {
        &self.committed
    }

    /// Committed storage, bypassing the journal.
    ///
    /// Changes made here to an address with a pending write make the next
    /// `commit` fail.
    pub fn committed_mut(&mut self) -> &mut S {
        &mut self.committed
    }

    /// Unwrap the committed storage, discarding the journal
    pub fn into_inner(self) -> S {
        self.committed
    }
}

impl Default for TransactionalMemory<WordStore> {
    fn default() -> Self {
        Self::new(WordStore::new())
    }
}

impl<S> WordStorage for TransactionalMemory<S>
where
    S: WordStorage,
{
    fn size(&self) -> usize {
        self.committed.size()
    }

    fn load(&self, address: usize) -> Option<Word> {
        self.read(address).ok()
    }

    fn store(&mut self, address: usize, value: Word) -> StorageResult<()> {
        self.write(address, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> TransactionalMemory<Vec<Word>> {
        TransactionalMemory::new(vec![0; 16])
    }

    #[test]
    fn test_write_is_not_committed() {
        let mut mem = memory();
        mem.write(3, 7).unwrap();
        assert_eq!(mem.read(3).unwrap(), 7);
        assert_eq!(mem.read_committed(3).unwrap(), 0);
        assert!(mem.has_pending());
    }

    #[test]
    fn test_write_validates_address_and_value() {
        let mut mem = memory();
        assert_eq!(
            mem.write(16, 1),
            Err(StorageError::InvalidAddress { address: 16, size: 16 })
        );
        assert_eq!(mem.write(0, 40000), Err(StorageError::InvalidValue { value: 40000 }));
        assert!(mem.write(0, MAX_OPERAND).is_ok());
        assert_eq!(mem.journal().len(), 1);
    }

    #[test]
    fn test_journal_keeps_every_write() {
        let mut mem = memory();
        mem.write(1, 10).unwrap();
        mem.write(1, 20).unwrap();
        assert_eq!(mem.journal().len(), 2);
        assert_eq!(mem.journal()[1], JournalEntry { address: 1, snapshot: 0, value: 20 });
        assert_eq!(mem.read(1).unwrap(), 20);
    }

    #[test]
    fn test_commit_applies_in_order() {
        let mut mem = memory();
        mem.write(1, 10).unwrap();
        mem.write(2, 11).unwrap();
        mem.write(1, 12).unwrap();
        mem.commit().unwrap();
        assert!(!mem.has_pending());
        assert_eq!(mem.read_committed(1).unwrap(), 12);
        assert_eq!(mem.read_committed(2).unwrap(), 11);
    }

    #[test]
    fn test_rollback_restores_snapshots() {
        let mut mem = TransactionalMemory::new(vec![5; 4]);
        mem.write(0, 1).unwrap();
        mem.write(0, 2).unwrap();
        mem.rollback();
        assert!(!mem.has_pending());
        assert_eq!(mem.read(0).unwrap(), 5);
        assert_eq!(mem.committed(), &vec![5; 4]);
    }

    #[test]
    fn test_commit_conflict_rolls_back() {
        let mut mem = memory();
        mem.write(2, 9).unwrap();
        mem.write(3, 4).unwrap();
        mem.committed_mut().store(2, 100).unwrap();

        let result = mem.commit();
        assert_eq!(
            result,
            Err(StorageError::CorruptedTransaction { address: 2, expected: 0, found: 100 })
        );
        assert!(!mem.has_pending());
        assert_eq!(mem.read_committed(2).unwrap(), 0);
        assert_eq!(mem.read_committed(3).unwrap(), 0);
    }

    #[test]
    fn test_commit_empty_journal() {
        let mut mem = memory();
        mem.commit().unwrap();
        assert!(!mem.has_pending());
    }

    /// Backing store whose writes to one address always fail
    #[derive(Debug, Clone)]
    struct FailingStore {
        words: Vec<Word>,
        broken: usize,
    }

    impl WordStorage for FailingStore {
        fn size(&self) -> usize {
            self.words.len()
        }

        fn load(&self, address: usize) -> Option<Word> {
            self.words.get(address).copied()
        }

        fn store(&mut self, address: usize, value: Word) -> StorageResult<()> {
            if address == self.broken {
                return Err(StorageError::InvalidAddress { address, size: self.words.len() });
            }
            self.words.store(address, value)
        }
    }

    fn failing() -> TransactionalMemory<FailingStore> {
        TransactionalMemory::new(FailingStore { words: vec![1; 8], broken: 5 })
    }

    #[test]
    fn test_failed_apply_undoes_partial_commit() {
        let mut mem = failing();
        mem.write(2, 20).unwrap();
        mem.write(5, 50).unwrap();
        mem.write(6, 60).unwrap();

        assert!(matches!(mem.commit(), Err(StorageError::InvalidAddress { address: 5, .. })));
        assert!(!mem.has_pending());
        assert_eq!(mem.committed().words, vec![1; 8]);
    }

    #[test]
    fn test_rollback_continues_past_failed_restore() {
        let mut mem = failing();
        mem.write(2, 20).unwrap();
        mem.write(5, 50).unwrap();
        mem.committed_mut().words[2] = 9;
        mem.committed_mut().words[6] = 9;
        mem.write(6, 60).unwrap();

        mem.rollback();
        assert!(!mem.has_pending());
        // snapshots were 1 for address 2 and 9 for address 6
        assert_eq!(mem.committed().words[2], 1);
        assert_eq!(mem.committed().words[6], 9);
        assert_eq!(mem.read(5).unwrap(), 1);
    }
}
