use synvm::storage::{StorageError, TransactionalMemory, WordStorage, WordStore};

fn memory() -> TransactionalMemory<WordStore> {
    TransactionalMemory::default()
}

#[test]
fn test_last_write_wins() {
    let mut mem = memory();
    mem.write(10, 1).unwrap();
    mem.write(10, 2).unwrap();
    mem.write(10, 3).unwrap();

    assert_eq!(mem.read(10).unwrap(), 3);
    assert_eq!(mem.read_committed(10).unwrap(), 0);
    assert_eq!(mem.journal().len(), 3);

    mem.commit().unwrap();
    assert_eq!(mem.read_committed(10).unwrap(), 3);
    assert!(!mem.has_pending());
}

#[test]
fn test_rollback_restores_committed_view() {
    let mut committed = WordStore::new();
    committed.store(5, 99).unwrap();
    let mut mem = TransactionalMemory::new(committed);

    mem.write(5, 1).unwrap();
    mem.write(6, 2).unwrap();
    mem.rollback();

    assert_eq!(mem.read(5).unwrap(), 99);
    assert_eq!(mem.read(6).unwrap(), 0);
    assert!(mem.journal().is_empty());
}

#[test]
fn test_commit_conflict_rolls_back() {
    let mut mem = memory();
    mem.write(20, 7).unwrap();
    mem.write(21, 8).unwrap();

    // Someone changes committed storage behind the journal's back
    mem.committed_mut().store(21, 500).unwrap();

    let err = mem.commit().unwrap_err();
    assert_eq!(
        err,
        StorageError::CorruptedTransaction { address: 21, expected: 0, found: 500 }
    );

    // Snapshots are restored and nothing from the journal was applied
    assert!(!mem.has_pending());
    assert_eq!(mem.read(20).unwrap(), 0);
    assert_eq!(mem.read(21).unwrap(), 0);
}

#[test]
fn test_commit_of_empty_journal_is_noop() {
    let mut mem = memory();
    mem.commit().unwrap();
    assert!(mem.committed().as_slice().iter().all(|w| *w == 0));
}

#[test]
fn test_write_rejects_bad_address_and_value() {
    let mut mem = memory();
    assert_eq!(
        mem.write(0x8000, 1).unwrap_err(),
        StorageError::InvalidAddress { address: 0x8000, size: 0x8000 }
    );
    assert_eq!(
        mem.write(0, 40000).unwrap_err(),
        StorageError::InvalidValue { value: 40000 }
    );
    assert!(!mem.has_pending());
}

#[test]
fn test_register_operands_are_storable() {
    let mut mem = memory();
    mem.write(0, 32775).unwrap();
    mem.commit().unwrap();
    assert_eq!(mem.read(0).unwrap(), 32775);
}

#[test]
fn test_storage_trait_view_includes_journal() {
    let mut mem = memory();
    WordStorage::store(&mut mem, 3, 12).unwrap();

    assert_eq!(WordStorage::load(&mem, 3), Some(12));
    assert_eq!(WordStorage::load(&mem, 0x8000), None);
    assert_eq!(mem.committed().load(3), Some(0));
}

#[test]
fn test_small_backing_store() {
    let mut mem = TransactionalMemory::new(vec![1, 2, 3]);
    assert_eq!(mem.size(), 3);
    mem.write(2, 30).unwrap();
    mem.commit().unwrap();
    assert_eq!(mem.into_inner(), vec![1, 2, 30]);
}
