//! Word storage for the VM
//!
//! - `WordStore`: committed memory, loaded from images
//! - `TransactionalMemory`: journaled writes with commit and rollback
//! - `WordStorage`: the load/store seam both of them (and word slices) implement

pub mod errors;
pub mod traits;
pub mod transactional;
pub mod word_store;

pub use errors::{StorageError, StorageResult};
pub use traits::WordStorage;
pub use transactional::{JournalEntry, TransactionalMemory};
pub use word_store::WordStore;
