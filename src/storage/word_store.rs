//! Committed word storage
//!
//! A fixed block of 32768 raw words, the machine's addressable memory.

use log::debug;
use std::fmt;

use crate::storage::errors::{StorageError, StorageResult};
use crate::storage::traits::WordStorage;
use crate::vm::types::{Word, MEMORY_SIZE};

/// The machine's committed memory
#[derive(Clone, PartialEq, Eq)]
pub struct WordStore {
    words: Box<[Word]>,
}

impl WordStore {
    /// Create a zero-filled store
    pub fn new() -> Self {
        Self {
            words: vec![0; MEMORY_SIZE].into_boxed_slice(),
        }
    }

    /// Create a store from a full memory image
    pub fn from_words(words: Vec<Word>) -> StorageResult<Self> {
        if words.len() != MEMORY_SIZE {
            return Err(StorageError::ImageTooLarge {
                base: 0,
                words: words.len(),
                size: MEMORY_SIZE,
            });
        }
        Ok(Self {
            words: words.into_boxed_slice(),
        })
    }

    /// Copy a little-endian word image into memory starting at `base`.
    /// Returns the number of words loaded.
    pub fn load_image(&mut self, image: &[u8], base: usize) -> StorageResult<usize> {
        if image.len() % 2 != 0 {
            return Err(StorageError::TruncatedImage { bytes: image.len() });
        }

        let count = image.len() / 2;
        if base > MEMORY_SIZE || count > MEMORY_SIZE - base {
            return Err(StorageError::ImageTooLarge {
                base,
                words: count,
                size: MEMORY_SIZE,
            });
        }

        for (slot, pair) in self.words[base..base + count]
            .iter_mut()
            .zip(image.chunks_exact(2))
        {
            *slot = Word::from_le_bytes([pair[0], pair[1]]);
        }

        debug!("Loaded {} words at base {:#06x}", count, base);
        Ok(count)
    }

    /// Words from `address`, `length` of them or to the end of memory.
    /// The range is clamped to the store.
    pub fn peek(&self, address: usize, length: Option<usize>) -> &[Word] {
        let start = address.min(self.words.len());
        let end = match length {
            Some(length) => start.saturating_add(length).min(self.words.len()),
            None => self.words.len(),
        };
        &self.words[start..end]
    }

    /// Read a committed word
    pub fn get(&self, address: usize) -> StorageResult<Word> {
        self.load(address).ok_or(StorageError::InvalidAddress {
            address,
            size: self.words.len(),
        })
    }

    /// The whole store
    pub fn as_slice(&self) -> &[Word] {
        &self.words
    }
}

impl Default for WordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WordStorage for WordStore {
    fn size(&self) -> usize {
        self.words.len()
    }

    fn load(&self, address: usize) -> Option<Word> {
        self.words.get(address).copied()
    }

    fn store(&mut self, address: usize, value: Word) -> StorageResult<()> {
        self.words.store(address, value)
    }
}

impl fmt::Debug for WordStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let used = self.words.iter().filter(|word| **word != 0).count();
        write!(f, "WordStore {{ size: {}, nonzero: {} }}", self.words.len(), used)
    }
}
