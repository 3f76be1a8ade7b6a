use std::fmt;

use crate::vm::types::Word;

/// Word storage and transaction errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Address outside the store
    InvalidAddress {
        address: usize,
        size: usize
    },

    /// Value that is neither a literal nor a register operand
    InvalidValue {
        value: Word
    },

    /// Committed storage changed underneath a pending transaction.
    /// The transaction has already been rolled back when this is returned.
    CorruptedTransaction {
        address: usize,
        expected: Word,
        found: Word
    },

    /// Image does not fit between the load base and the end of memory
    ImageTooLarge {
        base: usize,
        words: usize,
        size: usize
    },

    /// Image byte count is not a whole number of 16-bit words
    TruncatedImage {
        bytes: usize
    },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::InvalidAddress { address, size } =>
                write!(f, "Invalid address {} (store holds {} words)", address, size),

            StorageError::InvalidValue { value } =>
                write!(f, "Invalid value {}: not a word or register operand", value),

            StorageError::CorruptedTransaction { address, expected, found } =>
                write!(f, "Memory view is corrupted at address {}: expected {}, found {}; transaction rolled back",
                       address, expected, found),

            StorageError::ImageTooLarge { base, words, size } =>
                write!(f, "Image of {} words does not fit at base {} in a {}-word store",
                       words, base, size),

            StorageError::TruncatedImage { bytes } =>
                write!(f, "Image length {} is not a multiple of the 2-byte word size", bytes),
        }
    }
}

impl std::error::Error for StorageError {}

/// Define a standard Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
