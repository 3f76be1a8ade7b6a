use serde::{Deserialize, Serialize};
use std::env;

use crate::vm::types::{Word, WriteMode, WORD_MASK};

/// Engine settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VMConfig {
    /// How instruction execution reaches memory
    pub write_mode: WriteMode,

    /// Address images are loaded at
    pub load_base: Word,
}

impl VMConfig {
    /// Read settings from `SYNVM_WRITE_MODE` and `SYNVM_LOAD_BASE`
    pub fn from_env() -> Self {
        let write_mode = env::var("SYNVM_WRITE_MODE").unwrap_or_else(|_| "direct".to_string());
        let load_base = env::var("SYNVM_LOAD_BASE").unwrap_or_else(|_| "0".to_string());

        Self {
            write_mode: WriteMode::from_str(&write_mode),
            load_base: parse_word(&load_base).unwrap_or(0),
        }
    }
}

/// Parse a decimal or `0x`-prefixed hex address, rejecting anything past 15 bits
pub fn parse_word(s: &str) -> Option<Word> {
    let s = s.trim();
    let value = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => Word::from_str_radix(hex, 16).ok()?,
        None => s.parse::<Word>().ok()?,
    };
    (value <= WORD_MASK).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_word() {
        assert_eq!(parse_word("42"), Some(42));
        assert_eq!(parse_word("0x7fff"), Some(0x7FFF));
        assert_eq!(parse_word("0x8000"), None);
        assert_eq!(parse_word("abc"), None);
    }

    #[test]
    fn test_default_config() {
        let config = VMConfig::default();
        assert_eq!(config.write_mode, WriteMode::Direct);
        assert_eq!(config.load_base, 0);
    }
}
