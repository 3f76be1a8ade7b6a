//! Text rendering for the debugger
//!
//! Hex dumps of memory and disassembly listings. Pure functions over word
//! slices so they can be used on any part of memory.

use crate::vm::{disassemble, Word};

/// Words per hex dump row
pub const DUMP_WIDTH: usize = 16;

/// Printable form of a word in the character column
fn display_char(word: Word) -> char {
    match u8::try_from(word) {
        Ok(byte) if byte.is_ascii_graphic() => byte as char,
        _ => '.',
    }
}

/// One dump row: `XXXXh: XXXX XXXX ...   chars`
pub fn format_row(address: usize, chunk: &[Word]) -> String {
    let hex_width = DUMP_WIDTH * 5 + 3;
    let values: Vec<String> = chunk.iter().map(|w| format!("{:04X}", w)).collect();
    let values = values.join(" ");
    let chars: String = chunk.iter().map(|w| display_char(*w)).collect();
    format!("{:04X}h: {:<width$}{}", address, values, chars, width = hex_width)
}

/// Hex dump of `words`, which start at `address`
pub fn hex_dump(address: usize, words: &[Word]) -> Vec<String> {
    words
        .chunks(DUMP_WIDTH)
        .enumerate()
        .map(|(i, chunk)| format_row(address + i * DUMP_WIDTH, chunk))
        .collect()
}

/// Disassembly of up to `count` instructions from `words`, which start at `address`
pub fn listing(address: usize, words: &[Word], count: usize) -> Vec<String> {
    disassemble(words)
        .take(count)
        .map(|(instruction, offset)| format!("{:04X}: {}", address + offset, instruction))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_row() {
        let row = format_row(0x10, &[0x41, 0x42, 0x0A, 0x8000]);
        assert!(row.starts_with("0010h: 0041 0042 000A 8000"));
        assert!(row.ends_with("AB.."));
        assert_eq!(row.len(), 7 + DUMP_WIDTH * 5 + 3 + 4);
    }

    #[test]
    fn test_hex_dump_rows() {
        let words = vec![0; 20];
        let rows = hex_dump(0x100, &words);
        assert_eq!(rows.len(), 2);
        assert!(rows[1].starts_with("0110h: "));
    }

    #[test]
    fn test_listing() {
        let words = vec![1, 32768, 4, 19, 32768, 0];
        let lines = listing(0x20, &words, 10);
        assert_eq!(lines, vec!["0020: set r0, 4", "0023: out r0", "0025: halt"]);
    }
}
