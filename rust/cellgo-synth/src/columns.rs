//! Column units and cursor positions.
//!
//! The engine works with byte columns internally, which is also what the Go
//! compiler reports. Clients may count columns in characters or UTF-16 code
//! units, so every crossing of that boundary goes through [`to_byte_col`] or
//! [`from_byte_col`].

use serde::{Deserialize, Serialize};

/// How a client counts columns within a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnUnit {
    Byte,
    Char,
    #[default]
    Utf16,
}

/// A 0-based (line, column) position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Cursor {
    pub line: usize,
    pub col: usize,
}

impl Cursor {
    pub fn new(line: usize, col: usize) -> Self {
        Self { line, col }
    }
}

fn unit_len(ch: char, unit: ColumnUnit) -> usize {
    match unit {
        ColumnUnit::Byte => ch.len_utf8(),
        ColumnUnit::Char => 1,
        ColumnUnit::Utf16 => ch.len_utf16(),
    }
}

/// Convert a column counted in `unit` into a byte offset within `line`.
///
/// Returns `None` when the column lands inside a character (for example
/// between the two halves of a surrogate pair) or past the end of the line.
pub fn to_byte_col(line: &str, col: usize, unit: ColumnUnit) -> Option<usize> {
    let mut units = 0;
    for (idx, ch) in line.char_indices() {
        if units == col {
            return Some(idx);
        }
        units += unit_len(ch, unit);
        if units > col {
            return None;
        }
    }
    (units == col).then_some(line.len())
}

/// Convert a byte offset within `line` into a column counted in `unit`.
///
/// Offsets past the end clamp to the end of the line; offsets inside a
/// character round down to its start.
pub fn from_byte_col(line: &str, byte_col: usize, unit: ColumnUnit) -> usize {
    line.char_indices()
        .take_while(|(idx, ch)| idx + ch.len_utf8() <= byte_col)
        .map(|(_, ch)| unit_len(ch, unit))
        .sum()
}

/// Like [`to_byte_col`], but snaps invalid columns to the nearest valid
/// byte offset at or before them.
pub fn to_byte_col_lossy(line: &str, col: usize, unit: ColumnUnit) -> usize {
    let mut units = 0;
    for (idx, ch) in line.char_indices() {
        let next = units + unit_len(ch, unit);
        if next > col {
            return idx;
        }
        units = next;
    }
    line.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "a\u{1F642}b";

    #[test]
    fn utf16_columns_resolve_to_byte_offsets() {
        assert_eq!(to_byte_col(TEXT, 1, ColumnUnit::Utf16), Some(1));
        assert_eq!(to_byte_col(TEXT, 3, ColumnUnit::Utf16), Some(5));
        assert_eq!(to_byte_col(TEXT, 2, ColumnUnit::Utf16), None);
        assert_eq!(to_byte_col(TEXT, 4, ColumnUnit::Utf16), Some(6));
        assert_eq!(to_byte_col(TEXT, 5, ColumnUnit::Utf16), None);
    }

    #[test]
    fn char_and_byte_units() {
        assert_eq!(to_byte_col(TEXT, 2, ColumnUnit::Char), Some(5));
        assert_eq!(to_byte_col(TEXT, 5, ColumnUnit::Byte), Some(5));
        assert_eq!(to_byte_col(TEXT, 3, ColumnUnit::Byte), None);
    }

    #[test]
    fn byte_offsets_back_to_units() {
        assert_eq!(from_byte_col(TEXT, 5, ColumnUnit::Utf16), 3);
        assert_eq!(from_byte_col(TEXT, 5, ColumnUnit::Char), 2);
        assert_eq!(from_byte_col(TEXT, 5, ColumnUnit::Byte), 5);
        // Inside the emoji: rounds down.
        assert_eq!(from_byte_col(TEXT, 3, ColumnUnit::Utf16), 1);
        // Past the end: clamps.
        assert_eq!(from_byte_col(TEXT, 40, ColumnUnit::Utf16), 4);
    }

    #[test]
    fn lossy_conversion_snaps_backwards() {
        assert_eq!(to_byte_col_lossy(TEXT, 2, ColumnUnit::Utf16), 1);
        assert_eq!(to_byte_col_lossy(TEXT, 3, ColumnUnit::Utf16), 5);
        assert_eq!(to_byte_col_lossy(TEXT, 99, ColumnUnit::Utf16), 6);
        assert_eq!(to_byte_col_lossy("", 3, ColumnUnit::Char), 0);
    }

    #[test]
    fn round_trip_on_ascii_is_identity() {
        let line = "func (k *Kg) Gain(lasagna K_g) {";
        for col in 0..=line.len() {
            let byte = to_byte_col(line, col, ColumnUnit::Utf16).unwrap();
            assert_eq!(from_byte_col(line, byte, ColumnUnit::Utf16), col);
        }
    }
}
