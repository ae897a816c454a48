//! A1-style cell addressing

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Largest column index xlsx allows (XFD)
pub const MAX_COL: u16 = 16_383;
/// Largest row index xlsx allows (1,048,576 rows)
pub const MAX_ROW: u32 = 1_048_575;
/// Largest one-based row number
pub const MAX_ROW_NUMBER: u32 = MAX_ROW + 1;

/// Whether `start..=end` is a non-empty span of one-based row numbers inside a sheet
pub fn is_row_span(start: u32, end: u32) -> bool {
    start >= 1 && start <= end && end <= MAX_ROW_NUMBER
}

/// A zero-based (row, column) position inside one sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellRef {
    pub row: u32,
    pub col: u16,
}

impl CellRef {
    pub fn new(row: u32, col: u16) -> Self {
        Self { row, col }
    }

    /// Parse `D64`, `$D$64` or `d64`
    pub fn parse(reference: &str) -> EngineResult<Self> {
        let cleaned: String = reference
            .trim()
            .chars()
            .filter(|c| *c != '$')
            .collect::<String>()
            .to_ascii_uppercase();

        let split = cleaned
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| EngineError::InvalidCellRef(reference.to_string()))?;
        let (letters, digits) = cleaned.split_at(split);

        if letters.is_empty()
            || letters.len() > 3
            || !letters.chars().all(|c| c.is_ascii_uppercase())
            || !digits.chars().all(|c| c.is_ascii_digit())
            || digits.starts_with('0')
        {
            return Err(EngineError::InvalidCellRef(reference.to_string()));
        }

        let col = letter_to_column_index(letters)
            .ok_or_else(|| EngineError::InvalidCellRef(reference.to_string()))?;
        let row_number: u32 = digits
            .parse()
            .map_err(|_| EngineError::InvalidCellRef(reference.to_string()))?;
        let row = row_number - 1;
        if row > MAX_ROW {
            return Err(EngineError::InvalidCellRef(reference.to_string()));
        }

        Ok(Self { row, col })
    }

    /// One-based row number as shown in spreadsheet UIs
    pub fn row_number(&self) -> u32 {
        self.row + 1
    }

    pub fn to_a1(&self) -> String {
        format!("{}{}", column_index_to_letter(self.col), self.row + 1)
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_a1())
    }
}

impl FromStr for CellRef {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Convert a column index to letters
///
/// Examples:
/// - 0 → A
/// - 25 → Z
/// - 26 → AA
pub fn column_index_to_letter(index: u16) -> String {
    let mut result = String::new();
    let mut idx = index as usize;

    loop {
        let remainder = idx % 26;
        result.insert(0, (b'A' + remainder as u8) as char);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }

    result
}

/// Convert column letters to an index (A → 0, AA → 26); `None` past XFD
pub fn letter_to_column_index(letters: &str) -> Option<u16> {
    if letters.is_empty() {
        return None;
    }
    let mut idx: u32 = 0;
    for c in letters.chars() {
        let c = c.to_ascii_uppercase();
        if !c.is_ascii_uppercase() {
            return None;
        }
        idx = idx * 26 + (c as u32 - 'A' as u32 + 1);
    }
    let idx = idx - 1;
    if idx > MAX_COL as u32 {
        return None;
    }
    Some(idx as u16)
}

/// A cell address qualified by its sheet
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellCoordinate {
    pub sheet: String,
    #[serde(rename = "cell")]
    pub cell_ref: String,
}

impl CellCoordinate {
    pub fn new(sheet: impl Into<String>, cell_ref: impl Into<String>) -> Self {
        Self {
            sheet: sheet.into(),
            cell_ref: cell_ref.into(),
        }
    }

    pub fn position(&self) -> EngineResult<CellRef> {
        CellRef::parse(&self.cell_ref)
    }
}

impl fmt::Display for CellCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'!{}", self.sheet, self.cell_ref)
    }
}
