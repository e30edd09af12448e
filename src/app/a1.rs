//! A1 notation for worksheet ranges: 1-based row numbers, column letters.

use std::fmt;

use crate::constants::MAX_COLUMNS;
use crate::error::{CleanerError, Result};

const ALPHABET: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Column letter for a 0-based index: `A`..`Z`, then `AA`..`AZ`, then `BA`..`BZ`.
pub fn column_letter(index: usize) -> Result<String> {
    if index >= MAX_COLUMNS {
        return Err(CleanerError::InvalidColumnIndex(index));
    }
    let letter = ALPHABET[index % 26] as char;
    Ok(match index / 26 {
        0 => letter.to_string(),
        1 => format!("A{}", letter),
        _ => format!("B{}", letter),
    })
}

/// Inverse of [`column_letter`].
pub fn column_index(letters: &str) -> Option<usize> {
    if letters.is_empty() || letters.len() > 2 || !letters.bytes().all(|b| b.is_ascii_uppercase()) {
        return None;
    }
    let index = letters
        .bytes()
        .fold(0usize, |acc, b| acc * 26 + (b - b'A') as usize + 1)
        - 1;
    (index < MAX_COLUMNS).then_some(index)
}

/// One corner of a range. Either part may be open (`A:A`, `2:2`). Only
/// constructible with a column inside the 78-column window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRef {
    column: Option<usize>,
    row: Option<usize>,
}

impl CellRef {
    pub fn at(column: usize, row: usize) -> Result<Self> {
        column_letter(column)?;
        Ok(Self {
            column: Some(column),
            row: Some(row),
        })
    }

    pub fn whole_column(column: usize) -> Result<Self> {
        column_letter(column)?;
        Ok(Self {
            column: Some(column),
            row: None,
        })
    }

    /// 0-based column, if bounded.
    pub fn column(&self) -> Option<usize> {
        self.column
    }

    /// 1-based row, if bounded.
    pub fn row(&self) -> Option<usize> {
        self.row
    }

    fn parse(text: &str) -> Option<Self> {
        let split = text.find(|c: char| c.is_ascii_digit()).unwrap_or(text.len());
        let (letters, digits) = text.split_at(split);
        let column = if letters.is_empty() {
            None
        } else {
            Some(column_index(letters)?)
        };
        let row = if digits.is_empty() {
            None
        } else {
            match digits.parse::<usize>().ok()? {
                0 => return None,
                n => Some(n),
            }
        };
        if column.is_none() && row.is_none() {
            return None;
        }
        Some(Self { column, row })
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(column) = self.column {
            // constructors keep the column inside the window
            let letters = column_letter(column).map_err(|_| fmt::Error)?;
            write!(f, "{}", letters)?;
        }
        if let Some(row) = self.row {
            write!(f, "{}", row)?;
        }
        Ok(())
    }
}

/// A worksheet range such as `'Data sheet'!C2:C40`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct A1Range {
    sheet: String,
    start: CellRef,
    end: Option<CellRef>,
}

impl A1Range {
    pub fn cell(sheet: &str, column: usize, row: usize) -> Result<Self> {
        Ok(Self {
            sheet: sheet.to_string(),
            start: CellRef::at(column, row)?,
            end: None,
        })
    }

    /// Whole column, header included.
    pub fn column(sheet: &str, column: usize) -> Result<Self> {
        Ok(Self {
            sheet: sheet.to_string(),
            start: CellRef::whole_column(column)?,
            end: Some(CellRef::whole_column(column)?),
        })
    }

    /// `column{first_row}:column{last_row}`.
    pub fn column_span(sheet: &str, column: usize, first_row: usize, last_row: usize) -> Result<Self> {
        Ok(Self {
            sheet: sheet.to_string(),
            start: CellRef::at(column, first_row)?,
            end: Some(CellRef::at(column, last_row)?),
        })
    }

    /// `{first_column}row:{last_column}row`.
    pub fn row_span(sheet: &str, row: usize, first_column: usize, last_column: usize) -> Result<Self> {
        Ok(Self {
            sheet: sheet.to_string(),
            start: CellRef::at(first_column, row)?,
            end: Some(CellRef::at(last_column, row)?),
        })
    }

    /// Every column the cleaner reads, all rows.
    pub fn whole_sheet(sheet: &str) -> Self {
        Self {
            sheet: sheet.to_string(),
            start: CellRef {
                column: Some(0),
                row: Some(1),
            },
            end: Some(CellRef {
                column: Some(MAX_COLUMNS - 1),
                row: None,
            }),
        }
    }

    pub fn sheet(&self) -> &str {
        &self.sheet
    }

    pub fn start(&self) -> CellRef {
        self.start
    }

    pub fn end(&self) -> Option<CellRef> {
        self.end
    }

    pub fn parse(text: &str) -> Result<Self> {
        let invalid = || CleanerError::Api {
            message: format!("invalid A1 range '{}'", text),
        };

        let (sheet, cells) = text.rsplit_once('!').ok_or_else(invalid)?;
        let sheet = match sheet.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
            Some(quoted) => quoted.replace("''", "'"),
            None => sheet.to_string(),
        };

        let (start, end) = match cells.split_once(':') {
            Some((a, b)) => (
                CellRef::parse(a).ok_or_else(invalid)?,
                Some(CellRef::parse(b).ok_or_else(invalid)?),
            ),
            None => (CellRef::parse(cells).ok_or_else(invalid)?, None),
        };

        Ok(Self { sheet, start, end })
    }
}

impl fmt::Display for A1Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sheet.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            write!(f, "{}!{}", self.sheet, self.start)?;
        } else {
            write!(f, "'{}'!{}", self.sheet.replace('\'', "''"), self.start)?;
        }
        if let Some(end) = &self.end {
            write!(f, ":{}", end)?;
        }
        Ok(())
    }
}
