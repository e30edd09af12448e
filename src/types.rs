use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::constants::{COUNTRY, PROVINCE};

/// One cell as returned by the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Cell {
    pub fn blank() -> Self {
        Cell::Text(String::new())
    }

    /// Converts a raw JSON value from the store. Null becomes a blank cell
    /// and nested values keep their JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Cell::blank(),
            serde_json::Value::String(s) => Cell::Text(s.clone()),
            serde_json::Value::Bool(b) => Cell::Bool(*b),
            serde_json::Value::Number(n) => Cell::Number(n.as_f64().unwrap_or(f64::NAN)),
            other => Cell::Text(other.to_string()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Cell::Text(_) => "text",
            Cell::Number(_) => "number",
            Cell::Bool(_) => "boolean",
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Text(s) => write!(f, "{}", s),
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

/// One line-list row as read from a worksheet.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// 1-based row number in the worksheet. Only used to address write-backs.
    pub row: usize,
    pub cells: Vec<Cell>,
}

/// A disposable snapshot of one worksheet.
#[derive(Debug, Clone)]
pub struct SheetTable {
    pub name: String,
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl SheetTable {
    /// Builds a snapshot from raw rows, header first.
    ///
    /// Header names are trimmed and a nameless column right after `province`
    /// is taken to be `country`. Short rows are padded with blank cells so
    /// every record has one cell per column. Data rows are numbered from 2.
    pub fn from_values(name: &str, mut values: Vec<Vec<Cell>>) -> Self {
        if values.is_empty() {
            return Self {
                name: name.to_string(),
                columns: Vec::new(),
                records: Vec::new(),
            };
        }

        let header = values.remove(0);
        let mut columns: Vec<String> = Vec::with_capacity(header.len());
        for cell in &header {
            let trimmed = cell.to_string().trim().to_string();
            if trimmed.is_empty() && columns.last().map(String::as_str) == Some(PROVINCE) {
                columns.push(COUNTRY.to_string());
            } else {
                columns.push(trimmed);
            }
        }

        let width = columns.len();
        let records = values
            .into_iter()
            .enumerate()
            .map(|(i, mut cells)| {
                cells.truncate(width);
                cells.resize(width, Cell::blank());
                Record { row: i + 2, cells }
            })
            .collect();

        Self {
            name: name.to_string(),
            columns,
            records,
        }
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Text of `column` in `record`, if the column exists and holds text.
    pub fn text<'a>(&self, record: &'a Record, column: &str) -> Option<&'a str> {
        self.column_index(column)
            .and_then(|i| record.cells.get(i))
            .and_then(Cell::as_text)
    }
}

/// A cell that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub row: usize,
    pub id: String,
    pub column: String,
    pub value: String,
    /// Present only when a safe mechanical replacement exists.
    pub fix: Option<String>,
}

/// Violations split by whether they can be written back automatically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViolationTable {
    pub fixable: Vec<Violation>,
    pub unfixable: Vec<Violation>,
}

impl ViolationTable {
    pub fn is_empty(&self) -> bool {
        self.fixable.is_empty() && self.unfixable.is_empty()
    }
}

/// A row that survived validation, keyed by column name, on its way to the
/// combined dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseRecord {
    pub table: String,
    pub row: usize,
    pub id: String,
    pub fields: HashMap<String, String>,
}

impl CaseRecord {
    pub fn field(&self, column: &str) -> &str {
        self.fields.get(column).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, column: &str, value: impl Into<String>) {
        self.fields.insert(column.to_string(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[&str]) -> Vec<Cell> {
        values.iter().map(|v| Cell::from(*v)).collect()
    }

    #[test]
    fn test_header_repair_and_padding() {
        let table = SheetTable::from_values(
            "Data",
            vec![
                row(&["ID ", " age", "province", "", "notes"]),
                row(&["1", "30", "Hubei"]),
                row(&["2", "41", "Hubei", "China", "x", "overflow"]),
            ],
        );

        assert_eq!(table.columns, vec!["ID", "age", "province", "country", "notes"]);
        assert_eq!(table.records.len(), 2);
        assert_eq!(table.records[0].row, 2);
        assert_eq!(table.records[0].cells.len(), 5);
        assert_eq!(table.text(&table.records[0], "country"), Some(""));
        assert_eq!(table.records[1].row, 3);
        assert_eq!(table.records[1].cells.len(), 5);
    }

    #[test]
    fn test_cell_from_json() {
        assert_eq!(Cell::from_json(&serde_json::json!(null)), Cell::blank());
        assert_eq!(Cell::from_json(&serde_json::json!("x")), Cell::from("x"));
        assert_eq!(Cell::from_json(&serde_json::json!(4)), Cell::Number(4.0));
        assert_eq!(Cell::from_json(&serde_json::json!(true)).kind(), "boolean");
    }
}
