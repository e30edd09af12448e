use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use crate::app::a1::A1Range;
use crate::app::ports::{InputMode, SheetPort};
use crate::error::Result;
use crate::types::Cell;

type SheetKey = (String, String);

/// One write the store accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedWrite {
    pub spreadsheet_id: String,
    pub range: String,
    pub rows: Vec<Vec<String>>,
    pub mode: InputMode,
}

#[derive(Debug, Clone)]
struct ScheduledInsert {
    key: SheetKey,
    at_row: usize,
    reads_left: usize,
}

/// Worksheets held in memory, addressed like the remote store. Used for
/// dry runs and to replay concurrent edits in tests.
#[derive(Default)]
pub struct InMemorySheet {
    sheets: Mutex<HashMap<SheetKey, Vec<Vec<Cell>>>>,
    writes: Mutex<Vec<RecordedWrite>>,
    scheduled: Mutex<Option<ScheduledInsert>>,
}

impl InMemorySheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies each listed worksheet from `source` so later writes stay local.
    pub async fn mirror(source: Arc<dyn SheetPort>, sheets: &[(String, String)]) -> Result<Self> {
        let mirror = Self::new();
        for (spreadsheet_id, name) in sheets {
            let values = source
                .read_range(spreadsheet_id, &A1Range::whole_sheet(name))
                .await?;
            debug!(sheet = %name, rows = values.len(), "mirrored worksheet");
            mirror.put(spreadsheet_id, name, values);
        }
        Ok(mirror)
    }

    pub fn put(&self, spreadsheet_id: &str, sheet: &str, rows: Vec<Vec<Cell>>) {
        self.sheets
            .lock()
            .unwrap()
            .insert((spreadsheet_id.to_string(), sheet.to_string()), rows);
    }

    /// Convenience for fixtures: every value is text.
    pub fn put_text(&self, spreadsheet_id: &str, sheet: &str, rows: &[&[&str]]) {
        let rows = rows
            .iter()
            .map(|r| r.iter().map(|v| Cell::from(*v)).collect())
            .collect();
        self.put(spreadsheet_id, sheet, rows);
    }

    /// Current contents as text, header included.
    pub fn rows(&self, spreadsheet_id: &str, sheet: &str) -> Vec<Vec<String>> {
        self.sheets
            .lock()
            .unwrap()
            .get(&(spreadsheet_id.to_string(), sheet.to_string()))
            .map(|rows| {
                rows.iter()
                    .map(|r| r.iter().map(ToString::to_string).collect())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes.lock().unwrap().clone()
    }

    /// Inserts an empty row at `at_row` (1-based) right now, shifting the
    /// rows below it down by one.
    pub fn insert_row(&self, spreadsheet_id: &str, sheet: &str, at_row: usize) {
        let key = (spreadsheet_id.to_string(), sheet.to_string());
        Self::insert_row_locked(&mut self.sheets.lock().unwrap(), &key, at_row);
    }

    /// Inserts an empty row at `at_row` once `after_reads` more reads have
    /// been served, as a person editing the sheet mid-run would.
    pub fn schedule_row_insert(&self, spreadsheet_id: &str, sheet: &str, at_row: usize, after_reads: usize) {
        *self.scheduled.lock().unwrap() = Some(ScheduledInsert {
            key: (spreadsheet_id.to_string(), sheet.to_string()),
            at_row,
            reads_left: after_reads,
        });
    }

    fn insert_row_locked(sheets: &mut HashMap<SheetKey, Vec<Vec<Cell>>>, key: &SheetKey, at_row: usize) {
        let rows = sheets.entry(key.clone()).or_default();
        let index = (at_row.max(1) - 1).min(rows.len());
        rows.insert(index, Vec::new());
    }

    fn after_read(&self) {
        let mut scheduled = self.scheduled.lock().unwrap();
        let due = match scheduled.as_mut() {
            Some(insert) if insert.reads_left <= 1 => true,
            Some(insert) => {
                insert.reads_left -= 1;
                false
            }
            None => false,
        };
        if due {
            if let Some(insert) = scheduled.take() {
                Self::insert_row_locked(&mut self.sheets.lock().unwrap(), &insert.key, insert.at_row);
            }
        }
    }
}

/// Resolved rectangle of a range, all bounds inclusive and 0-based.
fn bounds(range: &A1Range, rows: &[Vec<Cell>]) -> (usize, usize, usize, usize) {
    let last_row = rows.len().max(1) - 1;
    let last_col = rows.iter().map(Vec::len).max().unwrap_or(1).max(1) - 1;

    let first_col = range.start().column().unwrap_or(0);
    let first_row = range.start().row().map_or(0, |r| r - 1);
    let (end_col, end_row) = match range.end() {
        None => (first_col, first_row),
        Some(end) => (
            end.column().unwrap_or(last_col),
            end.row().map_or(last_row, |r| r - 1),
        ),
    };
    (first_row, end_row, first_col, end_col)
}

fn is_blank(cell: &Cell) -> bool {
    matches!(cell, Cell::Text(s) if s.is_empty())
}

#[async_trait]
impl SheetPort for InMemorySheet {
    async fn read_range(&self, spreadsheet_id: &str, range: &A1Range) -> Result<Vec<Vec<Cell>>> {
        let values = {
            let sheets = self.sheets.lock().unwrap();
            let Some(rows) = sheets.get(&(spreadsheet_id.to_string(), range.sheet().to_string())) else {
                return Ok(Vec::new());
            };
            let (first_row, end_row, first_col, end_col) = bounds(range, rows);

            let mut values: Vec<Vec<Cell>> = (first_row..=end_row)
                .map(|r| {
                    let mut row: Vec<Cell> = (first_col..=end_col)
                        .map(|c| {
                            rows.get(r)
                                .and_then(|row| row.get(c))
                                .cloned()
                                .unwrap_or_else(Cell::blank)
                        })
                        .collect();
                    // the remote store drops trailing blanks
                    while row.last().map_or(false, is_blank) {
                        row.pop();
                    }
                    row
                })
                .collect();
            while values.last().map_or(false, Vec::is_empty) {
                values.pop();
            }
            values
        };
        self.after_read();
        Ok(values)
    }

    async fn write_range(
        &self,
        spreadsheet_id: &str,
        range: &A1Range,
        rows: Vec<Vec<String>>,
        mode: InputMode,
    ) -> Result<()> {
        {
            let mut sheets = self.sheets.lock().unwrap();
            let grid = sheets
                .entry((spreadsheet_id.to_string(), range.sheet().to_string()))
                .or_default();
            let first_row = range.start().row().map_or(0, |r| r - 1);
            let first_col = range.start().column().unwrap_or(0);

            for (i, values) in rows.iter().enumerate() {
                let r = first_row + i;
                if grid.len() <= r {
                    grid.resize(r + 1, Vec::new());
                }
                for (j, value) in values.iter().enumerate() {
                    let c = first_col + j;
                    if grid[r].len() <= c {
                        grid[r].resize(c + 1, Cell::blank());
                    }
                    grid[r][c] = Cell::Text(value.clone());
                }
            }
        }

        self.writes.lock().unwrap().push(RecordedWrite {
            spreadsheet_id: spreadsheet_id.to_string(),
            range: range.to_string(),
            rows,
            mode,
        });
        Ok(())
    }
}
