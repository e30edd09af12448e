use std::sync::Arc;

use tracing::debug;

use crate::app::a1::A1Range;
use crate::app::ports::{InputMode, SheetPort};
use crate::error::{CleanerError, Result};
use crate::types::{Cell, SheetTable};

/// One worksheet of the remote store, addressed by spreadsheet id and title.
#[derive(Clone)]
pub struct RemoteTable {
    port: Arc<dyn SheetPort>,
    spreadsheet_id: String,
    name: String,
}

impl RemoteTable {
    pub fn new(port: Arc<dyn SheetPort>, spreadsheet_id: &str, name: &str) -> Self {
        Self {
            port,
            spreadsheet_id: spreadsheet_id.to_string(),
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads `range`; a range with no data is an error since every range the
    /// cleaner reads includes at least the header or an id cell.
    pub async fn read(&self, range: &A1Range) -> Result<Vec<Vec<Cell>>> {
        let values = self.port.read_range(&self.spreadsheet_id, range).await?;
        if values.is_empty() {
            return Err(CleanerError::RemoteReadEmpty {
                table: self.name.clone(),
                range: range.to_string(),
            });
        }
        Ok(values)
    }

    /// Fresh snapshot of the whole worksheet.
    pub async fn fetch(&self) -> Result<SheetTable> {
        let range = A1Range::whole_sheet(&self.name);
        let values = self.read(&range).await?;
        let table = SheetTable::from_values(&self.name, values);
        debug!(table = %self.name, rows = table.records.len(), "fetched snapshot");
        Ok(table)
    }

    /// Text of a single cell as the store holds it now. A cell past the end
    /// of the data reads as blank.
    pub async fn read_cell(&self, column: usize, row: usize) -> Result<String> {
        let range = A1Range::cell(&self.name, column, row)?;
        let values = self.port.read_range(&self.spreadsheet_id, &range).await?;
        Ok(values
            .first()
            .and_then(|r| r.first())
            .map(ToString::to_string)
            .unwrap_or_default())
    }

    pub async fn write_cell(&self, column: usize, row: usize, value: &str) -> Result<()> {
        let range = A1Range::cell(&self.name, column, row)?;
        self.port
            .write_range(
                &self.spreadsheet_id,
                &range,
                vec![vec![value.to_string()]],
                InputMode::UserEntered,
            )
            .await
    }

    /// Data cells of one column (header dropped), as text.
    pub async fn read_column(&self, column: usize) -> Result<Vec<Option<String>>> {
        let range = A1Range::column(&self.name, column)?;
        let values = self.read(&range).await?;
        Ok(values
            .into_iter()
            .skip(1)
            .map(|row| row.first().map(ToString::to_string))
            .collect())
    }

    /// Writes `values` top-down starting at `first_row`, verbatim.
    pub async fn write_column(&self, column: usize, first_row: usize, values: &[String]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let range = A1Range::column_span(&self.name, column, first_row, first_row + values.len() - 1)?;
        let rows = values.iter().map(|v| vec![v.clone()]).collect();
        self.port
            .write_range(&self.spreadsheet_id, &range, rows, InputMode::Raw)
            .await
    }
}
