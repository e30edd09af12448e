//! Writing fixes back to the authoritative table.
//!
//! Rows are addressed by number, and a person may insert or delete rows
//! between our read and our write. Before every write the id cell of the
//! target row is read again; if it no longer holds the id the fix was
//! computed for, the batch stops.

use std::collections::HashMap;

use metrics::counter;
use tracing::{error, info, instrument};

use crate::error::{CleanerError, Result};
use crate::pipeline::remote_table::RemoteTable;
use crate::types::{SheetTable, Violation};

pub struct ReconciliationWriter<'a> {
    table: &'a RemoteTable,
    id_column: usize,
    columns: HashMap<String, usize>,
}

impl<'a> ReconciliationWriter<'a> {
    /// `snapshot` supplies the column positions the fixes were computed
    /// against.
    pub fn new(table: &'a RemoteTable, snapshot: &SheetTable, id_column: &str) -> Result<Self> {
        let id_index = snapshot
            .column_index(id_column)
            .ok_or_else(|| CleanerError::UnknownColumn {
                table: snapshot.name.clone(),
                column: id_column.to_string(),
            })?;
        let columns = snapshot
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        Ok(Self {
            table,
            id_column: id_index,
            columns,
        })
    }

    /// Applies every fix in order and returns how many were written.
    ///
    /// Stops at the first identity mismatch; fixes before it stay written,
    /// none after it are attempted.
    #[instrument(skip(self, fixes), fields(table = %self.table.name(), count = fixes.len()))]
    pub async fn apply(&self, fixes: &[Violation]) -> Result<usize> {
        let mut written = 0;

        for violation in fixes {
            let Some(fix) = violation.fix.as_deref() else {
                continue;
            };
            let column = *self
                .columns
                .get(&violation.column)
                .ok_or_else(|| CleanerError::UnknownColumn {
                    table: self.table.name().to_string(),
                    column: violation.column.clone(),
                })?;

            let found = self.table.read_cell(self.id_column, violation.row).await?;
            if found != violation.id {
                counter!("cleaner_identity_mismatches_total").increment(1);
                error!(
                    row = violation.row,
                    column = %violation.column,
                    expected = %violation.id,
                    found = %found,
                    written,
                    "row shifted under us, aborting write batch"
                );
                return Err(CleanerError::RemoteIdentityMismatch {
                    table: self.table.name().to_string(),
                    row: violation.row,
                    expected: violation.id.clone(),
                    found,
                });
            }

            self.table.write_cell(column, violation.row, fix).await?;
            written += 1;
        }

        counter!("cleaner_fixes_written_total").increment(written as u64);
        info!(written, "write batch applied");
        Ok(written)
    }
}
