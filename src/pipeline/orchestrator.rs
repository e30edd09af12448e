use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, instrument, warn};

use crate::app::ports::{DatasetOutputPort, SheetPort};
use crate::config::TableConfig;
use crate::constants::OUTPUT_COLUMNS;
use crate::error::{CleanerError, Result};
use crate::pipeline::pacing::WritePacer;
use crate::pipeline::processing::classify::classify;
use crate::pipeline::processing::geocode::{Gazetteer, GeocodeMatcher};
use crate::pipeline::processing::identifiers::IdentifierSpace;
use crate::pipeline::processing::normalize::{
    dedupe_by_id, expand_aggregates, normalize_record, precursor_fixes,
};
use crate::pipeline::reconcile::ReconciliationWriter;
use crate::pipeline::remote_table::RemoteTable;
use crate::pipeline::report::{RunReport, TableOutcome, TableReport};
use crate::types::{CaseRecord, Cell, SheetTable, Violation};

/// A table that made it through validation.
struct CleanTable {
    config: TableConfig,
    remote: RemoteTable,
    snapshot: SheetTable,
    records: Vec<CaseRecord>,
}

/// Runs the whole cleaning job: every configured table through
/// normalize, classify, reconcile and re-fetch, then the merged rows
/// through id allocation, geocoding and output.
pub struct Orchestrator {
    tables: Vec<TableConfig>,
    port: Arc<dyn SheetPort>,
    gazetteer: Gazetteer,
    output: Arc<dyn DatasetOutputPort>,
    pacer: WritePacer,
    dry_run: bool,
}

impl Orchestrator {
    pub fn new(
        tables: Vec<TableConfig>,
        port: Arc<dyn SheetPort>,
        gazetteer: Gazetteer,
        output: Arc<dyn DatasetOutputPort>,
        pacing: Duration,
    ) -> Self {
        Self {
            tables,
            port,
            gazetteer,
            output,
            pacer: WritePacer::new(pacing),
            dry_run: false,
        }
    }

    /// Marks the run report as a dry run. The caller supplies a port that
    /// does not reach the real store.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Runs the job and writes the end-of-run report, whether or not the
    /// final stages succeed. Per-table failures are recorded in the report;
    /// only a failure after the merge is returned as an error.
    pub async fn run(&mut self) -> Result<RunReport> {
        let mut report = RunReport::start(self.dry_run);
        info!(run_id = %report.run_id, tables = self.tables.len(), "starting cleanup run");

        let outcome = self.run_stages(&mut report).await;
        report.finish();

        if let Err(e) = self.output.write_run_report(&report).await {
            error!(error = %e, "could not write run report");
        }
        let failed = report.failed_tables();
        if !failed.is_empty() {
            warn!(tables = ?failed, "some tables were excluded from the dataset");
        }

        outcome.map(|_| report)
    }

    async fn run_stages(&mut self, report: &mut RunReport) -> Result<()> {
        let mut clean_tables = Vec::new();

        for config in self.tables.clone() {
            match self.process_table(&config).await {
                Ok((clean, outcome)) => {
                    report.tables.push(TableReport {
                        table: config.name.clone(),
                        outcome,
                    });
                    clean_tables.push(clean);
                }
                Err(e) => {
                    error!(table = %config.name, error = %e, "table failed, excluding it from this run");
                    report.tables.push(TableReport {
                        table: config.name.clone(),
                        outcome: TableOutcome::Failed { error: e.to_string() },
                    });
                }
            }
        }

        let mut merged = Vec::new();
        for mut table in clean_tables {
            let assigned = self.allocate_identifiers(&table).await?;
            report.identifiers_assigned += assigned.len();
            for record in table.records.iter_mut().filter(|r| r.id.trim().is_empty()) {
                if let Some(id) = assigned.get(&record.row) {
                    record.id = id.clone();
                }
            }
            merged.extend(table.records);
        }

        let mut matcher = GeocodeMatcher::new(&self.gazetteer);
        for record in merged.iter_mut() {
            matcher.enrich(record);
        }
        matcher.record_metrics();
        let misses = matcher.misses();
        report.geocode_hits = matcher.hits();
        report.geocode_misses = misses.iter().map(|(_, n)| n).sum();

        for record in merged.iter_mut() {
            normalize_record(record);
        }
        let merged = expand_aggregates(dedupe_by_id(merged));

        let rows = assemble_rows(&merged);
        report.dataset_rows = rows.len();
        self.output.write_dataset(&OUTPUT_COLUMNS, &rows).await?;
        self.output.write_geocode_misses(&misses).await?;

        info!(
            rows = report.dataset_rows,
            geocode_hits = report.geocode_hits,
            geocode_misses = report.geocode_misses,
            "dataset written"
        );
        Ok(())
    }

    #[instrument(skip(self, config), fields(table = %config.name))]
    async fn process_table(&mut self, config: &TableConfig) -> Result<(CleanTable, TableOutcome)> {
        let remote = RemoteTable::new(self.port.clone(), &config.sheet_id, &config.name);
        let mut snapshot = remote.fetch().await?;
        if snapshot.column_index(&config.id_column).is_none() {
            return Err(CleanerError::UnknownColumn {
                table: config.name.clone(),
                column: config.id_column.clone(),
            });
        }
        let rows_read = snapshot.records.len();
        let mut fixes_written = 0;

        let precursor = precursor_fixes(&snapshot, &config.id_column);
        if !precursor.is_empty() {
            fixes_written += self.write_batch(&remote, &snapshot, config, &precursor).await?;
            snapshot = remote.fetch().await?;
        }

        let mut violations = classify(&snapshot, &config.id_column)?;
        if !violations.fixable.is_empty() {
            fixes_written += self.write_batch(&remote, &snapshot, config, &violations.fixable).await?;
            snapshot = remote.fetch().await?;
            violations = classify(&snapshot, &config.id_column)?;
            if !violations.fixable.is_empty() {
                // Only possible if someone edited the row meanwhile
                warn!(
                    count = violations.fixable.len(),
                    "fixable violations reappeared after write-back, holding rows back"
                );
            }
        }

        let flagged: HashSet<usize> = violations
            .fixable
            .iter()
            .chain(violations.unfixable.iter())
            .map(|v| v.row)
            .collect();
        let records = clean_records(&snapshot, &config.id_column, &flagged);

        self.output
            .write_review_report(&config.name, &violations.unfixable)
            .await?;

        let outcome = TableOutcome::Processed {
            rows_read,
            fixes_written,
            unfixable: violations.unfixable.len(),
            rows_kept: records.len(),
        };
        info!(?outcome, "table processed");

        Ok((
            CleanTable {
                config: config.clone(),
                remote,
                snapshot,
                records,
            },
            outcome,
        ))
    }

    async fn write_batch(
        &mut self,
        remote: &RemoteTable,
        snapshot: &SheetTable,
        config: &TableConfig,
        fixes: &[Violation],
    ) -> Result<usize> {
        self.pacer.wait_turn(&config.name).await;
        let writer = ReconciliationWriter::new(remote, snapshot, &config.id_column)?;
        let result = writer.apply(fixes).await;
        self.pacer.batch_done(&config.name);
        result
    }

    /// Gives every row of the table an id and writes the id column back.
    /// Returns the new ids keyed by worksheet row.
    #[instrument(skip(self, table), fields(table = %table.config.name))]
    async fn allocate_identifiers(&mut self, table: &CleanTable) -> Result<HashMap<usize, String>> {
        let config = &table.config;
        let snapshot = &table.snapshot;
        let id_index = snapshot.column_index(&config.id_column);
        let needs_ids = snapshot.records.iter().any(|r| {
            let blank_id = id_index
                .and_then(|i| r.cells[i].as_text())
                .map_or(true, |id| id.trim().is_empty());
            blank_id && r.cells.iter().any(|c| !c.to_string().trim().is_empty())
        });
        if !needs_ids {
            return Ok(HashMap::new());
        }

        let unknown = |column: &str| CleanerError::UnknownColumn {
            table: config.name.clone(),
            column: column.to_string(),
        };
        let id_index = id_index.ok_or_else(|| unknown(&config.id_column))?;
        let reference_index = snapshot
            .column_index(&config.reference_column)
            .ok_or_else(|| unknown(&config.reference_column))?;

        // ids map back onto snapshot rows by position, so the sheet must
        // still line up with the snapshot row for row
        let fresh = table.remote.fetch().await?;
        if let Some(mismatch) = first_divergent_row(snapshot, &fresh, id_index) {
            return Err(mismatch.into_error(&config.name));
        }
        let existing = table.remote.read_column(id_index).await?;
        if let Some(mismatch) = id_column_divergence(snapshot, id_index, &existing) {
            return Err(mismatch.into_error(&config.name));
        }
        let reference = table.remote.read_column(reference_index).await?;
        let space = IdentifierSpace::new(&config.region_code, config.legacy_bare_ids);
        let allocation = space.assign(&existing, reference.len())?;
        if allocation.assigned.is_empty() {
            return Ok(HashMap::new());
        }

        self.pacer.wait_turn(&config.name).await;
        let current = table.remote.read_column(id_index).await?;
        if current != existing {
            let position = current
                .iter()
                .zip(existing.iter())
                .position(|(a, b)| a != b)
                .unwrap_or_else(|| current.len().min(existing.len()));
            return Err(CleanerError::RemoteIdentityMismatch {
                table: config.name.clone(),
                row: position + 2,
                expected: existing.get(position).cloned().flatten().unwrap_or_default(),
                found: current.get(position).cloned().flatten().unwrap_or_default(),
            });
        }
        let result = table.remote.write_column(id_index, 2, &allocation.ids).await;
        self.pacer.batch_done(&config.name);
        result?;

        info!(assigned = allocation.assigned.len(), "identifiers written back");
        Ok(allocation
            .assigned
            .iter()
            .map(|&position| (position + 2, allocation.ids[position].clone()))
            .collect())
    }
}

/// First row where the sheet no longer matches what was read earlier.
#[derive(Debug, PartialEq)]
struct Divergence {
    row: usize,
    expected: String,
    found: String,
}

impl Divergence {
    fn into_error(self, table: &str) -> CleanerError {
        CleanerError::RemoteIdentityMismatch {
            table: table.to_string(),
            row: self.row,
            expected: self.expected,
            found: self.found,
        }
    }
}

fn id_text(table: &SheetTable, position: usize, id_index: usize) -> String {
    table
        .records
        .get(position)
        .and_then(|r| r.cells.get(id_index))
        .map(ToString::to_string)
        .unwrap_or_default()
}

/// Compares two snapshots of the same worksheet header first, then row by
/// row. Missing cells and missing rows count as blank.
fn first_divergent_row(snapshot: &SheetTable, fresh: &SheetTable, id_index: usize) -> Option<Divergence> {
    if snapshot.columns != fresh.columns {
        return Some(Divergence {
            row: 1,
            expected: snapshot.columns.join(","),
            found: fresh.columns.join(","),
        });
    }

    let blank = Cell::blank();
    let rows = snapshot.records.len().max(fresh.records.len());
    (0..rows)
        .find(|&i| {
            let before = snapshot.records.get(i).map_or(&[][..], |r| r.cells.as_slice());
            let after = fresh.records.get(i).map_or(&[][..], |r| r.cells.as_slice());
            (0..before.len().max(after.len()))
                .any(|c| before.get(c).unwrap_or(&blank) != after.get(c).unwrap_or(&blank))
        })
        .map(|i| Divergence {
            row: i + 2,
            expected: id_text(snapshot, i, id_index),
            found: id_text(fresh, i, id_index),
        })
}

/// Compares an id column read against the snapshot's id cells.
fn id_column_divergence(snapshot: &SheetTable, id_index: usize, ids: &[Option<String>]) -> Option<Divergence> {
    let rows = snapshot.records.len().max(ids.len());
    (0..rows)
        .map(|i| {
            let expected = id_text(snapshot, i, id_index);
            let found = ids.get(i).cloned().flatten().unwrap_or_default();
            (i, expected, found)
        })
        .find(|(_, expected, found)| expected != found)
        .map(|(i, expected, found)| Divergence {
            row: i + 2,
            expected,
            found,
        })
}

/// Rows with no violation and at least one non-blank cell.
fn clean_records(snapshot: &SheetTable, id_column: &str, flagged: &HashSet<usize>) -> Vec<CaseRecord> {
    let id_index = snapshot.column_index(id_column);
    snapshot
        .records
        .iter()
        .filter(|r| !flagged.contains(&r.row))
        .filter(|r| r.cells.iter().any(|c| !c.to_string().trim().is_empty()))
        .map(|r| {
            let fields = snapshot
                .columns
                .iter()
                .enumerate()
                .filter(|(i, c)| Some(*i) != id_index && !c.is_empty())
                .map(|(i, c)| (c.clone(), r.cells[i].to_string()))
                .collect();
            CaseRecord {
                table: snapshot.name.clone(),
                row: r.row,
                id: id_index.map(|i| r.cells[i].to_string()).unwrap_or_default(),
                fields,
            }
        })
        .collect()
}

/// Rows in published column order, `row` and other working columns dropped.
fn assemble_rows(records: &[CaseRecord]) -> Vec<Vec<String>> {
    records
        .iter()
        .map(|record| {
            OUTPUT_COLUMNS
                .iter()
                .map(|&column| match column {
                    "id" => record.id.clone(),
                    other => record.field(other).to_string(),
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(rows: &[&[&str]]) -> SheetTable {
        SheetTable::from_values(
            "Data",
            rows.iter()
                .map(|r| r.iter().map(|v| Cell::from(*v)).collect())
                .collect(),
        )
    }

    #[test]
    fn test_clean_records_skip_flagged_and_blank_rows() {
        let snapshot = SheetTable::from_values(
            "Data",
            vec![
                vec![Cell::from("ID"), Cell::from("city")],
                vec![Cell::from("1"), Cell::from("Lyon")],
                vec![Cell::from("2"), Cell::from("Lyon 3")],
                vec![Cell::from(""), Cell::from("")],
                vec![Cell::from(""), Cell::from("Paris")],
            ],
        );
        let flagged: HashSet<usize> = [3].into_iter().collect();

        let records = clean_records(&snapshot, "ID", &flagged);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "1");
        assert_eq!(records[0].field("city"), "Lyon");
        assert!(!records[0].fields.contains_key("ID"));
        assert_eq!(records[1].row, 5);
        assert_eq!(records[1].id, "");
    }

    #[test]
    fn test_rows_follow_published_column_order() {
        let record = CaseRecord {
            table: "Data".to_string(),
            row: 2,
            id: "004-1".to_string(),
            fields: [("age", "30"), ("admin_id", "7"), ("row", "2")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        let rows = assemble_rows(&[record]);
        assert_eq!(rows[0].len(), OUTPUT_COLUMNS.len());
        assert_eq!(rows[0][0], "004-1");
        assert_eq!(rows[0][1], "30");
        let admin_id = OUTPUT_COLUMNS.iter().position(|c| *c == "admin_id").unwrap();
        assert_eq!(rows[0][admin_id], "7");
        assert!(!rows[0].contains(&"2".to_string()));
    }

    #[test]
    fn test_shifted_blank_id_row_is_a_divergence() {
        let snapshot = sheet(&[&["ID", "age"], &["004-1", "30"], &["", "31"], &["004-3", "32"]]);
        let shifted = sheet(&[&["ID", "age"], &["004-1", "30"], &[], &["", "31"], &["004-3", "32"]]);

        // the id column alone still reads 004-1, blank, ...
        assert_eq!(
            first_divergent_row(&snapshot, &shifted, 0),
            Some(Divergence {
                row: 3,
                expected: String::new(),
                found: String::new(),
            })
        );
        assert_eq!(first_divergent_row(&snapshot, &snapshot.clone(), 0), None);
    }

    #[test]
    fn test_divergence_checks_header_and_padding() {
        let snapshot = sheet(&[&["ID", "age"], &["004-1", ""]]);
        let padded = sheet(&[&["ID", "age"], &["004-1"]]);
        assert_eq!(first_divergent_row(&snapshot, &padded, 0), None);

        let renamed = sheet(&[&["ID", "years"], &["004-1", ""]]);
        assert_eq!(first_divergent_row(&snapshot, &renamed, 0).unwrap().row, 1);

        let appended = sheet(&[&["ID", "age"], &["004-1", ""], &["", "40"]]);
        assert_eq!(first_divergent_row(&snapshot, &appended, 0).unwrap().row, 3);
    }

    #[test]
    fn test_id_column_read_must_match_snapshot_ids() {
        let snapshot = sheet(&[&["ID", "age"], &["004-1", "30"], &["", "31"], &["004-3", "32"]]);
        let same = vec![Some("004-1".to_string()), None, Some("004-3".to_string())];
        assert_eq!(id_column_divergence(&snapshot, 0, &same), None);

        let shifted = vec![None, Some("004-1".to_string()), None, Some("004-3".to_string())];
        assert_eq!(
            id_column_divergence(&snapshot, 0, &shifted),
            Some(Divergence {
                row: 2,
                expected: "004-1".to_string(),
                found: String::new(),
            })
        );
    }
}
