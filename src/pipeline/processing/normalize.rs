use std::collections::HashSet;

use tracing::debug;

use crate::constants::{AGGREGATE, NA, SEX};
use crate::types::{CaseRecord, SheetTable, Violation};

/// Spellings of "not available" other than the canonical `NA`.
fn is_na_spelling(value: &str) -> bool {
    value.eq_ignore_ascii_case("N/A")
}

/// Fixes that are always safe and run before any grammar check: trailing
/// whitespace is dropped and `N/A` is spelled `NA`. The id column is never
/// touched. Non-text cells are left for classification to reject.
pub fn precursor_fixes(table: &SheetTable, id_column: &str) -> Vec<Violation> {
    let id_index = table.column_index(id_column);
    let mut fixes = Vec::new();

    for (col, column) in table.columns.iter().enumerate() {
        if Some(col) == id_index || column.is_empty() {
            continue;
        }
        for record in &table.records {
            let Some(value) = record.cells[col].as_text() else {
                continue;
            };
            let trimmed = value.trim_end();
            let fixed = if is_na_spelling(trimmed) { NA } else { trimmed };
            if fixed != value {
                fixes.push(Violation {
                    row: record.row,
                    id: id_index
                        .and_then(|i| record.cells[i].as_text())
                        .unwrap_or_default()
                        .to_string(),
                    column: column.clone(),
                    value: value.to_string(),
                    fix: Some(fixed.to_string()),
                });
            }
        }
    }

    debug!(table = %table.name, count = fixes.len(), "precursor fixes found");
    fixes
}

/// Spelling normalization applied to the published dataset only.
pub fn normalize_output_value(column: &str, value: &str) -> String {
    let value = value.trim();
    if is_na_spelling(value) || value.eq_ignore_ascii_case(NA) {
        return NA.to_string();
    }
    if column == SEX {
        let lower = value.to_lowercase();
        return match lower.as_str() {
            "m" | "male" => "male".to_string(),
            "f" | "female" => "female".to_string(),
            _ => value.to_string(),
        };
    }
    value.to_string()
}

pub fn normalize_record(record: &mut CaseRecord) {
    for (column, value) in record.fields.iter_mut() {
        *value = normalize_output_value(column, value);
    }
    record.id = record.id.trim().to_string();
}

/// Collapses rows sharing a non-blank id onto the first occurrence.
pub fn dedupe_by_id(records: Vec<CaseRecord>) -> Vec<CaseRecord> {
    let mut seen = HashSet::new();
    let before = records.len();
    let kept: Vec<CaseRecord> = records
        .into_iter()
        .filter(|r| r.id.is_empty() || seen.insert(r.id.clone()))
        .collect();
    if kept.len() != before {
        debug!(dropped = before - kept.len(), "duplicate ids collapsed");
    }
    kept
}

/// A row standing for `n` further cases (`aggr = n`) is emitted `n + 1`
/// times with `aggr` cleared. Copies are appended after all other rows.
pub fn expand_aggregates(mut records: Vec<CaseRecord>) -> Vec<CaseRecord> {
    let mut copies = Vec::new();
    for record in records.iter_mut() {
        let count = record
            .fields
            .get(AGGREGATE)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|n| n.is_finite() && *n > 0.0)
            .map(|n| n as usize);
        if record.fields.contains_key(AGGREGATE) {
            record.set(AGGREGATE, "");
        }
        if let Some(n) = count {
            copies.extend(std::iter::repeat(record.clone()).take(n));
        }
    }
    records.extend(copies);
    records
}
