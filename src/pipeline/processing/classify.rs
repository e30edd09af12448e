use std::cmp::Ordering;

use metrics::counter;
use tracing::{debug, error, instrument};

use crate::constants::NA;
use crate::error::{CleanerError, Result};
use crate::pipeline::processing::identifiers::numeric_suffix;
use crate::pipeline::processing::validate::ColumnClass;
use crate::types::{SheetTable, Violation, ViolationTable};

/// Runs every field validator over `table` and splits the failures into
/// mechanically fixable and needs-review.
///
/// Fails on the first validated cell that does not hold text; a typing
/// problem upstream must not be read as a clean table.
#[instrument(skip(table), fields(table = %table.name))]
pub fn classify(table: &SheetTable, id_column: &str) -> Result<ViolationTable> {
    let violations = find_violations(table, id_column)?;

    let mut result = ViolationTable::default();
    for mut violation in violations {
        // find_violations only emits columns with a grammar
        let Some(class) = ColumnClass::for_column(&violation.column) else {
            continue;
        };
        violation.fix = propose_fix(class, &violation.value);
        if violation.fix.is_some() {
            result.fixable.push(violation);
        } else {
            result.unfixable.push(violation);
        }
    }
    result.unfixable.sort_by(compare_ids);

    counter!("cleaner_violations_total", "disposition" => "fixable")
        .increment(result.fixable.len() as u64);
    counter!("cleaner_violations_total", "disposition" => "unfixable")
        .increment(result.unfixable.len() as u64);
    debug!(
        fixable = result.fixable.len(),
        unfixable = result.unfixable.len(),
        "classification done"
    );
    Ok(result)
}

/// Sweep: one violation without a fix per cell that fails its grammar.
/// Violations are grouped by column, in column order.
fn find_violations(table: &SheetTable, id_column: &str) -> Result<Vec<Violation>> {
    let id_index = table.column_index(id_column);
    let mut violations = Vec::new();

    for (col, column) in table.columns.iter().enumerate() {
        if Some(col) == id_index {
            continue;
        }
        let Some(class) = ColumnClass::for_column(column) else {
            continue;
        };
        for record in &table.records {
            let cell = &record.cells[col];
            let Some(value) = cell.as_text() else {
                error!(
                    table = %table.name,
                    row = record.row,
                    column = %column,
                    value = %cell,
                    "validated cell is not text"
                );
                return Err(CleanerError::ValidationTypeMismatch {
                    table: table.name.clone(),
                    row: record.row,
                    column: column.clone(),
                    value: format!("{} {}", cell.kind(), cell),
                });
            };
            if !class.accepts(value) {
                violations.push(Violation {
                    row: record.row,
                    id: id_index
                        .and_then(|i| record.cells[i].as_text())
                        .unwrap_or_default()
                        .to_string(),
                    column: column.clone(),
                    value: value.to_string(),
                    fix: None,
                });
            }
        }
    }
    Ok(violations)
}

/// Narrow deterministic repair. Free text, dates and coordinates are never
/// rewritten.
pub fn propose_fix(class: ColumnClass, value: &str) -> Option<String> {
    let candidate = match class {
        ColumnClass::Age => value.chars().filter(|c| !c.is_whitespace()).collect::<String>(),
        ColumnClass::GeoResolution => value
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase(),
        ColumnClass::Sex => value.trim().to_lowercase(),
        ColumnClass::LivesIn => match value {
            "1" => "yes".to_string(),
            "0" => "no".to_string(),
            other => other.trim().to_lowercase(),
        },
        ColumnClass::PlaceName | ColumnClass::Date | ColumnClass::Coordinate => return None,
    };

    if candidate == value || !class.accepts(&candidate) {
        return None;
    }
    // Only a whitespace-only sex cell may collapse to blank
    if (candidate.is_empty() || candidate == NA) && class != ColumnClass::Sex {
        return None;
    }
    Some(candidate)
}

/// Orders ids by prefix, then by numeric suffix, so `001-9` precedes `001-10`.
pub fn compare_ids(a: &Violation, b: &Violation) -> Ordering {
    fn key(id: &str) -> (&str, Option<u64>) {
        let prefix = id.rsplit_once('-').map_or("", |(p, _)| p);
        (prefix, numeric_suffix(id))
    }
    key(&a.id)
        .cmp(&key(&b.id))
        .then_with(|| a.id.cmp(&b.id))
        .then_with(|| a.row.cmp(&b.row))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Cell;

    fn table(rows: &[&[&str]]) -> SheetTable {
        SheetTable::from_values(
            "Data",
            rows.iter()
                .map(|r| r.iter().map(|v| Cell::from(*v)).collect())
                .collect(),
        )
    }

    #[test]
    fn test_age_with_embedded_spaces_is_fixable() {
        for (raw, fixed) in [("30 - 39", "30-39"), (" 4 5", "45"), ("0. 5", "0.5")] {
            let fix = propose_fix(ColumnClass::Age, raw);
            assert_eq!(fix.as_deref(), Some(fixed));
            assert!(ColumnClass::Age.accepts(fixed));
        }
    }

    #[test]
    fn test_other_age_malformations_are_not_fixable() {
        for raw in ["thirty", "30+", "30 years", "3O", "~40"] {
            assert_eq!(propose_fix(ColumnClass::Age, raw), None, "{raw:?}");
        }
    }

    #[test]
    fn test_sex_fixes_normalize_case_and_spacing() {
        assert_eq!(propose_fix(ColumnClass::Sex, "Male").as_deref(), Some("male"));
        assert_eq!(propose_fix(ColumnClass::Sex, " female ").as_deref(), Some("female"));
        assert_eq!(propose_fix(ColumnClass::Sex, "MALE").as_deref(), Some("male"));
        assert_eq!(propose_fix(ColumnClass::Sex, "  ").as_deref(), Some(""));
        assert_eq!(propose_fix(ColumnClass::Sex, "m"), None);
    }

    #[test]
    fn test_lives_in_and_geo_resolution_fixes() {
        assert_eq!(propose_fix(ColumnClass::LivesIn, " Yes").as_deref(), Some("yes"));
        assert_eq!(propose_fix(ColumnClass::LivesIn, "1").as_deref(), Some("yes"));
        assert_eq!(propose_fix(ColumnClass::LivesIn, "0").as_deref(), Some("no"));
        assert_eq!(propose_fix(ColumnClass::LivesIn, "maybe"), None);
        assert_eq!(propose_fix(ColumnClass::GeoResolution, "Admin 2").as_deref(), Some("admin2"));
        assert_eq!(propose_fix(ColumnClass::GeoResolution, "region"), None);
    }

    #[test]
    fn test_free_text_dates_and_coordinates_are_never_fixed() {
        assert_eq!(propose_fix(ColumnClass::PlaceName, "lyon 3"), None);
        assert_eq!(propose_fix(ColumnClass::Date, "2020-01-21"), None);
        assert_eq!(propose_fix(ColumnClass::Coordinate, "45,76"), None);
    }

    #[test]
    fn test_classify_partitions_and_sorts_by_id() {
        let t = table(&[
            &["ID", "age", "sex", "city", "date_confirmation"],
            &["001-10", "30 - 39", "Male", "Lyon", "21.01.2020"],
            &["001-9", "40", "female", "Lyon 3", "2020-01-21"],
            &["001-2", "old", "", "Paris", ""],
        ]);

        let result = classify(&t, "ID").unwrap();

        assert_eq!(result.fixable.len(), 2);
        assert_eq!(result.fixable[0].column, "age");
        assert_eq!(result.fixable[0].fix.as_deref(), Some("30-39"));
        assert_eq!(result.fixable[1].column, "sex");
        assert_eq!(result.fixable[1].row, 2);

        let ids: Vec<&str> = result.unfixable.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["001-2", "001-9", "001-9"]);
        assert!(result.unfixable.iter().all(|v| v.fix.is_none()));
    }

    #[test]
    fn test_classify_clean_table_twice_is_empty() {
        let t = table(&[
            &["ID", "age", "sex", "country", "geo_resolution", "lives_in_Wuhan", "latitude"],
            &["1", "30-39", "male", "France", "point", "no", "45.76"],
            &["2", "NA", "", "Côte d'Ivoire", "admin1", "", ""],
        ]);
        assert!(classify(&t, "ID").unwrap().is_empty());
        assert!(classify(&t, "ID").unwrap().is_empty());
    }

    #[test]
    fn test_non_text_cell_is_a_type_mismatch() {
        let mut t = table(&[&["ID", "age"], &["1", "30"], &["2", "31"]]);
        t.records[1].cells[1] = Cell::Number(31.0);

        match classify(&t, "ID") {
            Err(CleanerError::ValidationTypeMismatch { table, row, column, .. }) => {
                assert_eq!(table, "Data");
                assert_eq!(row, 3);
                assert_eq!(column, "age");
            }
            other => panic!("expected type mismatch, got {:?}", other),
        }
    }
}
