//! Sequential identifier allocation for rows that have none.
//!
//! Each table owns one numeric sequence. Existing ids are never changed;
//! blanks receive `max + 1`, `max + 2`, ... in row order, and rows the id
//! column does not reach at all are appended with the same counter.

use metrics::counter;
use tracing::debug;

use crate::constants::IDENTIFIER_SENTINEL;
use crate::error::{CleanerError, Result};

/// Numeric part of an id: the text after the final `-`, or the whole id.
pub fn numeric_suffix(id: &str) -> Option<u64> {
    let suffix = id.rsplit_once('-').map_or(id, |(_, n)| n);
    suffix.trim().parse().ok()
}

fn is_blank(id: &Option<String>) -> bool {
    id.as_deref().map_or(true, |s| s.trim().is_empty())
}

/// Numbers for a table of `target_len` rows whose id column currently holds
/// `existing` (shorter when trailing rows have no id cell at all).
///
/// Populated positions keep their parsed number. A table with no populated
/// id starts from [`IDENTIFIER_SENTINEL`].
pub fn allocate(existing: &[Option<String>], target_len: usize) -> Result<Vec<u64>> {
    let mut parsed = Vec::with_capacity(existing.len().max(target_len));
    let mut max = IDENTIFIER_SENTINEL;

    for (position, id) in existing.iter().enumerate() {
        if is_blank(id) {
            parsed.push(None);
            continue;
        }
        let value = id.as_deref().unwrap_or_default();
        let number = numeric_suffix(value).ok_or_else(|| CleanerError::InvalidIdentifier {
            position,
            value: value.to_string(),
        })?;
        max = max.max(number);
        parsed.push(Some(number));
    }

    let mut numbers = Vec::with_capacity(parsed.len());
    for slot in parsed {
        numbers.push(slot.unwrap_or_else(|| {
            max += 1;
            max
        }));
    }
    while numbers.len() < target_len {
        max += 1;
        numbers.push(max);
    }
    Ok(numbers)
}

/// Result of allocating ids for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// Complete id column in row order, header excluded.
    pub ids: Vec<String>,
    /// Positions in `ids` that were newly assigned.
    pub assigned: Vec<usize>,
}

/// The id namespace of one source table.
#[derive(Debug, Clone)]
pub struct IdentifierSpace {
    region_code: String,
    legacy_bare: bool,
}

impl IdentifierSpace {
    pub fn new(region_code: &str, legacy_bare: bool) -> Self {
        Self {
            region_code: region_code.to_string(),
            legacy_bare,
        }
    }

    /// Legacy tables use bare numbers; all others `{region}-{n}`.
    pub fn format(&self, number: u64) -> String {
        if self.legacy_bare {
            number.to_string()
        } else {
            format!("{}-{}", self.region_code, number)
        }
    }

    pub fn assign(&self, existing: &[Option<String>], target_len: usize) -> Result<Allocation> {
        let numbers = allocate(existing, target_len)?;
        let mut ids = Vec::with_capacity(numbers.len());
        let mut assigned = Vec::new();

        for (position, number) in numbers.into_iter().enumerate() {
            match existing.get(position) {
                Some(id) if !is_blank(id) => ids.push(id.clone().unwrap_or_default()),
                _ => {
                    ids.push(self.format(number));
                    assigned.push(position);
                }
            }
        }

        counter!("cleaner_identifiers_assigned_total").increment(assigned.len() as u64);
        debug!(region = %self.region_code, assigned = assigned.len(), "identifiers allocated");
        Ok(Allocation { ids, assigned })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[Option<&str>]) -> Vec<Option<String>> {
        values.iter().map(|v| v.map(str::to_string)).collect()
    }

    #[test]
    fn test_blanks_receive_increasing_numbers_in_row_order() {
        let existing = ids(&[None, Some("5"), None, Some("3")]);
        assert_eq!(allocate(&existing, 4).unwrap(), vec![6, 5, 7, 3]);
    }

    #[test]
    fn test_fully_populated_list_is_unchanged() {
        let existing = ids(&[Some("001-1"), Some("001-2"), Some("001-7")]);
        let space = IdentifierSpace::new("001", false);
        let allocation = space.assign(&existing, 3).unwrap();
        assert_eq!(allocation.ids, vec!["001-1", "001-2", "001-7"]);
        assert!(allocation.assigned.is_empty());

        // twice gives the same answer
        let again: Vec<Option<String>> = allocation.ids.iter().cloned().map(Some).collect();
        assert_eq!(space.assign(&again, 3).unwrap().ids, allocation.ids);
    }

    #[test]
    fn test_missing_tail_rows_are_appended() {
        let existing = ids(&[Some("004-10"), Some(" "), Some("004-12")]);
        let allocation = IdentifierSpace::new("004", false).assign(&existing, 5).unwrap();
        assert_eq!(
            allocation.ids,
            vec!["004-10", "004-13", "004-12", "004-14", "004-15"]
        );
        assert_eq!(allocation.assigned, vec![1, 3, 4]);
    }

    #[test]
    fn test_empty_table_starts_after_sentinel() {
        let existing = ids(&[None, None]);
        assert_eq!(allocate(&existing, 3).unwrap(), vec![1, 2, 3]);
        assert_eq!(allocate(&[], 0).unwrap(), Vec::<u64>::new());
    }

    #[test]
    fn test_legacy_tables_use_bare_numbers() {
        let existing = ids(&[Some("41"), None]);
        let allocation = IdentifierSpace::new("", true).assign(&existing, 2).unwrap();
        assert_eq!(allocation.ids, vec!["41", "42"]);
    }

    #[test]
    fn test_suffix_parsing() {
        assert_eq!(numeric_suffix("12"), Some(12));
        assert_eq!(numeric_suffix("000-1-12"), Some(12));
        assert_eq!(numeric_suffix("005-7"), Some(7));
        assert_eq!(numeric_suffix("abc"), None);

        let existing = ids(&[Some("005-x")]);
        assert!(matches!(
            allocate(&existing, 1),
            Err(CleanerError::InvalidIdentifier { position: 0, .. })
        ));
    }
}
