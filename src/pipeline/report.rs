use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// How one source table fared in a run.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableOutcome {
    Processed {
        rows_read: usize,
        fixes_written: usize,
        unfixable: usize,
        rows_kept: usize,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    pub table: String,
    #[serde(flatten)]
    pub outcome: TableOutcome,
}

/// End-of-run summary written next to the dataset.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub tables: Vec<TableReport>,
    pub identifiers_assigned: usize,
    pub geocode_hits: usize,
    pub geocode_misses: usize,
    pub dataset_rows: usize,
}

impl RunReport {
    pub fn start(dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            dry_run,
            tables: Vec::new(),
            identifiers_assigned: 0,
            geocode_hits: 0,
            geocode_misses: 0,
            dataset_rows: 0,
        }
    }

    pub fn failed_tables(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|t| matches!(t.outcome, TableOutcome::Failed { .. }))
            .map(|t| t.table.as_str())
            .collect()
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}
