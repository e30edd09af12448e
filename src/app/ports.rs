use async_trait::async_trait;
use serde::Serialize;

use crate::app::a1::A1Range;
use crate::error::Result;
use crate::pipeline::processing::geocode::GeocodeMiss;
use crate::pipeline::report::RunReport;
use crate::types::{Cell, Violation};

/// How the store interprets written values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InputMode {
    /// Values are parsed as if typed by a user (numbers, dates, formulas).
    UserEntered,
    /// Values are stored verbatim.
    Raw,
}

/// Read/write access to the authoritative remote tables.
///
/// Reads always go to the store; implementations must not serve cached data.
/// An empty vector means the range holds no data.
#[async_trait]
pub trait SheetPort: Send + Sync {
    async fn read_range(&self, spreadsheet_id: &str, range: &A1Range) -> Result<Vec<Vec<Cell>>>;
    async fn write_range(
        &self,
        spreadsheet_id: &str,
        range: &A1Range,
        rows: Vec<Vec<String>>,
        mode: InputMode,
    ) -> Result<()>;
}

/// Creating new spreadsheets from a template. Kept apart from [`SheetPort`]
/// since only the provisioning command needs it.
#[async_trait]
pub trait SheetProvisionerPort: Send + Sync {
    /// Copies the template and returns the new spreadsheet id.
    async fn copy_spreadsheet(&self, template_id: &str, title: &str) -> Result<String>;
    async fn rename_worksheet(&self, spreadsheet_id: &str, worksheet_gid: i64, title: &str) -> Result<()>;
    async fn share_with_group(&self, spreadsheet_id: &str, email: &str, message: &str) -> Result<()>;
}

/// Destination for everything a run publishes.
#[async_trait]
pub trait DatasetOutputPort: Send + Sync {
    async fn write_dataset(&self, header: &[&str], rows: &[Vec<String>]) -> Result<()>;
    async fn write_review_report(&self, table: &str, violations: &[Violation]) -> Result<()>;
    async fn write_geocode_misses(&self, misses: &[(GeocodeMiss, usize)]) -> Result<()>;
    async fn write_run_report(&self, report: &RunReport) -> Result<()>;
}
