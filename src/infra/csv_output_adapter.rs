use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use crate::app::ports::DatasetOutputPort;
use crate::config::OutputConfig;
use crate::constants::REVIEW_REPORT_COLUMNS;
use crate::error::Result;
use crate::pipeline::processing::geocode::GeocodeMiss;
use crate::pipeline::report::RunReport;
use crate::types::Violation;

/// Writes the dataset and reports as local files.
pub struct CsvOutputAdapter {
    dataset_path: PathBuf,
    report_dir: PathBuf,
    misses_path: PathBuf,
    run_report_path: PathBuf,
}

impl CsvOutputAdapter {
    pub fn new(config: &OutputConfig) -> Self {
        Self {
            dataset_path: config.dataset_path.clone(),
            report_dir: config.report_dir.clone(),
            misses_path: config.misses_path.clone(),
            run_report_path: config.run_report_path.clone(),
        }
    }

    /// File the review report of `table` goes to.
    pub fn review_report_path(&self, table: &str) -> PathBuf {
        let safe: String = table
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.report_dir.join(format!("{}_errors.csv", safe))
    }

    fn writer(path: &Path) -> Result<csv::Writer<fs::File>> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        Ok(csv::Writer::from_path(path)?)
    }
}

#[async_trait]
impl DatasetOutputPort for CsvOutputAdapter {
    async fn write_dataset(&self, header: &[&str], rows: &[Vec<String>]) -> Result<()> {
        let mut writer = Self::writer(&self.dataset_path)?;
        writer.write_record(header)?;
        for row in rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        info!(path = %self.dataset_path.display(), rows = rows.len(), "wrote dataset");
        Ok(())
    }

    async fn write_review_report(&self, table: &str, violations: &[Violation]) -> Result<()> {
        let path = self.review_report_path(table);
        let mut writer = Self::writer(&path)?;
        writer.write_record(REVIEW_REPORT_COLUMNS)?;
        for v in violations {
            writer.write_record([
                v.row.to_string().as_str(),
                v.id.as_str(),
                v.column.as_str(),
                v.value.as_str(),
            ])?;
        }
        writer.flush()?;
        info!(path = %path.display(), count = violations.len(), "wrote review report");
        Ok(())
    }

    async fn write_geocode_misses(&self, misses: &[(GeocodeMiss, usize)]) -> Result<()> {
        let mut writer = Self::writer(&self.misses_path)?;
        for (miss, count) in misses {
            writer.write_record([
                miss.city.as_str(),
                miss.province.as_str(),
                miss.country.as_str(),
                count.to_string().as_str(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }

    async fn write_run_report(&self, report: &RunReport) -> Result<()> {
        if let Some(dir) = self.run_report_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.run_report_path, serde_json::to_string_pretty(report)?)?;
        Ok(())
    }
}
