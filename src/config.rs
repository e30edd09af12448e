use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{COUNTRY, ID};
use crate::error::{CleanerError, Result};
use crate::pipeline::processing::geocode::GazetteerFormat;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub remote: RemoteConfig,
    pub gazetteer: GazetteerConfig,
    pub output: OutputConfig,
    /// Pause between successive write batches against one table.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    /// Processed in this order.
    pub tables: Vec<TableConfig>,
    pub provisioning: Option<ProvisioningConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_sheets_url")]
    pub base_url: String,
    #[serde(default = "default_drive_url")]
    pub drive_url: String,
    /// Environment variable holding the OAuth bearer token.
    #[serde(default = "default_token_env")]
    pub access_token_env: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GazetteerConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub layout: GazetteerFormat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub dataset_path: PathBuf,
    pub report_dir: PathBuf,
    pub misses_path: PathBuf,
    pub run_report_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableConfig {
    /// Worksheet title.
    pub name: String,
    pub sheet_id: String,
    /// Prefix of newly assigned ids.
    #[serde(default)]
    pub region_code: String,
    /// Tables that predate region prefixes and keep bare numeric ids.
    #[serde(default)]
    pub legacy_bare_ids: bool,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    /// Column whose length says how many rows need an id.
    #[serde(default = "default_reference_column")]
    pub reference_column: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvisioningConfig {
    pub template_sheet_id: String,
    pub share_with: String,
    pub registry_sheet_id: String,
    pub registry_name: String,
}

fn default_pacing_ms() -> u64 {
    1000
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_sheets_url() -> String {
    "https://sheets.googleapis.com/v4".to_string()
}

fn default_drive_url() -> String {
    "https://www.googleapis.com/drive/v3".to_string()
}

fn default_token_env() -> String {
    "SHEETS_ACCESS_TOKEN".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_id_column() -> String {
    ID.to_string()
}

fn default_reference_column() -> String {
    COUNTRY.to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CleanerError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tables.is_empty() {
            return Err(CleanerError::Config("no [[tables]] configured".to_string()));
        }
        let mut names = HashSet::new();
        for table in &self.tables {
            if !names.insert(table.name.as_str()) {
                return Err(CleanerError::Config(format!("table '{}' listed twice", table.name)));
            }
            if !table.legacy_bare_ids && table.region_code.trim().is_empty() {
                return Err(CleanerError::Config(format!(
                    "table '{}' needs a region_code or legacy_bare_ids = true",
                    table.name
                )));
            }
        }
        Ok(())
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
pacing_ms = 250

[remote]

[gazetteer]
path = "geo_admin.tsv"
layout = "compact"

[output]
dataset_path = "out/latestdata.csv"
report_dir = "out/reports"
misses_path = "out/geocode_misses.csv"
run_report_path = "out/run.json"

[[tables]]
name = "outside_Hubei"
sheet_id = "sheet-a"
legacy_bare_ids = true

[[tables]]
name = "Africa"
sheet_id = "sheet-b"
region_code = "004"
"#;

    #[test]
    fn test_parses_sample_config_with_defaults() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(config.pacing(), Duration::from_millis(250));
        assert_eq!(config.remote.access_token_env, "SHEETS_ACCESS_TOKEN");
        assert_eq!(config.gazetteer.layout, GazetteerFormat::Compact);
        assert_eq!(config.tables.len(), 2);
        assert_eq!(config.tables[0].id_column, "ID");
        assert_eq!(config.tables[1].reference_column, "country");
        assert!(config.provisioning.is_none());
    }

    #[test]
    fn test_rejects_missing_region_code() {
        let broken = SAMPLE.replace("region_code = \"004\"", "");
        assert!(matches!(Config::from_toml(&broken), Err(CleanerError::Config(_))));
    }

    #[test]
    fn test_rejects_duplicate_tables() {
        let broken = SAMPLE.replace("name = \"Africa\"", "name = \"outside_Hubei\"");
        assert!(matches!(Config::from_toml(&broken), Err(CleanerError::Config(_))));
    }
}
