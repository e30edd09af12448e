use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::app::a1::A1Range;
use crate::app::ports::{InputMode, SheetPort, SheetProvisionerPort};
use crate::config::{ProvisioningConfig, TableConfig};
use crate::constants::{COUNTRY, ID};
use crate::error::{CleanerError, Result};

/// Worksheet the template carries its data on.
const TEMPLATE_WORKSHEET_GID: i64 = 0;

/// Registry columns: title, worksheet, region code, spreadsheet id, URL.
const REGISTRY_WIDTH: usize = 5;

/// What a provisioning run created.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionedTable {
    pub table: TableConfig,
    pub url: String,
    pub registry_row: usize,
}

impl ProvisionedTable {
    /// `[[tables]]` stanza to paste into the config file.
    pub fn config_stanza(&self) -> Result<String> {
        #[derive(Serialize)]
        struct Stanza<'a> {
            tables: [&'a TableConfig; 1],
        }
        toml::to_string(&Stanza { tables: [&self.table] })
            .map_err(|e| CleanerError::Config(format!("cannot render table stanza: {}", e)))
    }
}

/// Next free region code: one past the highest numeric code in use, zero
/// padded to three digits.
pub fn next_region_code(tables: &[TableConfig]) -> String {
    let highest = tables
        .iter()
        .filter_map(|t| t.region_code.trim().parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("{:03}", highest + 1)
}

/// Creates a new regional table from the template and records it in the
/// registry sheet.
pub struct ProvisionUseCase {
    provisioner: Arc<dyn SheetProvisionerPort>,
    sheets: Arc<dyn SheetPort>,
    config: ProvisioningConfig,
}

impl ProvisionUseCase {
    pub fn new(
        provisioner: Arc<dyn SheetProvisionerPort>,
        sheets: Arc<dyn SheetPort>,
        config: ProvisioningConfig,
    ) -> Self {
        Self {
            provisioner,
            sheets,
            config,
        }
    }

    pub async fn provision(
        &self,
        title: &str,
        worksheet: &str,
        existing: &[TableConfig],
    ) -> Result<ProvisionedTable> {
        let region_code = next_region_code(existing);
        let spreadsheet_id = self
            .provisioner
            .copy_spreadsheet(&self.config.template_sheet_id, title)
            .await?;
        info!(%spreadsheet_id, %title, "copied template");

        self.provisioner
            .rename_worksheet(&spreadsheet_id, TEMPLATE_WORKSHEET_GID, worksheet)
            .await?;
        let message = format!("New line list sheet '{}' is ready for data entry.", title);
        self.provisioner
            .share_with_group(&spreadsheet_id, &self.config.share_with, &message)
            .await?;

        let url = format!("https://docs.google.com/spreadsheets/d/{}/", spreadsheet_id);
        let registry_row = self.append_registry_row(title, worksheet, &region_code, &spreadsheet_id, &url).await?;

        Ok(ProvisionedTable {
            table: TableConfig {
                name: worksheet.to_string(),
                sheet_id: spreadsheet_id,
                region_code,
                legacy_bare_ids: false,
                id_column: ID.to_string(),
                reference_column: COUNTRY.to_string(),
            },
            url,
            registry_row,
        })
    }

    async fn append_registry_row(
        &self,
        title: &str,
        worksheet: &str,
        region_code: &str,
        spreadsheet_id: &str,
        url: &str,
    ) -> Result<usize> {
        let registry = &self.config.registry_name;
        let used = self
            .sheets
            .read_range(&self.config.registry_sheet_id, &A1Range::column(registry, 0)?)
            .await?;
        let row = used.len() + 1;
        let range = A1Range::row_span(registry, row, 0, REGISTRY_WIDTH - 1)?;
        let values = vec![vec![
            title.to_string(),
            worksheet.to_string(),
            // leading quote keeps the zero padding
            format!("'{}", region_code),
            spreadsheet_id.to_string(),
            url.to_string(),
        ]];
        self.sheets
            .write_range(&self.config.registry_sheet_id, &range, values, InputMode::UserEntered)
            .await?;
        info!(row, %region_code, "registered new table");
        Ok(row)
    }
}
