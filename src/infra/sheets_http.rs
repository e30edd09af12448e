use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::app::a1::A1Range;
use crate::app::ports::{InputMode, SheetPort, SheetProvisionerPort};
use crate::config::RemoteConfig;
use crate::error::{CleanerError, Result};
use crate::types::Cell;

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct CopiedFile {
    id: String,
}

/// Google Sheets / Drive REST client authenticated with a bearer token.
pub struct SheetsHttpClient {
    client: Client,
    sheets_url: String,
    drive_url: String,
    token: String,
}

impl SheetsHttpClient {
    pub fn new(config: &RemoteConfig, token: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent("linelist-cleaner/0.1")
            .build()?;
        Ok(Self {
            client,
            sheets_url: config.base_url.trim_end_matches('/').to_string(),
            drive_url: config.drive_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Reads the token from the environment variable named in the config.
    pub fn from_env(config: &RemoteConfig) -> Result<Self> {
        let token = std::env::var(&config.access_token_env).map_err(|e| {
            CleanerError::Config(format!("{} is not usable: {}", config.access_token_env, e))
        })?;
        Self::new(config, token)
    }

    fn url(base: &str, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(base).map_err(|e| CleanerError::Config(format!("bad URL '{}': {}", base, e)))?;
        url.path_segments_mut()
            .map_err(|_| CleanerError::Config(format!("URL '{}' cannot take a path", base)))?
            .extend(segments);
        Ok(url)
    }

    fn values_url(&self, spreadsheet_id: &str, range: &A1Range) -> Result<Url> {
        Self::url(
            &self.sheets_url,
            &["spreadsheets", spreadsheet_id, "values", range.to_string().as_str()],
        )
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(CleanerError::Api {
            message: format!("HTTP {}: {}", status.as_u16(), body),
        })
    }
}

#[async_trait]
impl SheetPort for SheetsHttpClient {
    async fn read_range(&self, spreadsheet_id: &str, range: &A1Range) -> Result<Vec<Vec<Cell>>> {
        let mut url = self.values_url(spreadsheet_id, range)?;
        url.query_pairs_mut()
            .append_pair("valueRenderOption", "FORMATTED_VALUE")
            .append_pair("majorDimension", "ROWS");
        debug!(range = %range, "reading range");

        let response = self.client.get(url).bearer_auth(&self.token).send().await?;
        let body: ValueRange = Self::check(response).await?.json().await?;
        Ok(body
            .values
            .iter()
            .map(|row| row.iter().map(Cell::from_json).collect())
            .collect())
    }

    async fn write_range(
        &self,
        spreadsheet_id: &str,
        range: &A1Range,
        rows: Vec<Vec<String>>,
        mode: InputMode,
    ) -> Result<()> {
        let mut url = self.values_url(spreadsheet_id, range)?;
        let option = match mode {
            InputMode::UserEntered => "USER_ENTERED",
            InputMode::Raw => "RAW",
        };
        url.query_pairs_mut().append_pair("valueInputOption", option);
        debug!(range = %range, rows = rows.len(), "writing range");

        let body = json!({
            "range": range.to_string(),
            "majorDimension": "ROWS",
            "values": rows,
        });
        let response = self
            .client
            .put(url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl SheetProvisionerPort for SheetsHttpClient {
    async fn copy_spreadsheet(&self, template_id: &str, title: &str) -> Result<String> {
        let url = Self::url(&self.drive_url, &["files", template_id, "copy"])?;
        let body = json!({ "name": title, "writersCanShare": true });
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        let copied: CopiedFile = Self::check(response).await?.json().await?;
        Ok(copied.id)
    }

    async fn rename_worksheet(&self, spreadsheet_id: &str, worksheet_gid: i64, title: &str) -> Result<()> {
        let url = Self::url(
            &self.sheets_url,
            &["spreadsheets", format!("{}:batchUpdate", spreadsheet_id).as_str()],
        )?;
        let body = json!({
            "requests": [{
                "updateSheetProperties": {
                    "properties": { "sheetId": worksheet_gid, "title": title },
                    "fields": "title"
                }
            }]
        });
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn share_with_group(&self, spreadsheet_id: &str, email: &str, message: &str) -> Result<()> {
        let mut url = Self::url(&self.drive_url, &["files", spreadsheet_id, "permissions"])?;
        url.query_pairs_mut()
            .append_pair("sendNotificationEmail", "true")
            .append_pair("emailMessage", message)
            .append_pair("fields", "id");
        let body = json!({ "type": "group", "role": "writer", "emailAddress": email });
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
