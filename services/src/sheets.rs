//! External attendance table client.
//!
//! Column layout (one row per submission):
//! A Course, B Section, C Name, D ID, E Email, F Timestamp, G IP.
//! Duplicate detection reads only the E:F columns; appends write A:G.

use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Deserialize;
use serde_json::json;

use crate::error::TableError;

const SHEETS_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Operations the submission pipeline needs from the external table.
#[async_trait]
pub trait AttendanceTable: Send + Sync {
    /// True if a row with this (lower-cased) email and date already exists.
    async fn has_submitted(
        &self,
        access_token: &str,
        email: &str,
        date: &str,
    ) -> Result<bool, TableError>;

    /// Append one seven-column row.
    async fn append(&self, access_token: &str, row: &[String]) -> Result<(), TableError>;
}

#[derive(Debug, Default, Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

/// Scan (email, timestamp) rows for a same-email, same-date entry. The date
/// is the first 10 characters of the stored timestamp (`YYYY-MM-DD`).
pub fn contains_submission(values: &[Vec<String>], email: &str, date: &str) -> bool {
    let email = email.trim().to_lowercase();
    let date = date.trim();

    values.iter().any(|row| {
        let row_email = row
            .first()
            .map(|s| s.trim().to_lowercase())
            .unwrap_or_default();
        let row_date: String = row
            .get(1)
            .map(|s| s.trim().chars().take(10).collect())
            .unwrap_or_default();
        row_email == email && row_date == date
    })
}

/// Google Sheets values API client for one spreadsheet tab.
pub struct SheetsClient {
    client: reqwest::Client,
    spreadsheet_id: String,
    tab: String,
}

impl SheetsClient {
    pub fn new(
        client: reqwest::Client,
        spreadsheet_id: impl Into<String>,
        tab: impl Into<String>,
    ) -> Self {
        Self {
            client,
            spreadsheet_id: spreadsheet_id.into(),
            tab: tab.into(),
        }
    }

    fn values_url(&self, range: &str) -> String {
        let full_range = format!("{}!{}", self.tab, range);
        let encoded = utf8_percent_encode(&full_range, NON_ALPHANUMERIC);
        format!("{SHEETS_BASE}/{}/values/{}", self.spreadsheet_id, encoded)
    }
}

#[async_trait]
impl AttendanceTable for SheetsClient {
    async fn has_submitted(
        &self,
        access_token: &str,
        email: &str,
        date: &str,
    ) -> Result<bool, TableError> {
        let url = self.values_url("E:F");
        let resp = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(Duration::from_secs(20))
            .send()
            .await
            .map_err(|source| TableError::Transport {
                op: "read",
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TableError::Api {
                op: "read",
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ValuesResponse =
            resp.json()
                .await
                .map_err(|source| TableError::Transport {
                    op: "read",
                    source,
                })?;
        Ok(contains_submission(&parsed.values, email, date))
    }

    async fn append(&self, access_token: &str, row: &[String]) -> Result<(), TableError> {
        let url = format!(
            "{}:append?valueInputOption=USER_ENTERED&insertDataOption=INSERT_ROWS",
            self.values_url("A:G")
        );
        let resp = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(&json!({ "values": [row] }))
            .timeout(Duration::from_secs(20))
            .send()
            .await
            .map_err(|source| TableError::Transport {
                op: "append",
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TableError::Api {
                op: "append",
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
