//! Spreadsheet data source client
//!
//! This module provides the fetch capability the cache refreshes from: a
//! `RangeSource` trait exposing range and scalar reads, and a client for the
//! Google Sheets v4 values REST endpoint. The cache only ever sees the
//! trait, so tests can substitute a fake source.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use super::LeaderboardEntry;

/// Base URL for the Google Sheets v4 values API
const SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Errors that can occur when fetching spreadsheet data
#[derive(Debug, Error)]
pub enum SheetsError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The API answered with a non-success status
    #[error("sheet API returned status {0}")]
    Status(u16),

    /// Failed to parse the API response
    #[error("failed to parse sheet response: {0}")]
    ParseError(String),
}

/// Read capabilities of the remote spreadsheet
///
/// Both reads may fail with a transport or authorization error; the caller
/// decides whether stale data can stand in.
#[async_trait]
pub trait RangeSource: Send + Sync {
    /// Fetches an ordered block of raw cell values.
    async fn fetch_range(&self, sheet: &str, range: &str) -> Result<Vec<Vec<String>>, SheetsError>;

    /// Fetches a single raw cell value. An empty cell reads as `""`.
    async fn fetch_scalar(&self, sheet: &str, cell: &str) -> Result<String, SheetsError>;
}

/// Response from the values endpoint
#[derive(Debug, Deserialize)]
struct ValuesResponse {
    /// Row-major cell values; absent entirely when the range is empty
    #[serde(default)]
    values: Vec<Vec<String>>,
}

/// Client for the Google Sheets v4 values API
#[derive(Debug, Clone)]
pub struct SheetsClient {
    /// HTTP client for making requests
    http_client: Client,
    /// Base URL for the API (allows override for testing)
    base_url: String,
    /// Identifier of the spreadsheet serving as the data source
    spreadsheet_id: String,
    /// API key sent with every request
    api_key: String,
}

impl SheetsClient {
    /// Creates a new SheetsClient for the given spreadsheet.
    pub fn new(spreadsheet_id: String, api_key: String) -> Self {
        Self {
            http_client: Client::new(),
            base_url: SHEETS_BASE_URL.to_string(),
            spreadsheet_id,
            api_key,
        }
    }

    /// Creates a new SheetsClient with a custom base URL (for testing).
    #[cfg(test)]
    pub fn with_base_url(base_url: String, spreadsheet_id: String, api_key: String) -> Self {
        Self {
            http_client: Client::new(),
            base_url,
            spreadsheet_id,
            api_key,
        }
    }

    /// Runs one values.get call for an A1 range on a named sheet.
    async fn get_values(&self, sheet: &str, range: &str) -> Result<ValuesResponse, SheetsError> {
        let url = format!(
            "{}/{}/values/'{}'!{}",
            self.base_url, self.spreadsheet_id, sheet, range
        );

        let response = self
            .http_client
            .get(&url)
            .query(&[("key", self.api_key.as_str()), ("majorDimension", "ROWS")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SheetsError::Status(status.as_u16()));
        }

        response
            .json::<ValuesResponse>()
            .await
            .map_err(|e| SheetsError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl RangeSource for SheetsClient {
    async fn fetch_range(&self, sheet: &str, range: &str) -> Result<Vec<Vec<String>>, SheetsError> {
        Ok(self.get_values(sheet, range).await?.values)
    }

    async fn fetch_scalar(&self, sheet: &str, cell: &str) -> Result<String, SheetsError> {
        let values = self.get_values(sheet, cell).await?.values;
        Ok(values
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .unwrap_or_default())
    }
}

/// Maps raw range rows to leaderboard entries, preserving row order.
pub fn parse_leaderboard(rows: &[Vec<String>]) -> Vec<LeaderboardEntry> {
    rows.iter().map(|row| LeaderboardEntry::from_row(row)).collect()
}
