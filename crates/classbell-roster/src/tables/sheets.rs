//! Google Sheets backend over the v4 values API.
//!
//! The first row of the sheet is the header. `write` is a single
//! `values.update` call whose grid is padded with blanks out to the extent
//! last read, so stale trailing rows are cleared in the same request.

use async_trait::async_trait;
use classbell_core::{
    error::ClassbellError,
    traits::{RecordTable, Table},
};
use serde::Deserialize;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

pub struct SheetsTable {
    client: reqwest::Client,
    api_base: String,
    sheet_id: String,
    sheet_name: String,
    access_token: String,
    /// (rows, cols) of the grid last read or written, header included.
    extent: Mutex<(usize, usize)>,
}

impl SheetsTable {
    pub fn new(sheet_id: &str, sheet_name: &str, access_token: &str, timeout: Duration) -> Self {
        Self::with_api_base(SHEETS_API, sheet_id, sheet_name, access_token, timeout)
    }

    pub fn with_api_base(
        api_base: &str,
        sheet_id: &str,
        sheet_name: &str,
        access_token: &str,
        timeout: Duration,
    ) -> Self {
        // Reads and writes run inside the roster critical section.
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            sheet_id: sheet_id.to_string(),
            sheet_name: sheet_name.to_string(),
            access_token: access_token.to_string(),
            extent: Mutex::new((0, 0)),
        }
    }

    /// `.../spreadsheets/{id}/values/{range}` with the range percent-encoded.
    fn values_url(&self, range: &str) -> Result<reqwest::Url, ClassbellError> {
        let mut url = reqwest::Url::parse(&self.api_base)
            .map_err(|e| ClassbellError::Config(format!("invalid sheets api url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ClassbellError::Config("sheets api url cannot be a base".into()))?
            .push(&self.sheet_id)
            .push("values")
            .push(range);
        Ok(url)
    }

    fn remember_extent(&self, rows: usize, cols: usize) {
        if let Ok(mut extent) = self.extent.lock() {
            *extent = (rows, cols);
        }
    }

    fn last_extent(&self) -> (usize, usize) {
        self.extent.lock().map(|e| *e).unwrap_or((0, 0))
    }
}

fn unavailable(what: &str, e: impl std::fmt::Display) -> ClassbellError {
    ClassbellError::StoreUnavailable(format!("sheets {what} failed: {e}"))
}

/// Render a cell the way a spreadsheet user sees it.
fn cell_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        other => other.to_string(),
    }
}

/// Header + rows as a rectangular grid at least `min_rows` x `min_cols`.
pub(crate) fn padded_grid(table: &Table, min_rows: usize, min_cols: usize) -> Vec<Vec<String>> {
    let width = table
        .rows
        .iter()
        .map(Vec::len)
        .chain([table.columns.len(), min_cols])
        .max()
        .unwrap_or(0);

    let mut grid: Vec<Vec<String>> = std::iter::once(&table.columns)
        .chain(table.rows.iter())
        .map(|r| {
            let mut r = r.clone();
            r.resize(width, String::new());
            r
        })
        .collect();
    while grid.len() < min_rows {
        grid.push(vec![String::new(); width]);
    }
    grid
}

pub(crate) fn grid_to_table(values: Vec<Vec<serde_json::Value>>) -> Table {
    let mut rows = values
        .iter()
        .map(|r| r.iter().map(cell_to_string).collect::<Vec<_>>());
    let columns = rows.next().unwrap_or_default();
    Table {
        columns,
        rows: rows.collect(),
    }
}

#[async_trait]
impl RecordTable for SheetsTable {
    fn name(&self) -> &str {
        "sheets"
    }

    async fn read(&self) -> Result<Table, ClassbellError> {
        let url = self.values_url(&self.sheet_name)?;
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .query(&[("valueRenderOption", "FORMATTED_VALUE")])
            .send()
            .await
            .map_err(|e| unavailable("read", e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(unavailable("read", format!("{status}: {body}")));
        }

        let range: ValueRange = resp.json().await.map_err(|e| unavailable("read", e))?;
        let rows = range.values.len();
        let cols = range.values.iter().map(Vec::len).max().unwrap_or(0);
        self.remember_extent(rows, cols);
        debug!("sheets: read {rows}x{cols}");
        Ok(grid_to_table(range.values))
    }

    async fn write(&self, table: &Table) -> Result<(), ClassbellError> {
        let (min_rows, min_cols) = self.last_extent();
        let grid = padded_grid(table, min_rows, min_cols);
        let rows = grid.len();
        let cols = grid.first().map(Vec::len).unwrap_or(0);

        let url = self.values_url(&format!("{}!A1", self.sheet_name))?;
        let body = serde_json::json!({
            "majorDimension": "ROWS",
            "values": grid,
        });
        let resp = self
            .client
            .put(url)
            .bearer_auth(&self.access_token)
            .query(&[("valueInputOption", "RAW")])
            .json(&body)
            .send()
            .await
            .map_err(|e| unavailable("write", e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(unavailable("write", format!("{status}: {body}")));
        }

        // The padding is now blank on the sheet; only the data extent matters.
        self.remember_extent(table.rows.len() + 1, cols);
        debug!("sheets: wrote {rows}x{cols}");
        Ok(())
    }
}
