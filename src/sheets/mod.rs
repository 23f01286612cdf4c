//! Access to the time-tracking spreadsheet.
//!
//! The rest of the crate talks to the sheet only through [`RowSource`], so the
//! extraction and reconciliation code never sees the Google wire format.

mod auth;
mod google;
#[cfg(test)]
pub mod memory;

use thiserror::Error;

use crate::config::Rgb;

pub use google::GoogleSheets;

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("credentials error: {0}")]
    Credentials(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("sheets api returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("worksheet '{0}' not found")]
    WorksheetNotFound(String),

    #[error("column '{0}' not found in header row")]
    MissingColumn(String),

    #[error("worksheet is empty")]
    EmptySheet,

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, SheetError>;

/// New text for one cell, addressed by 1-based row and 0-based column.
#[derive(Debug, Clone, PartialEq)]
pub struct CellWrite {
    pub row: usize,
    pub column: usize,
    pub value: String,
}

/// Background color for the leading `columns` cells of one row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowHighlight {
    pub row: usize,
    pub columns: usize,
    pub color: Rgb,
}

/// Value and format changes submitted together in one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateBatch {
    pub values: Vec<CellWrite>,
    pub highlights: Vec<RowHighlight>,
}

impl UpdateBatch {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.highlights.is_empty()
    }
}

/// Tabular storage holding the time-tracking rows.
#[allow(async_fn_in_trait)]
pub trait RowSource {
    /// Every row of `worksheet`, header first. Rows may be ragged.
    async fn read_rows(&self, worksheet: &str) -> Result<Vec<Vec<String>>>;

    /// Submit `batch` against `worksheet` in as few round trips as the backend allows.
    async fn apply_updates(&self, worksheet: &str, batch: &UpdateBatch) -> Result<()>;
}
