use std::fmt;

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CATEGORY: &str = "Enhancement";

/// Status column value of a time-tracking row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntryStatus {
    Wip,
    Billed,
    Paid,
    Other(String),
}

impl EntryStatus {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "WIP" => EntryStatus::Wip,
            "BILLED" => EntryStatus::Billed,
            "PAID" => EntryStatus::Paid,
            _ => EntryStatus::Other(trimmed.to_string()),
        }
    }

    /// Text written back into the sheet for this status.
    pub fn as_str(&self) -> &str {
        match self {
            EntryStatus::Wip => "WIP",
            EntryStatus::Billed => "Billed",
            EntryStatus::Paid => "Paid",
            EntryStatus::Other(text) => text,
        }
    }

    pub fn is_wip(&self) -> bool {
        matches!(self, EntryStatus::Wip)
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for EntryStatus {
    fn from(raw: String) -> Self {
        EntryStatus::parse(&raw)
    }
}

impl From<EntryStatus> for String {
    fn from(status: EntryStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Status a WIP row moves to once its invoice is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TerminalStatus {
    #[default]
    Billed,
    Paid,
}

impl From<TerminalStatus> for EntryStatus {
    fn from(status: TerminalStatus) -> Self {
        match status {
            TerminalStatus::Billed => EntryStatus::Billed,
            TerminalStatus::Paid => EntryStatus::Paid,
        }
    }
}

/// A single billable row read from the time-tracking sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkEntry {
    pub date: String,
    pub hours: BigDecimal,
    pub category: String,
    pub description: String,
    pub persons: String,
    pub invoice_id: String,
    pub status: EntryStatus,
    /// 1-based row number in the worksheet (the header is row 1).
    pub source_row: usize,
}

impl WorkEntry {
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        parse_sheet_date(&self.date)
    }
}

/// Parse the date formats people type into the sheet ("6/4/25", "6/4/2025", "2025-06-04").
pub fn parse_sheet_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    // %y before %Y: chrono's %Y accepts "25" as the year 0025.
    ["%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
}
