//! Turns raw worksheet rows into typed work entries.

use std::str::FromStr;

use bigdecimal::{BigDecimal, Zero};
use tracing::{debug, warn};

use crate::models::{EntryStatus, WorkEntry, DEFAULT_CATEGORY};
use crate::sheets::SheetError;

const DATE_ALIASES: &[&str] = &["date"];
const HOURS_ALIASES: &[&str] = &["hours"];
const CATEGORY_ALIASES: &[&str] = &["category"];
const TASK_ALIASES: &[&str] = &["task/work", "task", "work", "description"];
const PERSONS_ALIASES: &[&str] = &["persons", "person"];
const INVOICE_ALIASES: &[&str] = &["invoice"];
const STATUS_ALIASES: &[&str] = &["status", "paid"];

/// Column indices of the logical fields, resolved once from the header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub date: usize,
    pub hours: usize,
    pub category: Option<usize>,
    pub task: usize,
    pub persons: Option<usize>,
    pub invoice: usize,
    pub status: usize,
}

impl ColumnMap {
    pub fn from_headers(headers: &[String]) -> Result<Self, SheetError> {
        let normalized: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
        let required = |field: &str, aliases: &[&str]| {
            find_column(&normalized, aliases).ok_or_else(|| SheetError::MissingColumn(field.to_string()))
        };

        Ok(Self {
            date: required("date", DATE_ALIASES)?,
            hours: required("hours", HOURS_ALIASES)?,
            category: find_column(&normalized, CATEGORY_ALIASES),
            task: required("task", TASK_ALIASES)?,
            persons: find_column(&normalized, PERSONS_ALIASES),
            invoice: required("invoice", INVOICE_ALIASES)?,
            status: required("status", STATUS_ALIASES)?,
        })
    }

    /// Rows shorter than this cannot carry every required field.
    pub fn min_span(&self) -> usize {
        [self.date, self.hours, self.task, self.invoice, self.status]
            .into_iter()
            .max()
            .unwrap_or(0)
            + 1
    }
}

// Exact header match beats a substring match, so "Invoice" wins over "Invoice Date".
fn find_column(headers: &[String], aliases: &[&str]) -> Option<usize> {
    aliases
        .iter()
        .find_map(|alias| headers.iter().position(|h| h == alias))
        .or_else(|| {
            aliases
                .iter()
                .find_map(|alias| headers.iter().position(|h| h.contains(alias)))
        })
}

/// Which rows an extraction pass looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Status(EntryStatus),
    Invoice(String),
}

impl Selection {
    fn matches(&self, status: &EntryStatus, invoice: &str) -> bool {
        match self {
            Selection::All => true,
            Selection::Status(wanted) => wanted == status,
            Selection::Invoice(id) => id == invoice,
        }
    }
}

/// A row that was selected but could not become a work entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowWarning {
    pub row: usize,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct Extraction {
    pub entries: Vec<WorkEntry>,
    pub warnings: Vec<RowWarning>,
}

pub(crate) fn cell(row: &[String], index: usize) -> &str {
    row.get(index).map(|value| value.trim()).unwrap_or("")
}

/// Extract the work entries of `rows` (header row first) picked by `selection`.
///
/// Invalid rows are dropped: unparseable hours are reported as warnings, while
/// short rows and rows without hours, date or description are skipped quietly.
pub fn extract_entries(rows: &[Vec<String>], columns: &ColumnMap, selection: &Selection) -> Extraction {
    let mut extraction = Extraction::default();
    let min_span = columns.min_span();

    for (index, row) in rows.iter().enumerate().skip(1) {
        let row_number = index + 1;
        if row.len() < min_span {
            continue;
        }

        let status = EntryStatus::parse(cell(row, columns.status));
        let invoice_id = cell(row, columns.invoice);
        if !selection.matches(&status, invoice_id) {
            continue;
        }

        let raw_hours = cell(row, columns.hours);
        let hours = match BigDecimal::from_str(raw_hours) {
            Ok(hours) => hours,
            Err(_) => {
                warn!(row = row_number, value = raw_hours, "invalid hours value, skipping row");
                extraction.warnings.push(RowWarning {
                    row: row_number,
                    message: format!("invalid hours value '{}'", raw_hours),
                });
                continue;
            }
        };

        let date = cell(row, columns.date);
        let description = cell(row, columns.task);
        if hours <= BigDecimal::zero() || date.is_empty() || description.is_empty() {
            debug!(row = row_number, "skipping incomplete row");
            continue;
        }

        let category = columns
            .category
            .map(|index| cell(row, index))
            .filter(|category| !category.is_empty())
            .unwrap_or(DEFAULT_CATEGORY);

        extraction.entries.push(WorkEntry {
            date: date.to_string(),
            hours,
            category: category.to_string(),
            description: description.to_string(),
            persons: columns.persons.map(|index| cell(row, index)).unwrap_or("").to_string(),
            invoice_id: invoice_id.to_string(),
            status,
            source_row: row_number,
        });
    }

    debug!(
        entries = extraction.entries.len(),
        warnings = extraction.warnings.len(),
        "extracted work entries"
    );
    extraction
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|cell| cell.to_string()).collect()
    }

    pub fn header() -> Vec<String> {
        strings(&["Date", "Hours", "Category", "Task/Work", "Persons", "Invoice", "Paid"])
    }

    fn sheet(rows: &[&[&str]]) -> Vec<Vec<String>> {
        std::iter::once(header())
            .chain(rows.iter().map(|row| strings(row)))
            .collect()
    }

    #[test]
    fn test_column_map_from_headers() {
        let columns = ColumnMap::from_headers(&header()).unwrap();

        assert_eq!(columns.date, 0);
        assert_eq!(columns.hours, 1);
        assert_eq!(columns.category, Some(2));
        assert_eq!(columns.task, 3);
        assert_eq!(columns.persons, Some(4));
        assert_eq!(columns.invoice, 5);
        assert_eq!(columns.status, 6);
        assert_eq!(columns.min_span(), 7);
    }

    #[test]
    fn test_header_matching_is_fuzzy_but_prefers_exact() {
        let headers = strings(&["Work Date", "Total Hours", "Work", "Invoice Date", "INVOICE", "Status"]);
        let columns = ColumnMap::from_headers(&headers).unwrap();

        assert_eq!(columns.date, 0);
        assert_eq!(columns.hours, 1);
        assert_eq!(columns.task, 2);
        assert_eq!(columns.invoice, 4);
        assert_eq!(columns.status, 5);
        assert_eq!(columns.category, None);
        assert_eq!(columns.persons, None);
    }

    #[test]
    fn test_missing_required_column() {
        let headers = strings(&["Date", "Hours", "Task", "Invoice"]);
        let err = ColumnMap::from_headers(&headers).unwrap_err();

        assert!(matches!(err, SheetError::MissingColumn(field) if field == "status"));
    }

    #[test]
    fn test_malformed_hours_row_is_dropped_with_warning() {
        let rows = sheet(&[
            &["2024-01-01", "3.5", "Enhancement", "Fix bug", "BK", "NES01-0005", "WIP"],
            &["2024-01-02", "abc", "Enhancement", "Fix more", "BK", "NES01-0005", "WIP"],
        ]);
        let columns = ColumnMap::from_headers(&rows[0]).unwrap();

        let extraction = extract_entries(&rows, &columns, &Selection::Status(EntryStatus::Wip));

        assert_eq!(extraction.entries.len(), 1);
        let entry = &extraction.entries[0];
        assert_eq!(entry.hours, BigDecimal::from_str("3.5").unwrap());
        assert_eq!(entry.description, "Fix bug");
        assert_eq!(entry.invoice_id, "NES01-0005");
        assert_eq!(entry.source_row, 2);

        assert_eq!(extraction.warnings.len(), 1);
        assert_eq!(extraction.warnings[0].row, 3);
    }

    #[test]
    fn test_invalid_rows_never_extracted() {
        let rows = sheet(&[
            &["6/4/25", "0", "Enhancement", "No time", "BK", "", "WIP"],
            &["6/4/25", "-2", "Enhancement", "Negative", "BK", "", "WIP"],
            &["", "4", "Enhancement", "No date", "BK", "", "WIP"],
            &["6/4/25", "4", "Enhancement", "", "BK", "", "WIP"],
            &["6/4/25", "4", "Enhancement", "Short row"],
            &["6/5/25", "2.25", "", "Valid", "", "", "WIP"],
        ]);
        let columns = ColumnMap::from_headers(&rows[0]).unwrap();

        // Row order must not matter.
        let mut reversed = rows.clone();
        reversed[1..].reverse();

        for input in [&rows, &reversed] {
            let extraction = extract_entries(input, &columns, &Selection::All);
            assert_eq!(extraction.entries.len(), 1);
            assert!(extraction.warnings.is_empty());
            for entry in &extraction.entries {
                assert!(entry.hours > BigDecimal::zero());
                assert!(!entry.date.is_empty());
                assert!(!entry.description.is_empty());
            }
        }
    }

    #[test]
    fn test_category_defaults_to_enhancement() {
        let rows = sheet(&[&["6/5/25", "2", "", "Review", "DH", "", "WIP"]]);
        let columns = ColumnMap::from_headers(&rows[0]).unwrap();

        let extraction = extract_entries(&rows, &columns, &Selection::All);
        assert_eq!(extraction.entries[0].category, DEFAULT_CATEGORY);
    }

    #[test]
    fn test_selection_skips_before_parsing() {
        let rows = sheet(&[
            &["6/1/25", "n/a", "Enhancement", "Old row", "BK", "NES01-0001", "Paid"],
            &["6/2/25", "5", "Enhancement", "Billed row", "BK", "NES01-0002", "Billed"],
            &["6/3/25", "6", "New Development", "Current", "BK", "NES01-0002", "WIP"],
        ]);
        let columns = ColumnMap::from_headers(&rows[0]).unwrap();

        let wip = extract_entries(&rows, &columns, &Selection::Status(EntryStatus::Wip));
        assert_eq!(wip.entries.len(), 1);
        assert!(wip.warnings.is_empty());
        assert_eq!(wip.entries[0].source_row, 4);

        let invoice = extract_entries(&rows, &columns, &Selection::Invoice("NES01-0002".to_string()));
        let rows_seen: Vec<usize> = invoice.entries.iter().map(|e| e.source_row).collect();
        assert_eq!(rows_seen, vec![3, 4]);
    }
}
