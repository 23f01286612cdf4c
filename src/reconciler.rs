//! Moves every row of a confirmed invoice to its terminal status and repaints
//! the invoice's rows with the billed highlight.
//!
//! Work happens in two phases so callers can decide in between: [`ReconcilePlan::compute`]
//! reads nothing but the rows it is given, and [`apply`] submits the plan as one batch.
//! Both phases are safe to repeat; a second run finds nothing left to transition and
//! only paints the same color again.

use tracing::{info, warn};

use crate::config::HighlightConfig;
use crate::extractor::{cell, ColumnMap};
use crate::models::{EntryStatus, TerminalStatus};
use crate::sheets::{CellWrite, RowHighlight, RowSource, UpdateBatch};

/// A worksheet row tagged with the invoice being reconciled.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEntry {
    pub row_number: usize,
    pub invoice_id: String,
    pub status: EntryStatus,
    pub date: String,
    pub hours: String,
    pub description: String,
}

impl StatusEntry {
    fn needs_transition(&self) -> bool {
        self.status.is_wip()
    }
}

#[derive(Debug, Clone)]
pub struct ReconcilePlan {
    pub invoice_id: String,
    pub target: EntryStatus,
    /// Every row belonging to the invoice, in sheet order.
    pub entries: Vec<StatusEntry>,
    status_column: usize,
    invoice_column: usize,
    highlight: HighlightConfig,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub transitioned: usize,
    pub highlighted: usize,
    /// Set when the write-back failed; nothing in the plan was marked applied.
    pub warning: Option<String>,
}

impl ReconcilePlan {
    /// Collect the rows whose invoice cell equals `invoice_id`, whatever their status.
    ///
    /// `seed_rows` are the rows the invoice was built from. Those with an empty
    /// invoice cell join the plan and get the id written alongside their status.
    pub fn compute(
        rows: &[Vec<String>],
        columns: &ColumnMap,
        invoice_id: &str,
        seed_rows: &[usize],
        target: TerminalStatus,
        highlight: &HighlightConfig,
    ) -> Self {
        let invoice_id = invoice_id.trim();
        let entries = rows
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(index, row)| {
                let row_number = index + 1;
                let invoice = cell(row, columns.invoice);
                let seeded = invoice.is_empty() && seed_rows.contains(&row_number);
                if invoice != invoice_id && !seeded {
                    return None;
                }

                Some(StatusEntry {
                    row_number,
                    invoice_id: invoice.to_string(),
                    status: EntryStatus::parse(cell(row, columns.status)),
                    date: cell(row, columns.date).to_string(),
                    hours: cell(row, columns.hours).to_string(),
                    description: cell(row, columns.task).to_string(),
                })
            })
            .collect();

        Self {
            invoice_id: invoice_id.to_string(),
            target: target.into(),
            entries,
            status_column: columns.status,
            invoice_column: columns.invoice,
            highlight: highlight.clone(),
        }
    }

    /// Rows still in WIP.
    pub fn pending(&self) -> impl Iterator<Item = &StatusEntry> {
        self.entries.iter().filter(|entry| entry.needs_transition())
    }

    /// Rows already past WIP; they only get repainted.
    pub fn resolved(&self) -> impl Iterator<Item = &StatusEntry> {
        self.entries.iter().filter(|entry| !entry.needs_transition())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All writes for this plan, addressed by row number rather than by cell content.
    pub fn to_batch(&self) -> UpdateBatch {
        let mut batch = UpdateBatch::default();

        for entry in self.pending() {
            batch.values.push(CellWrite {
                row: entry.row_number,
                column: self.status_column,
                value: self.target.as_str().to_string(),
            });
            if entry.invoice_id.is_empty() {
                batch.values.push(CellWrite {
                    row: entry.row_number,
                    column: self.invoice_column,
                    value: self.invoice_id.clone(),
                });
            }
        }

        batch.highlights = self
            .entries
            .iter()
            .map(|entry| RowHighlight {
                row: entry.row_number,
                columns: self.highlight.columns,
                color: self.highlight.color,
            })
            .collect();

        batch
    }

    fn mark_applied(&mut self) {
        for entry in self.entries.iter_mut().filter(|entry| entry.needs_transition()) {
            entry.status = self.target.clone();
            entry.invoice_id = self.invoice_id.clone();
        }
    }
}

/// Submit `plan` in a single batch.
///
/// Failures are reported in the returned [`ReconcileReport`] rather than as an
/// error: the invoice already exists, and the plan can be recomputed and re-run.
pub async fn apply<S: RowSource>(source: &S, worksheet: &str, plan: &mut ReconcilePlan) -> ReconcileReport {
    let batch = plan.to_batch();
    if batch.is_empty() {
        return ReconcileReport::default();
    }

    let transitioned = plan.pending().count();
    let highlighted = batch.highlights.len();

    match source.apply_updates(worksheet, &batch).await {
        Ok(()) => {
            plan.mark_applied();
            info!(
                invoice = %plan.invoice_id,
                status = %plan.target,
                transitioned,
                highlighted,
                "reconciled invoice rows"
            );
            ReconcileReport {
                transitioned,
                highlighted,
                warning: None,
            }
        }
        Err(err) => {
            warn!(invoice = %plan.invoice_id, error = %err, "write-back failed");
            ReconcileReport {
                warning: Some(format!("could not update the sheet: {}", err)),
                ..ReconcileReport::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::tests::header;
    use crate::extractor::{extract_entries, Selection};
    use crate::sheets::memory::MemorySheet;

    const SHEET: &str = "Sheet1";
    const HEADER: [&str; 7] = ["Date", "Hours", "Category", "Task/Work", "Persons", "Invoice", "Paid"];

    async fn plan_for(sheet: &MemorySheet, invoice_id: &str, seeds: &[usize]) -> ReconcilePlan {
        let rows = sheet.read_rows(SHEET).await.unwrap();
        let columns = ColumnMap::from_headers(&rows[0]).unwrap();
        ReconcilePlan::compute(
            &rows,
            &columns,
            invoice_id,
            seeds,
            TerminalStatus::Billed,
            &HighlightConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_only_wip_rows_transition_but_all_rows_highlight() {
        let sheet = MemorySheet::new(
            SHEET,
            vec![
                HEADER.to_vec(),
                vec!["6/1/25", "4", "Enhancement", "Old work", "BK", "NES01-0006", "Billed"],
                vec!["6/2/25", "3", "Enhancement", "New work", "BK", "NES01-0006", "WIP"],
                vec!["6/2/25", "2", "Enhancement", "Other invoice", "BK", "NES01-0007", "WIP"],
            ],
        );

        let mut plan = plan_for(&sheet, "NES01-0006", &[]).await;
        assert_eq!(plan.pending().count(), 1);
        assert_eq!(plan.resolved().count(), 1);

        let report = apply(&sheet, SHEET, &mut plan).await;

        assert_eq!(report.transitioned, 1);
        assert_eq!(report.highlighted, 2);
        assert!(report.warning.is_none());
        assert_eq!(sheet.cell(2, 6), "Billed");
        assert_eq!(sheet.cell(3, 6), "Billed");
        assert_eq!(sheet.cell(4, 6), "WIP");

        let color = HighlightConfig::default().color;
        assert_eq!(sheet.highlight(2), Some((7, color)));
        assert_eq!(sheet.highlight(3), Some((7, color)));
        assert_eq!(sheet.highlight(4), None);
        assert_eq!(sheet.batches(), 1);

        assert!(plan.entries.iter().all(|entry| entry.status == EntryStatus::Billed));
    }

    #[tokio::test]
    async fn test_second_run_only_repaints() {
        let sheet = MemorySheet::new(
            SHEET,
            vec![
                HEADER.to_vec(),
                vec!["6/2/25", "3", "Enhancement", "New work", "BK", "NES01-0006", "WIP"],
                vec!["6/3/25", "5", "Enhancement", "More work", "BK", "NES01-0006", "WIP"],
            ],
        );

        let mut first = plan_for(&sheet, "NES01-0006", &[]).await;
        let first_report = apply(&sheet, SHEET, &mut first).await;
        assert_eq!(first_report.transitioned, 2);

        let mut second = plan_for(&sheet, "NES01-0006", &[]).await;
        assert_eq!(second.pending().count(), 0);
        let second_batch = second.to_batch();
        assert!(second_batch.values.is_empty());
        assert_eq!(second_batch.highlights, first.to_batch().highlights);

        let second_report = apply(&sheet, SHEET, &mut second).await;
        assert_eq!(second_report.transitioned, 0);
        assert_eq!(second_report.highlighted, 2);
        assert_eq!(sheet.cell(2, 6), "Billed");
        assert_eq!(sheet.cell(3, 6), "Billed");
    }

    #[tokio::test]
    async fn test_seed_rows_get_invoice_id_stamped() {
        let sheet = MemorySheet::new(
            SHEET,
            vec![
                HEADER.to_vec(),
                vec!["6/2/25", "3", "Enhancement", "Untagged", "BK", "", "WIP"],
                vec!["6/3/25", "5", "Enhancement", "Tagged", "BK", "NES01-0010", "WIP"],
                vec!["6/4/25", "1", "Enhancement", "Untagged, not invoiced", "BK", "", "WIP"],
            ],
        );

        let mut plan = plan_for(&sheet, "NES01-0010", &[2, 3]).await;
        let report = apply(&sheet, SHEET, &mut plan).await;

        assert_eq!(report.transitioned, 2);
        assert_eq!(sheet.cell(2, 5), "NES01-0010");
        assert_eq!(sheet.cell(2, 6), "Billed");
        assert_eq!(sheet.cell(4, 5), "");
        assert_eq!(sheet.cell(4, 6), "WIP");
    }

    #[tokio::test]
    async fn test_rows_added_after_invoicing_are_caught() {
        let sheet = MemorySheet::new(
            SHEET,
            vec![
                HEADER.to_vec(),
                vec!["6/2/25", "3", "Enhancement", "Invoiced", "BK", "NES01-0011", "WIP"],
            ],
        );
        let rows = sheet.read_rows(SHEET).await.unwrap();
        let columns = ColumnMap::from_headers(&header()).unwrap();
        let invoiced = extract_entries(&rows, &columns, &Selection::Status(EntryStatus::Wip));
        assert_eq!(invoiced.entries.len(), 1);

        sheet.push_row(vec!["6/3/25", "2", "Enhancement", "Late entry", "DH", "NES01-0011", "WIP"]);

        let mut plan = plan_for(&sheet, "NES01-0011", &[2]).await;
        let report = apply(&sheet, SHEET, &mut plan).await;
        assert_eq!(report.transitioned, 2);
        assert_eq!(sheet.cell(3, 6), "Billed");
    }

    #[tokio::test]
    async fn test_paid_mode() {
        let sheet = MemorySheet::new(
            SHEET,
            vec![
                HEADER.to_vec(),
                vec!["6/2/25", "3", "Enhancement", "Work", "BK", "NES01-0012", "WIP"],
            ],
        );
        let rows = sheet.read_rows(SHEET).await.unwrap();
        let columns = ColumnMap::from_headers(&rows[0]).unwrap();
        let mut plan = ReconcilePlan::compute(
            &rows,
            &columns,
            "NES01-0012",
            &[],
            TerminalStatus::Paid,
            &HighlightConfig::default(),
        );

        apply(&sheet, SHEET, &mut plan).await;
        assert_eq!(sheet.cell(2, 6), "Paid");
    }

    #[tokio::test]
    async fn test_failed_write_back_is_a_warning_and_can_be_retried() {
        let sheet = MemorySheet::new(
            SHEET,
            vec![
                HEADER.to_vec(),
                vec!["6/2/25", "3", "Enhancement", "Work", "BK", "NES01-0013", "WIP"],
            ],
        );
        sheet.fail_next_update();

        let mut plan = plan_for(&sheet, "NES01-0013", &[]).await;
        let report = apply(&sheet, SHEET, &mut plan).await;

        assert!(report.warning.is_some());
        assert_eq!(report.transitioned, 0);
        assert_eq!(sheet.cell(2, 6), "WIP");
        assert_eq!(plan.entries[0].status, EntryStatus::Wip);

        let mut retry = plan_for(&sheet, "NES01-0013", &[]).await;
        let report = apply(&sheet, SHEET, &mut retry).await;
        assert!(report.warning.is_none());
        assert_eq!(sheet.cell(2, 6), "Billed");
    }

    #[tokio::test]
    async fn test_invoice_id_is_matched_without_surrounding_whitespace() {
        let sheet = MemorySheet::new(
            SHEET,
            vec![
                HEADER.to_vec(),
                vec!["6/2/25", "3", "Enhancement", "New work", "BK", "NES01-0006", "WIP"],
                vec!["6/3/25", "1", "Enhancement", "Seeded work", "BK", "", "WIP"],
            ],
        );

        let mut plan = plan_for(&sheet, "  NES01-0006\n", &[3]).await;
        assert_eq!(plan.invoice_id, "NES01-0006");
        assert_eq!(plan.pending().count(), 2);

        apply(&sheet, SHEET, &mut plan).await;
        assert_eq!(sheet.cell(2, 6), "Billed");
        assert_eq!(sheet.cell(3, 5), "NES01-0006");
    }

    #[tokio::test]
    async fn test_no_matching_rows_sends_nothing() {
        let sheet = MemorySheet::new(SHEET, vec![HEADER.to_vec()]);

        let mut plan = plan_for(&sheet, "NES01-0099", &[]).await;
        assert!(plan.is_empty());

        let report = apply(&sheet, SHEET, &mut plan).await;
        assert_eq!(report, ReconcileReport::default());
        assert_eq!(sheet.batches(), 0);
    }
}
