//! In-memory worksheet used by the tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::config::Rgb;

use super::{Result, RowSource, SheetError, UpdateBatch};

#[derive(Default)]
struct State {
    rows: Vec<Vec<String>>,
    highlights: BTreeMap<usize, (usize, Rgb)>,
    batches: usize,
    fail_next: bool,
}

pub struct MemorySheet {
    worksheet: String,
    state: Mutex<State>,
}

impl MemorySheet {
    pub fn new(worksheet: &str, rows: Vec<Vec<&str>>) -> Self {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(str::to_string).collect())
            .collect();
        Self {
            worksheet: worksheet.to_string(),
            state: Mutex::new(State {
                rows,
                ..State::default()
            }),
        }
    }

    /// Reject the next `apply_updates` call without touching any cell.
    pub fn fail_next_update(&self) {
        self.state.lock().unwrap().fail_next = true;
    }

    pub fn cell(&self, row: usize, column: usize) -> String {
        let state = self.state.lock().unwrap();
        state.rows[row - 1].get(column).cloned().unwrap_or_default()
    }

    pub fn highlight(&self, row: usize) -> Option<(usize, Rgb)> {
        self.state.lock().unwrap().highlights.get(&row).copied()
    }

    pub fn batches(&self) -> usize {
        self.state.lock().unwrap().batches
    }

    pub fn push_row(&self, row: Vec<&str>) {
        self.state
            .lock()
            .unwrap()
            .rows
            .push(row.into_iter().map(str::to_string).collect());
    }
}

impl RowSource for MemorySheet {
    async fn read_rows(&self, worksheet: &str) -> Result<Vec<Vec<String>>> {
        if worksheet != self.worksheet {
            return Err(SheetError::WorksheetNotFound(worksheet.to_string()));
        }
        Ok(self.state.lock().unwrap().rows.clone())
    }

    async fn apply_updates(&self, worksheet: &str, batch: &UpdateBatch) -> Result<()> {
        if worksheet != self.worksheet {
            return Err(SheetError::WorksheetNotFound(worksheet.to_string()));
        }

        let mut state = self.state.lock().unwrap();
        if state.fail_next {
            state.fail_next = false;
            return Err(SheetError::Api {
                status: 503,
                message: "backend unavailable".to_string(),
            });
        }

        for write in &batch.values {
            let row = &mut state.rows[write.row - 1];
            if row.len() <= write.column {
                row.resize(write.column + 1, String::new());
            }
            row[write.column] = write.value.clone();
        }
        for highlight in &batch.highlights {
            state
                .highlights
                .insert(highlight.row, (highlight.columns, highlight.color));
        }
        state.batches += 1;
        Ok(())
    }
}
