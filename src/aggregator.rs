//! Groups work entries into an invoice and derives every total from them.

use std::fs;
use std::path::Path;

use bigdecimal::{BigDecimal, Zero};
use chrono::{Duration, NaiveDate};
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{InvoicerError, Result};
use crate::models::{InvoiceDocument, LineItemGroup, WorkEntry};

/// The invoice id most of `entries` already carry, if any carry one.
///
/// Ties go to the id seen first.
pub fn assigned_invoice_id(entries: &[WorkEntry]) -> Option<String> {
    let mut counts: IndexMap<&str, usize> = IndexMap::new();
    for entry in entries.iter().filter(|entry| !entry.invoice_id.is_empty()) {
        *counts.entry(entry.invoice_id.as_str()).or_default() += 1;
    }

    let mut best: Option<(&str, usize)> = None;
    for (id, count) in counts {
        if best.is_none_or(|(_, best_count)| count > best_count) {
            best = Some((id, count));
        }
    }
    best.map(|(id, _)| id.to_string())
}

fn invoice_number(id: &str, prefix: &str) -> Option<u32> {
    id.trim()
        .strip_prefix(prefix)?
        .strip_prefix('-')?
        .parse()
        .ok()
}

/// Next sequential id after every `known` id sharing `prefix` and after `floor`.
pub fn next_invoice_id<I, S>(prefix: &str, known: I, floor: Option<u32>) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let highest = known
        .into_iter()
        .filter_map(|id| invoice_number(id.as_ref(), prefix))
        .chain(floor)
        .max()
        .unwrap_or(0);
    let next = highest.checked_add(1).ok_or_else(|| {
        InvoicerError::Validation(format!(
            "invoice number {}-{} has no successor; fix the invoice column or last_number",
            prefix, highest
        ))
    })?;
    Ok(format!("{}-{:04}", prefix, next))
}

/// Invoice ids of the data dumps already written to `dir`.
pub fn ids_in_output_dir(dir: &Path) -> Vec<String> {
    let Ok(read_dir) = fs::read_dir(dir) else {
        return Vec::new();
    };

    read_dir
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .filter_map(|path| path.file_stem().map(|stem| stem.to_string_lossy().into_owned()))
        .collect()
}

/// Pick the id for a new invoice: the one the entries already carry, or the next free one.
pub fn resolve_invoice_id<'a>(
    entries: &[WorkEntry],
    prefix: &str,
    known: impl IntoIterator<Item = &'a str>,
    floor: Option<u32>,
) -> Result<String> {
    match assigned_invoice_id(entries) {
        Some(id) => Ok(id),
        None => next_invoice_id(prefix, known, floor),
    }
}

/// Keep the entries that belong to `invoice_id` or to no invoice yet.
pub fn entries_for_invoice(entries: Vec<WorkEntry>, invoice_id: &str) -> Vec<WorkEntry> {
    entries
        .into_iter()
        .filter(|entry| {
            let belongs = entry.invoice_id.is_empty() || entry.invoice_id == invoice_id;
            if !belongs {
                warn!(
                    row = entry.source_row,
                    invoice = %entry.invoice_id,
                    "entry is tagged for a different invoice, leaving it out"
                );
            }
            belongs
        })
        .collect()
}

/// Build the invoice document for `entries`.
///
/// `run_date` is used as the issue date only when no entry date parses.
pub fn build_invoice(
    entries: &[WorkEntry],
    invoice_id: &str,
    config: &Config,
    run_date: NaiveDate,
) -> Result<InvoiceDocument> {
    let settings = &config.invoice;

    let mut groups: IndexMap<String, Vec<WorkEntry>> = IndexMap::new();
    for entry in entries {
        groups.entry(entry.category.clone()).or_default().push(entry.clone());
    }

    let total_hours = entries
        .iter()
        .fold(BigDecimal::zero(), |total, entry| total + &entry.hours);
    if total_hours.is_zero() {
        return Err(InvoicerError::Validation(format!(
            "invoice {} has no billable hours",
            invoice_id
        )));
    }

    let mut category_totals = IndexMap::new();
    let mut line_items = Vec::with_capacity(groups.len());
    let mut balance_due = BigDecimal::zero();

    for (category, entries) in groups {
        let hours = entries
            .iter()
            .fold(BigDecimal::zero(), |total, entry| total + &entry.hours);
        let rate = settings.rate_for(&category).clone();
        let amount = &hours * &rate;

        balance_due += &amount;
        category_totals.insert(category.clone(), hours.clone());
        line_items.push(LineItemGroup {
            category,
            rate,
            hours,
            amount,
            entries,
        });
    }

    let issue_date = entries
        .iter()
        .filter_map(WorkEntry::parsed_date)
        .max()
        .unwrap_or(run_date);
    let due_date = issue_date + Duration::days(settings.due_days);

    debug!(
        invoice = invoice_id,
        categories = line_items.len(),
        total_hours = %total_hours,
        balance_due = %balance_due,
        "built invoice"
    );

    Ok(InvoiceDocument {
        invoice_id: invoice_id.to_string(),
        issue_date,
        due_date,
        terms: settings.terms.clone(),
        sales_rep: config.sales_rep.clone(),
        bill_to: config.client.clone(),
        payable_to: config.company.clone(),
        line_items,
        category_totals,
        total_hours,
        hourly_rate: settings.hourly_rate.clone(),
        discount_per_hour: settings.discount.clone(),
        subtotal: balance_due.clone(),
        tax: BigDecimal::zero(),
        balance_due,
    })
}
