use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{Client, Company, LineItemGroup, WorkEntry};

/// Billing statement built from a set of work entries.
///
/// Every amount in here is derived from `line_items` and the configured rates;
/// nothing is entered by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceDocument {
    pub invoice_id: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub terms: String,
    pub sales_rep: String,
    pub bill_to: Client,
    pub payable_to: Company,
    pub line_items: Vec<LineItemGroup>,
    pub category_totals: IndexMap<String, BigDecimal>,
    pub total_hours: BigDecimal,
    pub hourly_rate: BigDecimal,
    pub discount_per_hour: BigDecimal,
    pub subtotal: BigDecimal,
    pub tax: BigDecimal,
    pub balance_due: BigDecimal,
}

impl InvoiceDocument {
    pub fn entries(&self) -> impl Iterator<Item = &WorkEntry> {
        self.line_items.iter().flat_map(|group| group.entries.iter())
    }

    /// Rate before the per-hour discount, shown next to the discount.
    pub fn original_rate(&self) -> BigDecimal {
        &self.hourly_rate + &self.discount_per_hour
    }

    pub fn source_rows(&self) -> Vec<usize> {
        self.entries().map(|entry| entry.source_row).collect()
    }
}
