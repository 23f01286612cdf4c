use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use super::WorkEntry;

/// All entries of one category on an invoice, with the category's billed amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItemGroup {
    pub category: String,
    pub rate: BigDecimal,
    pub hours: BigDecimal,
    pub amount: BigDecimal,
    pub entries: Vec<WorkEntry>,
}
