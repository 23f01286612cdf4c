use serde::{Deserialize, Serialize};

/// The business issuing the invoice; printed in the "payable to" block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Company {
    pub name: String,
    pub address: String,
    pub zelle: Option<String>,
}
