mod company;
mod client;
mod work_entry;
mod invoice;
mod invoice_line_item;

pub use company::Company;
pub use client::Client;
pub use work_entry::{EntryStatus, TerminalStatus, WorkEntry, DEFAULT_CATEGORY};
pub use invoice::InvoiceDocument;
pub use invoice_line_item::LineItemGroup;
