use thiserror::Error;

use crate::sheets::SheetError;

/// Fatal failures of an invoicing run. Each one ends the process with exit code 1.
#[derive(Debug, Error)]
pub enum InvoicerError {
    /// Missing or unreadable config document or credentials file.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Nothing qualified for invoicing.
    #[error("no data: {0}")]
    NoData(String),

    /// The selected entries cannot form an invoice.
    #[error("validation error: {0}")]
    Validation(String),

    /// The fixed-layout renderer failed. Callers log this and carry on without the PDF.
    #[error("render error: {0}")]
    Render(String),

    #[error(transparent)]
    Sheets(#[from] SheetError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, InvoicerError>;
