use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, ToolError>;

/// Error type covering the different failure cases that can occur when the
/// tool loads a ledger, talks to the query registry, or writes the ledger back.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up from the CSV reader or writer.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Errors bubbled up from the Excel reader implementation.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::XlsxError),

    /// Transport failures talking to the query registry.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Raised when the configuration file cannot be parsed.
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Raised when the ledger header lacks one of the columns the reconciler owns.
    #[error("ledger is missing required column '{column}'")]
    MissingColumn { column: String },

    /// Raised when a ledger does not follow the expected table conventions.
    #[error("invalid ledger: {0}")]
    InvalidLedger(String),

    /// Raised when the ledger extension does not map to a known codec.
    #[error("unsupported ledger format: {0}")]
    UnsupportedLedgerFormat(PathBuf),

    /// Raised when the registry answers with a non-success status.
    #[error("registry returned {status}: {message}")]
    Registry { status: u16, message: String },

    /// Raised when configuration values are inconsistent or incomplete.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}
