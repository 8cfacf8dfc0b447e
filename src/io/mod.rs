//! Ledger persistence.
//!
//! A [`LedgerCodec`] loads and stores the whole ledger at a fixed location.
//! Stores never write in place: the table is written to a sibling temporary
//! file which is then renamed over the ledger, so a crash mid-write leaves the
//! previous contents intact.

pub mod delimited;
pub mod excel_read;
pub mod excel_write;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, ToolError};
use crate::model::Ledger;

pub use delimited::DelimitedLedger;

/// Reads and writes a ledger at one location.
pub trait LedgerCodec {
    /// Loads the header and every row.
    fn load(&self) -> Result<Ledger>;

    /// Replaces the stored ledger with `ledger`.
    fn store(&self, ledger: &Ledger) -> Result<()>;

    /// Path the codec reads from and writes to.
    fn location(&self) -> &Path;
}

impl<T: LedgerCodec + ?Sized> LedgerCodec for &T {
    fn load(&self) -> Result<Ledger> {
        (**self).load()
    }

    fn store(&self, ledger: &Ledger) -> Result<()> {
        (**self).store(ledger)
    }

    fn location(&self) -> &Path {
        (**self).location()
    }
}

impl<T: LedgerCodec + ?Sized> LedgerCodec for Box<T> {
    fn load(&self) -> Result<Ledger> {
        (**self).load()
    }

    fn store(&self, ledger: &Ledger) -> Result<()> {
        (**self).store(ledger)
    }

    fn location(&self) -> &Path {
        (**self).location()
    }
}

/// On-disk table formats understood by the tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerFormat {
    Csv,
    Tsv,
    Xlsx,
}

/// Infers the ledger format from the file extension.
pub fn detect_format(path: &Path) -> Option<LedgerFormat> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "csv" => Some(LedgerFormat::Csv),
        "tsv" | "tab" => Some(LedgerFormat::Tsv),
        "xlsx" => Some(LedgerFormat::Xlsx),
        _ => None,
    }
}

/// Builds the codec matching the ledger's extension.
pub fn open_codec(path: &Path) -> Result<Box<dyn LedgerCodec>> {
    let format = detect_format(path)
        .ok_or_else(|| ToolError::UnsupportedLedgerFormat(path.to_path_buf()))?;
    debug!(path = %path.display(), ?format, "selected ledger codec");
    Ok(match format {
        LedgerFormat::Csv => Box::new(DelimitedLedger::csv(path)),
        LedgerFormat::Tsv => Box::new(DelimitedLedger::tsv(path)),
        LedgerFormat::Xlsx => Box::new(XlsxLedger::new(path)),
    })
}

/// Ledger kept in the first worksheet of an Excel workbook.
#[derive(Debug, Clone)]
pub struct XlsxLedger {
    path: PathBuf,
}

impl XlsxLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LedgerCodec for XlsxLedger {
    fn load(&self) -> Result<Ledger> {
        excel_read::read_ledger(&self.path)
    }

    fn store(&self, ledger: &Ledger) -> Result<()> {
        replace_atomically(&self.path, |staging| {
            excel_write::write_ledger(staging, ledger)
        })
    }

    fn location(&self) -> &Path {
        &self.path
    }
}

/// Writes through `write` into a sibling staging file and renames it over
/// `target`. The staging file is removed if writing fails.
pub fn replace_atomically(
    target: &Path,
    write: impl FnOnce(&Path) -> Result<()>,
) -> Result<()> {
    let staging = staging_path(target);
    if let Err(error) = write(&staging) {
        let _ = fs::remove_file(&staging);
        return Err(error);
    }
    fs::rename(&staging, target)?;
    Ok(())
}

fn staging_path(target: &Path) -> PathBuf {
    let file_name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ledger".to_string());
    target.with_file_name(format!(".{file_name}.tmp"))
}

/// Splits a raw table into header and body, rejecting tables without a header.
pub(crate) fn into_ledger(mut rows: Vec<Vec<String>>, path: &Path) -> Result<Ledger> {
    if rows.is_empty() {
        return Err(ToolError::InvalidLedger(format!(
            "{} has no header row",
            path.display()
        )));
    }
    let headers = rows.remove(0);
    Ok(Ledger::new(headers, rows))
}
