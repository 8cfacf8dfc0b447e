use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use tracing::{debug, instrument};

use crate::error::{Result, ToolError};
use crate::io::{LedgerCodec, into_ledger, replace_atomically};
use crate::model::Ledger;

/// Ledger stored as delimited text (CSV or TSV).
///
/// Cells are kept as raw strings and written back with minimal quoting, so a
/// ledger that is loaded and stored without changes keeps its bytes.
#[derive(Debug, Clone)]
pub struct DelimitedLedger {
    path: PathBuf,
    delimiter: u8,
}

impl DelimitedLedger {
    pub fn csv(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: b',',
        }
    }

    pub fn tsv(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: b'\t',
        }
    }
}

impl LedgerCodec for DelimitedLedger {
    #[instrument(level = "debug", skip_all, fields(path = %self.path.display()))]
    fn load(&self) -> Result<Ledger> {
        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)?;

        let mut rows: Vec<Vec<String>> = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record?;
            let cells: Vec<String> = record.iter().map(str::to_string).collect();
            if let Some(header) = rows.first() {
                if cells.len() != header.len() {
                    return Err(ToolError::InvalidLedger(format!(
                        "record {} has {} fields but the header has {}",
                        index + 1,
                        cells.len(),
                        header.len()
                    )));
                }
            }
            rows.push(cells);
        }

        let ledger = into_ledger(rows, &self.path)?;
        debug!(row_count = ledger.rows.len(), "loaded delimited ledger");
        Ok(ledger)
    }

    #[instrument(level = "debug", skip_all, fields(path = %self.path.display()))]
    fn store(&self, ledger: &Ledger) -> Result<()> {
        replace_atomically(&self.path, |staging| {
            let mut writer = WriterBuilder::new()
                .delimiter(self.delimiter)
                .from_path(staging)?;
            writer.write_record(&ledger.headers)?;
            for row in &ledger.rows {
                writer.write_record(row)?;
            }
            writer.flush()?;
            Ok(())
        })
    }

    fn location(&self) -> &Path {
        &self.path
    }
}
