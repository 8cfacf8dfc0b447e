use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ToolError};

/// Identifier assigned to a remote query. Kept as the raw string found in the
/// ledger so it can be written back untouched.
pub type QueryId = String;

/// Status value written into the ledger once a query has been merged.
pub const COMPLETED: &str = "completed";

/// A persisted table of issued queries. The header names the columns; every
/// row carries one cell per header entry.
///
/// `rows` is the string view the reconciler works on. Ledgers read from a
/// workbook also carry a [`SheetLayout`] so the codec can write untouched
/// cells back with their original type and position.
#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub layout: Option<SheetLayout>,
}

/// Worksheet details of a ledger loaded from a workbook.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetLayout {
    pub sheet_name: String,
    /// Zero-based (row, column) of the header's first cell in the sheet.
    pub origin: (u32, u32),
    /// Non-text cells keyed by (row, column) in `rows`, with the string view
    /// they were loaded as.
    pub typed: HashMap<(usize, usize), TypedCell>,
}

/// A non-text workbook cell together with its string rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedCell {
    pub value: CellValue,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellValue {
    Number(f64),
    Bool(bool),
    /// Excel serial date-time.
    DateTime(f64),
}

impl SheetLayout {
    /// Typed value to write at `(row, column)`, if the cell still holds the
    /// text it was loaded as.
    pub fn typed_value(&self, row: usize, column: usize, current: &str) -> Option<CellValue> {
        self.typed
            .get(&(row, column))
            .filter(|cell| cell.text == current)
            .map(|cell| cell.value)
    }
}

impl Ledger {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            headers,
            rows,
            layout: None,
        }
    }

    /// Locates the first column whose header equals `name` exactly.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    /// Resolves the reconciler-owned columns, failing on the first missing one.
    pub fn resolve_columns(&self, names: &ColumnNames) -> Result<LedgerColumns> {
        let find = |name: &str| {
            self.column_index(name).ok_or_else(|| ToolError::MissingColumn {
                column: name.to_string(),
            })
        };

        Ok(LedgerColumns {
            id: find(names.id.as_str())?,
            status: find(names.status.as_str())?,
            result_size: find(names.result_size.as_str())?,
        })
    }

    /// Returns the cell at `(row, column)`, treating absent cells as blank.
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Overwrites a single cell, widening the row if it is short.
    pub fn set_cell(&mut self, row: usize, column: usize, value: impl Into<String>) {
        if let Some(cells) = self.rows.get_mut(row) {
            if cells.len() <= column {
                cells.resize(column + 1, String::new());
            }
            cells[column] = value.into();
        }
    }
}

/// Header names of the columns the reconciler reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnNames {
    pub id: String,
    pub status: String,
    pub result_size: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            id: "query_id".to_string(),
            status: "status".to_string(),
            result_size: "result_size".to_string(),
        }
    }
}

/// Positions of the reconciler-owned columns within a ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerColumns {
    pub id: usize,
    pub status: usize,
    pub result_size: usize,
}

/// Status of a ledger row as seen by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    Pending,
    Completed,
}

impl RowStatus {
    /// Anything other than `completed` is still outstanding, blanks included.
    pub fn parse(cell: &str) -> Self {
        if cell.trim().eq_ignore_ascii_case(COMPLETED) {
            RowStatus::Completed
        } else {
            RowStatus::Pending
        }
    }
}

/// Remote-side status of a query. Only completion matters to reconciliation;
/// every other state is preserved verbatim for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RemoteStatus {
    Completed,
    Other(String),
}

impl RemoteStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, RemoteStatus::Completed)
    }
}

impl From<String> for RemoteStatus {
    fn from(value: String) -> Self {
        if value.trim().eq_ignore_ascii_case(COMPLETED) {
            RemoteStatus::Completed
        } else {
            RemoteStatus::Other(value)
        }
    }
}

impl From<RemoteStatus> for String {
    fn from(value: RemoteStatus) -> Self {
        value.to_string()
    }
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteStatus::Completed => write!(f, "{COMPLETED}"),
            RemoteStatus::Other(value) => write!(f, "{value}"),
        }
    }
}

/// One query known to the remote registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub id: QueryId,
    pub status: RemoteStatus,
}

impl RegistryEntry {
    pub fn new(id: impl Into<QueryId>, status: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: RemoteStatus::from(status.into()),
        }
    }
}

/// Point-in-time index of the registry, keyed by query identifier.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    entries: HashMap<QueryId, RegistryEntry>,
}

impl RegistrySnapshot {
    /// Indexes the listing. When the registry reports an identifier twice the
    /// last entry wins.
    pub fn from_entries(entries: impl IntoIterator<Item = RegistryEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|entry| (entry.id.clone(), entry))
            .collect();
        Self { entries }
    }

    pub fn get(&self, id: &str) -> Option<&RegistryEntry> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// How a single ledger row was handled during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    AlreadyCompleted,
    NewlyCompleted,
    Expired,
    StillPending,
}

/// Per-row record of a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowOutcome {
    /// Zero-based index of the row, header excluded.
    pub row: usize,
    pub query_id: QueryId,
    pub classification: Classification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_size: Option<usize>,
}

/// Counters produced by one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub total: usize,
    pub already_completed: usize,
    pub newly_completed: usize,
    pub expired: usize,
    pub still_pending: usize,
}

impl ReconcileSummary {
    pub fn record(&mut self, classification: Classification) {
        self.total += 1;
        match classification {
            Classification::AlreadyCompleted => self.already_completed += 1,
            Classification::NewlyCompleted => self.newly_completed += 1,
            Classification::Expired => self.expired += 1,
            Classification::StillPending => self.still_pending += 1,
        }
    }
}

/// Result of a full pass: the counters plus one outcome per ledger row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub summary: ReconcileSummary,
    pub outcomes: Vec<RowOutcome>,
}

impl ReconcileReport {
    pub fn push(&mut self, outcome: RowOutcome) {
        self.summary.record(outcome.classification);
        self.outcomes.push(outcome);
    }

    /// True when the counters agree with the recorded outcomes: one outcome per
    /// counted row, each bucket matching the outcomes of its classification.
    pub fn is_consistent(&self) -> bool {
        let count = |wanted: Classification| {
            self.outcomes
                .iter()
                .filter(|outcome| outcome.classification == wanted)
                .count()
        };
        let summary = &self.summary;

        summary.total == self.outcomes.len()
            && summary.already_completed == count(Classification::AlreadyCompleted)
            && summary.newly_completed == count(Classification::NewlyCompleted)
            && summary.expired == count(Classification::Expired)
            && summary.still_pending == count(Classification::StillPending)
    }
}
