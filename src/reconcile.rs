//! Reconciliation of a query ledger against the remote registry.
//!
//! One pass loads the ledger, takes a single snapshot of the registry, walks
//! the rows in file order and merges the results of queries that finished
//! since the previous pass. Only the status and result-size cells of newly
//! completed rows are ever written; every other cell is carried through as is.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::io::LedgerCodec;
use crate::model::{
    COMPLETED, Classification, ColumnNames, Ledger, LedgerColumns, ReconcileReport,
    RegistrySnapshot, RowOutcome, RowStatus,
};
use crate::registry::QueryRegistry;

/// When the ledger is written back during a pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PersistMode {
    /// Store the ledger after every newly completed row. A failure mid-pass
    /// loses at most the row being merged.
    #[default]
    EachCompletion,
    /// Store the ledger once, after every row has been classified. A failure
    /// mid-pass loses every merge made during the pass.
    EndOfRun,
}

/// Knobs of a reconciliation pass. None of them change how rows are classified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    pub columns: ColumnNames,
    pub persist: PersistMode,
}

/// Drives reconciliation passes over one ledger.
///
/// The reconciler owns the capabilities it needs: a registry client and a
/// ledger codec. Both traits are implemented for references, so callers that
/// want to inspect them afterwards can lend them instead.
pub struct Reconciler<R, C> {
    registry: R,
    codec: C,
    options: ReconcileOptions,
}

impl<R: QueryRegistry, C: LedgerCodec> Reconciler<R, C> {
    pub fn new(registry: R, codec: C, options: ReconcileOptions) -> Self {
        Self {
            registry,
            codec,
            options,
        }
    }

    /// Runs a full pass: load, reconcile, store.
    ///
    /// A pass that merges nothing leaves the ledger file untouched.
    /// Fails before touching the registry when the ledger lacks one of the
    /// owned columns. Any registry or storage failure aborts the pass; rows
    /// merged before it remain merged only if they were already persisted
    /// (see [`PersistMode`]).
    #[instrument(
        level = "info",
        skip_all,
        fields(path = %self.codec.location().display(), persist = ?self.options.persist)
    )]
    pub fn run(&self) -> Result<ReconcileReport> {
        let mut ledger = self.codec.load()?;
        info!(row_count = ledger.rows.len(), "loaded ledger");

        let report = self.reconcile(&mut ledger)?;
        if report.summary.newly_completed > 0 && self.options.persist == PersistMode::EndOfRun {
            self.codec.store(&ledger)?;
        }

        let summary = &report.summary;
        info!(
            total = summary.total,
            already_completed = summary.already_completed,
            newly_completed = summary.newly_completed,
            expired = summary.expired,
            still_pending = summary.still_pending,
            "reconciliation pass finished"
        );
        Ok(report)
    }

    /// Classifies every row of `ledger` in place, merging newly completed
    /// results. With [`PersistMode::EachCompletion`] the ledger is stored after
    /// each merge; with [`PersistMode::EndOfRun`] storing is left to the caller.
    pub fn reconcile(&self, ledger: &mut Ledger) -> Result<ReconcileReport> {
        let columns = ledger.resolve_columns(&self.options.columns)?;

        let has_pending = (0..ledger.rows.len())
            .any(|row| RowStatus::parse(ledger.cell(row, columns.status)) == RowStatus::Pending);
        let snapshot = if has_pending {
            self.fetch_snapshot()?
        } else {
            debug!("no pending rows; registry not consulted");
            RegistrySnapshot::default()
        };

        let mut report = ReconcileReport::default();
        let mut seen: HashSet<String> = HashSet::new();

        for row in 0..ledger.rows.len() {
            let query_id = ledger.cell(row, columns.id).to_string();
            if !seen.insert(query_id.clone()) {
                debug!(row, %query_id, "duplicate identifier; classifying independently");
            }

            let outcome = self.classify_row(ledger, row, query_id, columns, &snapshot)?;
            report.push(outcome);
        }

        Ok(report)
    }

    fn fetch_snapshot(&self) -> Result<RegistrySnapshot> {
        let entries = self.registry.list_queries()?;
        let snapshot = RegistrySnapshot::from_entries(entries);
        if snapshot.is_empty() {
            warn!("registry reports no queries; every pending row will expire");
        } else {
            info!(query_count = snapshot.len(), "fetched registry snapshot");
        }
        Ok(snapshot)
    }

    fn classify_row(
        &self,
        ledger: &mut Ledger,
        row: usize,
        query_id: String,
        columns: LedgerColumns,
        snapshot: &RegistrySnapshot,
    ) -> Result<RowOutcome> {
        let mut outcome = RowOutcome {
            row,
            query_id,
            classification: Classification::AlreadyCompleted,
            remote_status: None,
            result_size: None,
        };

        if RowStatus::parse(ledger.cell(row, columns.status)) == RowStatus::Completed {
            debug!(row, query_id = %outcome.query_id, "already completed");
            return Ok(outcome);
        }

        let Some(entry) = snapshot.get(&outcome.query_id) else {
            warn!(
                row,
                query_id = %outcome.query_id,
                "query is no longer tracked by the registry; leaving row as expired"
            );
            outcome.classification = Classification::Expired;
            return Ok(outcome);
        };

        outcome.remote_status = Some(entry.status.to_string());
        if !entry.status.is_completed() {
            info!(
                row,
                query_id = %outcome.query_id,
                remote_status = %entry.status,
                "query still pending"
            );
            outcome.classification = Classification::StillPending;
            return Ok(outcome);
        }

        let items = self.registry.fetch_result(entry)?;
        let result_size = items.len();
        ledger.set_cell(row, columns.result_size, result_size.to_string());
        ledger.set_cell(row, columns.status, COMPLETED);
        info!(row, query_id = %outcome.query_id, result_size, "query completed; result merged");

        if self.options.persist == PersistMode::EachCompletion {
            self.codec.store(ledger)?;
        }

        outcome.classification = Classification::NewlyCompleted;
        outcome.result_size = Some(result_size);
        Ok(outcome)
    }
}
