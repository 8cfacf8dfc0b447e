//! Core library for the qledger command line application.
//!
//! qledger keeps a tabular ledger of long-running queries issued against a
//! remote service and reconciles it with the service's query registry. The
//! modules keep responsibilities narrow: ledger persistence lives under
//! [`io`], the registry client in [`registry`], the shared data types in
//! [`model`], and the reconciliation pass itself in [`reconcile`].

pub mod config;
pub mod error;
pub mod io;
pub mod model;
pub mod reconcile;
pub mod registry;
pub mod report;

pub use error::{Result, ToolError};
pub use reconcile::{PersistMode, ReconcileOptions, Reconciler};
