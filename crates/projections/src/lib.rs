//! Ledger replay and reconciliation.
//!
//! This crate provides the read side of the movement ledger:
//! - [`Projection`] trait for folding ledger entries into read models
//! - [`ReadModel`] trait for query access to folded state
//! - [`ProjectionProcessor`] for feeding ledger entries from the store to projections
//! - [`LedgerBalancesView`], balances recomputed from the ledger alone
//! - [`Reconciler`], which compares that view with the materialized balances

pub mod error;
pub mod processor;
pub mod projection;
pub mod read_model;
pub mod reconcile;
pub mod views;

pub use error::{ProjectionError, Result};
pub use processor::ProjectionProcessor;
pub use projection::{Projection, ProjectionPosition};
pub use read_model::ReadModel;
pub use reconcile::{BalanceMismatch, ReconciliationReport, Reconciler};
pub use views::{LedgerBalance, LedgerBalancesView, SnapshotMismatch};
