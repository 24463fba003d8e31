//! Operator CLI for the inventory movement ledger.
//!
//! Wires configuration, structured logging, the PostgreSQL stock store, a
//! JSON-file catalog and the movement engine behind the `stockctl` binary.

pub mod commands;
pub mod config;
pub mod error;
pub mod notifier;
pub mod telemetry;

pub use config::{Config, LogFormat};
pub use error::{CliError, Result};
pub use notifier::LogNotifier;

/// Exit code when `record` prints a structured rejection.
pub const EXIT_REJECTED: u8 = 2;

/// Exit code when `reconcile` finds the ledger and balances disagree.
pub const EXIT_INCONSISTENT: u8 = 3;
