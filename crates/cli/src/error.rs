//! CLI error types with process exit code mapping.

use std::path::PathBuf;

use movements::{CatalogError, MovementError};
use projections::ProjectionError;
use stock_store::StoreError;
use thiserror::Error;

/// Errors that abort a `stockctl` command.
///
/// Rejected movements are not errors here: `record` prints them as structured
/// JSON and exits with [`EXIT_REJECTED`](crate::EXIT_REJECTED).
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Catalog file is required: pass --catalog or set STOCKCTL_CATALOG")]
    CatalogMissing,

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read standard input: {0}")]
    Stdin(#[source] std::io::Error),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Database connection failed: {0}")]
    Connect(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Stock store error: {0}")]
    Store(#[from] StoreError),

    #[error("Movement error: {0}")]
    Movement(#[from] MovementError),

    #[error("Reconciliation failed: {0}")]
    Projection(#[from] ProjectionError),

    #[error("Failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    /// Exit code for the failure: `64` for usage problems, `1` otherwise.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::CatalogMissing | CliError::Read { .. } | CliError::Catalog(_) => 64,
            _ => 1,
        }
    }
}

/// Result type for CLI operations.
pub type Result<T> = std::result::Result<T, CliError>;
