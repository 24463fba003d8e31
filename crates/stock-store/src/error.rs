use rust_decimal::Decimal;
use thiserror::Error;

use crate::{BalanceKey, MovementId};

/// SQLSTATE codes PostgreSQL raises when a transaction lost a race rather
/// than hit a real failure: lock_not_available, serialization_failure and
/// deadlock_detected.
const RETRYABLE_SQLSTATES: [&str; 3] = ["55P03", "40001", "40P01"];

/// Errors that can occur when interacting with the stock store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A lock could not be acquired within the configured timeout.
    #[error("Timed out waiting for lock on {resource}")]
    LockTimeout { resource: String },

    /// The database aborted the transaction because of a concurrent writer
    /// (serialization failure or deadlock).
    #[error("Concurrency conflict: {0}")]
    Conflict(String),

    /// Applying a delta would leave the balance below zero or below its
    /// reserved quantity.
    #[error(
        "Insufficient balance for {key}: on hand {on_hand}, reserved {reserved}, delta {delta}"
    )]
    InsufficientBalance {
        key: BalanceKey,
        on_hand: Decimal,
        reserved: Decimal,
        delta: Decimal,
    },

    /// Applying a delta or folding the ledger would exceed the largest
    /// quantity a balance can hold.
    #[error("Quantity overflow for {key}: {on_hand} + {delta} exceeds the storable maximum")]
    QuantityOverflow {
        key: BalanceKey,
        on_hand: Decimal,
        delta: Decimal,
    },

    /// A movement with this identifier already exists in the ledger.
    #[error("Duplicate movement id: {0}")]
    DuplicateMovement(MovementId),

    /// The referenced movement does not exist in the ledger.
    #[error("Movement not found: {0}")]
    MovementNotFound(MovementId),

    /// The record handed to the ledger is structurally invalid.
    #[error("Invalid movement record: {0}")]
    InvalidRecord(String),

    /// Persisted data could not be decoded.
    #[error("Corrupt stored data: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true if the operation lost a race and is safe to retry from
    /// scratch.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::LockTimeout { .. } | StoreError::Conflict(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && let Some(code) = db_err.code()
            && RETRYABLE_SQLSTATES.contains(&code.as_ref())
        {
            return if code == "55P03" {
                StoreError::LockTimeout {
                    resource: db_err.message().to_string(),
                }
            } else {
                StoreError::Conflict(db_err.message().to_string())
            };
        }
        StoreError::Database(err)
    }
}

/// Result type for stock store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
