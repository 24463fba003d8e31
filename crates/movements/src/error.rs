//! Movement engine error types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stock_store::{BalanceKey, StoreError};
use thiserror::Error;

use crate::catalog::CatalogError;

/// Kind of entity a lookup failed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Material,
    Location,
    Movement,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Material => write!(f, "material"),
            EntityKind::Location => write!(f, "location"),
            EntityKind::Movement => write!(f, "movement"),
        }
    }
}

/// Errors that can occur when recording or reading movements.
#[derive(Debug, Error)]
pub enum MovementError {
    /// The request is malformed or violates a kind rule.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: EntityKind, id: String },

    /// A referenced entity exists but is deactivated.
    #[error("{entity} is inactive: {id}")]
    InactiveEntity { entity: EntityKind, id: String },

    /// The origin balance cannot cover the requested quantity.
    #[error("Insufficient stock for {key}: available {available}, requested {requested}")]
    InsufficientStock {
        key: BalanceKey,
        available: Decimal,
        requested: Decimal,
    },

    /// The movement kept losing lock or serialization races.
    #[error("Concurrency conflict after {attempts} attempt(s): {reason}")]
    ConcurrencyConflict { attempts: u32, reason: String },

    /// The stock store failed.
    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[source] StoreError),

    /// The catalog could not be consulted.
    #[error("Catalog failure: {0}")]
    Catalog(#[from] CatalogError),
}

impl MovementError {
    /// Stable code for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MovementError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            MovementError::NotFound { .. } => ErrorKind::NotFound,
            MovementError::InactiveEntity { .. } => ErrorKind::InactiveEntity,
            MovementError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            MovementError::ConcurrencyConflict { .. } => ErrorKind::ConcurrencyConflict,
            MovementError::PersistenceFailure(_) | MovementError::Catalog(_) => {
                ErrorKind::PersistenceFailure
            }
        }
    }

    /// Returns true if the whole movement may be attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MovementError::ConcurrencyConflict { .. })
    }

    /// Converts the error into its serializable form.
    pub fn to_structured(&self) -> StructuredError {
        StructuredError {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

impl From<StoreError> for MovementError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InsufficientBalance {
                key,
                on_hand,
                reserved,
                delta,
            } => MovementError::InsufficientStock {
                key,
                available: on_hand - reserved,
                requested: -delta,
            },
            StoreError::QuantityOverflow { key, on_hand, delta } => MovementError::InvalidRequest(
                format!("moving {delta} would overflow the balance of {key} (on hand {on_hand})"),
            ),
            err if err.is_retryable() => MovementError::ConcurrencyConflict {
                attempts: 1,
                reason: err.to_string(),
            },
            err => MovementError::PersistenceFailure(err),
        }
    }
}

/// Stable error codes exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidRequest,
    NotFound,
    InactiveEntity,
    InsufficientStock,
    ConcurrencyConflict,
    PersistenceFailure,
}

impl ErrorKind {
    /// Returns the code as a static string, also used as a metrics label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "INVALID_REQUEST",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::InactiveEntity => "INACTIVE_ENTITY",
            ErrorKind::InsufficientStock => "INSUFFICIENT_STOCK",
            ErrorKind::ConcurrencyConflict => "CONCURRENCY_CONFLICT",
            ErrorKind::PersistenceFailure => "PERSISTENCE_FAILURE",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializable rejection returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&MovementError> for StructuredError {
    fn from(err: &MovementError) -> Self {
        err.to_structured()
    }
}

/// Result type for movement operations.
pub type Result<T> = std::result::Result<T, MovementError>;
