//! Core projection trait and position tracking.

use async_trait::async_trait;
use stock_store::MovementRecord;

use crate::Result;

/// Tracks how many ledger entries a projection has processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionPosition {
    /// Number of ledger entries processed by this projection.
    pub movements_processed: u64,
}

impl ProjectionPosition {
    /// Creates a new position at zero.
    pub fn zero() -> Self {
        Self {
            movements_processed: 0,
        }
    }

    /// Advances the position by one ledger entry.
    pub fn advance(&self) -> Self {
        Self {
            movements_processed: self.movements_processed + 1,
        }
    }
}

impl std::fmt::Display for ProjectionPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "position({})", self.movements_processed)
    }
}

/// A projection that folds ledger entries into a read model.
///
/// Entries are delivered in ledger order, each exactly once per replay.
#[async_trait]
pub trait Projection: Send + Sync {
    /// Returns the name of this projection.
    fn name(&self) -> &'static str;

    /// Handles a single ledger entry, updating the projection's read model.
    async fn handle(&self, record: &MovementRecord) -> Result<()>;

    /// Returns the current position of this projection.
    async fn position(&self) -> ProjectionPosition;

    /// Resets the projection to its initial state.
    async fn reset(&self) -> Result<()>;
}
