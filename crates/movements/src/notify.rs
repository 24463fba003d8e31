//! Post-commit balance change notifications.

use std::sync::Arc;

use async_trait::async_trait;
use common::{LocationId, Lot, MaterialId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stock_store::{BalanceKey, MovementId};
use thiserror::Error;
use tokio::sync::{Mutex, broadcast};

/// Errors raised while delivering a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),

    #[error("Notification timed out")]
    Timeout,
}

/// A balance touched by a committed movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceChanged {
    pub material_id: MaterialId,
    pub location_id: LocationId,
    pub lot: Lot,
    pub on_hand: Decimal,
    pub movement_id: MovementId,
}

impl BalanceChanged {
    /// Balance key of the changed entry.
    pub fn key(&self) -> BalanceKey {
        BalanceKey::new(
            self.material_id.clone(),
            self.location_id.clone(),
            self.lot.clone(),
        )
    }
}

/// Receives balance changes after a movement commits.
///
/// Delivery is best effort. A failure is logged by the engine and never
/// undoes the movement.
#[async_trait]
pub trait BalanceNotifier: Send + Sync {
    async fn balance_changed(&self, change: &BalanceChanged) -> Result<(), NotifyError>;
}

/// Discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl BalanceNotifier for NoopNotifier {
    async fn balance_changed(&self, _change: &BalanceChanged) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Fans notifications out to every subscriber of a broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<BalanceChanged>,
}

impl BroadcastNotifier {
    /// Creates a notifier whose channel buffers up to `capacity` changes per
    /// lagging subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribes to future changes.
    pub fn subscribe(&self) -> broadcast::Receiver<BalanceChanged> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl BalanceNotifier for BroadcastNotifier {
    async fn balance_changed(&self, change: &BalanceChanged) -> Result<(), NotifyError> {
        // No subscribers is not a failure.
        if self.sender.send(change.clone()).is_err() {
            tracing::debug!(key = %change.key(), "balance change dropped, no subscribers");
        }
        Ok(())
    }
}

/// Captures notifications in memory. Can be told to fail every delivery.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    changes: Arc<Mutex<Vec<BalanceChanged>>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier that records nothing and rejects every delivery.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Every change delivered so far, in delivery order.
    pub async fn changes(&self) -> Vec<BalanceChanged> {
        self.changes.lock().await.clone()
    }
}

#[async_trait]
impl BalanceNotifier for RecordingNotifier {
    async fn balance_changed(&self, change: &BalanceChanged) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Delivery("recording notifier set to fail".to_string()));
        }
        self.changes.lock().await.push(change.clone());
        Ok(())
    }
}
