//! Balance change notifications for a one-shot process.

use async_trait::async_trait;
use movements::{BalanceChanged, BalanceNotifier, NotifyError};

/// Emits each balance change as a structured log event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl BalanceNotifier for LogNotifier {
    async fn balance_changed(&self, change: &BalanceChanged) -> Result<(), NotifyError> {
        tracing::info!(
            material_id = %change.material_id,
            location_id = %change.location_id,
            lot = %change.lot,
            on_hand = %change.on_hand,
            movement_id = %change.movement_id,
            "balance changed"
        );
        Ok(())
    }
}
