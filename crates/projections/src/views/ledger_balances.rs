//! Balances recomputed purely from the movement ledger.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use stock_store::{BalanceKey, MovementId, MovementRecord, StoreError};
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition};
use crate::read_model::ReadModel;

/// Folded state of one balance key.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerBalance {
    pub key: BalanceKey,
    pub on_hand: Decimal,
    pub movement_count: u64,
    pub last_movement_id: MovementId,
}

/// A ledger entry whose recorded post-movement balance does not match the
/// running fold of the ledger at that point.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMismatch {
    pub movement_id: MovementId,
    pub key: BalanceKey,
    pub recorded: Decimal,
    pub folded: Decimal,
}

#[derive(Default)]
struct LedgerBalancesState {
    balances: BTreeMap<BalanceKey, LedgerBalance>,
    snapshot_mismatches: Vec<SnapshotMismatch>,
    position: ProjectionPosition,
}

/// Read model holding, for every balance key, the sum of signed
/// contributions of all ledger entries.
///
/// While folding it also checks each entry's recorded `*_balance_after`
/// snapshot against the running total.
#[derive(Clone, Default)]
pub struct LedgerBalancesView {
    state: Arc<RwLock<LedgerBalancesState>>,
}

impl LedgerBalancesView {
    /// Creates a new empty view.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the folded balance for a key.
    pub async fn get(&self, key: &BalanceKey) -> Option<LedgerBalance> {
        self.state.read().await.balances.get(key).cloned()
    }

    /// Gets the folded on-hand for a key, zero if the ledger never touched it.
    pub async fn on_hand(&self, key: &BalanceKey) -> Decimal {
        self.get(key)
            .await
            .map(|b| b.on_hand)
            .unwrap_or(Decimal::ZERO)
    }

    /// Gets every folded balance in key order.
    pub async fn all(&self) -> Vec<LedgerBalance> {
        self.state.read().await.balances.values().cloned().collect()
    }

    /// Snapshots that disagreed with the fold, in ledger order.
    pub async fn snapshot_mismatches(&self) -> Vec<SnapshotMismatch> {
        self.state.read().await.snapshot_mismatches.clone()
    }
}

#[async_trait]
impl Projection for LedgerBalancesView {
    fn name(&self) -> &'static str {
        "LedgerBalancesView"
    }

    async fn handle(&self, record: &MovementRecord) -> Result<()> {
        let mut state = self.state.write().await;

        // Fold every leg before touching state so an overflow leaves the
        // view unchanged.
        let mut folded_legs = Vec::new();
        for key in record.touched_keys() {
            let current = state
                .balances
                .get(&key)
                .map(|b| b.on_hand)
                .unwrap_or(Decimal::ZERO);
            let contribution = record.contribution(&key);
            let folded = current.checked_add(contribution).ok_or_else(|| {
                StoreError::QuantityOverflow {
                    key: key.clone(),
                    on_hand: current,
                    delta: contribution,
                }
            })?;
            folded_legs.push((key, folded));
        }

        for (key, folded) in folded_legs {
            let balance = state
                .balances
                .entry(key.clone())
                .or_insert_with(|| LedgerBalance {
                    key: key.clone(),
                    on_hand: Decimal::ZERO,
                    movement_count: 0,
                    last_movement_id: record.movement_id.clone(),
                });
            balance.on_hand = folded;
            balance.movement_count += 1;
            balance.last_movement_id = record.movement_id.clone();

            if let Some(recorded) = record.balance_after(&key)
                && recorded != folded
            {
                state.snapshot_mismatches.push(SnapshotMismatch {
                    movement_id: record.movement_id.clone(),
                    key,
                    recorded,
                    folded,
                });
            }
        }

        state.position = state.position.advance();
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        *self.state.write().await = LedgerBalancesState::default();
        Ok(())
    }
}

impl ReadModel for LedgerBalancesView {
    fn name(&self) -> &'static str {
        "LedgerBalancesView"
    }

    fn count(&self) -> usize {
        // Use try_read to avoid blocking; returns 0 if lock is held
        self.state
            .try_read()
            .map(|s| s.balances.len())
            .unwrap_or(0)
    }
}
