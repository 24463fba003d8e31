//! Ledger/balance reconciliation.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::Serialize;
use stock_store::{BalanceKey, BalanceQuery, StockStore};

use crate::Result;
use crate::processor::ProjectionProcessor;
use crate::views::{LedgerBalancesView, SnapshotMismatch};

/// A balance key where the materialized on-hand differs from the ledger fold.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceMismatch {
    pub key: BalanceKey,
    pub ledger_on_hand: Decimal,
    /// `None` when the ledger references a key with no balance row.
    pub materialized_on_hand: Option<Decimal>,
}

impl BalanceMismatch {
    /// Materialized minus folded quantity.
    pub fn drift(&self) -> Decimal {
        self.materialized_on_hand.unwrap_or(Decimal::ZERO) - self.ledger_on_hand
    }
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub movements_replayed: u64,
    pub balances_checked: usize,
    pub mismatches: Vec<BalanceMismatch>,
    pub snapshot_mismatches: Vec<SnapshotMismatch>,
}

impl ReconciliationReport {
    /// True when every balance agrees with the ledger and every recorded
    /// snapshot agrees with the fold.
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty() && self.snapshot_mismatches.is_empty()
    }
}

/// Replays the whole ledger and compares the fold with the balance table.
pub struct Reconciler<S: StockStore + Clone> {
    store: S,
}

impl<S: StockStore + Clone> Reconciler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Runs a full reconciliation.
    ///
    /// Keys present only in the balance table are compared against a zero
    /// fold; keys present only in the ledger against a missing row. A key
    /// that disagrees is read again under its balance lock before it is
    /// reported.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<ReconciliationReport> {
        let view = LedgerBalancesView::new();
        let mut processor = ProjectionProcessor::new(self.store.clone());
        processor.register(Box::new(view.clone()));
        let movements_replayed = processor.rebuild_all().await?;

        let materialized: BTreeMap<BalanceKey, Decimal> = self
            .store
            .list_balances(BalanceQuery::all())
            .await?
            .into_iter()
            .map(|b| (b.key, b.on_hand))
            .collect();
        let folded: BTreeMap<BalanceKey, Decimal> = view
            .all()
            .await
            .into_iter()
            .map(|b| (b.key, b.on_hand))
            .collect();

        let keys: BTreeSet<&BalanceKey> = materialized.keys().chain(folded.keys()).collect();

        let mut mismatches = Vec::new();
        for &key in &keys {
            let ledger_on_hand = folded.get(key).copied().unwrap_or(Decimal::ZERO);
            let materialized_on_hand = materialized.get(key).copied();

            // A zero row never moved by the ledger is a lock placeholder.
            if materialized_on_hand.unwrap_or(Decimal::ZERO) == ledger_on_hand {
                continue;
            }

            let Some(mismatch) = self.recheck(key, materialized_on_hand.is_some()).await? else {
                tracing::debug!(key = %key, "disagreement resolved by a concurrent movement");
                continue;
            };
            tracing::warn!(
                key = %mismatch.key,
                ledger = %mismatch.ledger_on_hand,
                drift = %mismatch.drift(),
                "balance disagrees with ledger"
            );
            mismatches.push(mismatch);
        }

        let snapshot_mismatches = view.snapshot_mismatches().await;
        for snapshot in &snapshot_mismatches {
            tracing::warn!(
                movement_id = %snapshot.movement_id,
                key = %snapshot.key,
                recorded = %snapshot.recorded,
                folded = %snapshot.folded,
                "recorded balance snapshot disagrees with ledger fold"
            );
        }

        let found = (mismatches.len() + snapshot_mismatches.len()) as u64;
        if found > 0 {
            metrics::counter!("reconciliation_mismatches_total").increment(found);
        }

        let report = ReconciliationReport {
            movements_replayed,
            balances_checked: keys.len(),
            mismatches,
            snapshot_mismatches,
        };
        tracing::info!(
            movements = report.movements_replayed,
            balances = report.balances_checked,
            consistent = report.is_consistent(),
            "reconciliation complete"
        );
        Ok(report)
    }

    /// Compares one key again inside a transaction that holds its balance
    /// lock. The replay and the balance listing are separate reads, so a
    /// movement committed between them looks like drift until rechecked.
    async fn recheck(&self, key: &BalanceKey, had_row: bool) -> Result<Option<BalanceMismatch>> {
        let mut tx = self.store.begin().await?;
        let entry = tx.lock_balance(key).await?;
        let ledger_on_hand = tx.ledger_total(key).await?;
        tx.rollback().await?;

        if entry.on_hand == ledger_on_hand {
            return Ok(None);
        }

        let materialized_on_hand =
            (had_row || entry.last_movement_at.is_some()).then_some(entry.on_hand);
        Ok(Some(BalanceMismatch {
            key: key.clone(),
            ledger_on_hand,
            materialized_on_hand,
        }))
    }
}
