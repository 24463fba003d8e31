use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_core::Stream;
use rust_decimal::Decimal;

use crate::{
    AppliedDelta, BalanceEntry, BalanceKey, BalanceQuery, DeltaPolicy, MovementId, MovementKind,
    MovementQuery, MovementRecord, Result, SequenceScope, StoreError,
};

/// A stream of ledger entries in insertion order.
pub type MovementStream = Pin<Box<dyn Stream<Item = Result<MovementRecord>> + Send>>;

/// Core trait for stock store implementations.
///
/// A stock store owns the three persisted tables of the ledger: the
/// append-only movements, the materialized balances and the per-scope
/// sequence counters. Every write goes through a [`StockTransaction`]
/// obtained from [`StockStore::begin`]; the methods on this trait only read.
#[async_trait]
pub trait StockStore: Send + Sync {
    /// Opens a unit of work. Nothing written through the transaction is
    /// visible to other callers until [`StockTransaction::commit`] succeeds;
    /// dropping it without committing rolls everything back.
    async fn begin(&self) -> Result<Box<dyn StockTransaction>>;

    /// Reads the committed balance for a key.
    async fn get_balance(&self, key: &BalanceKey) -> Result<Option<BalanceEntry>>;

    /// Lists committed balances matching a query, ordered by key.
    async fn list_balances(&self, query: BalanceQuery) -> Result<Vec<BalanceEntry>>;

    /// Retrieves a single ledger entry.
    async fn get_movement(&self, movement_id: &MovementId) -> Result<Option<MovementRecord>>;

    /// Retrieves ledger entries matching a query, in insertion order.
    async fn query_movements(&self, query: MovementQuery) -> Result<Vec<MovementRecord>>;

    /// Streams the whole ledger in insertion order.
    async fn stream_movements(&self) -> Result<MovementStream>;

    /// Sums the signed contributions to `key` of every movement appended
    /// after `from` (exclusive), or of the entire ledger when `from` is
    /// `None`.
    async fn sum_since(&self, key: &BalanceKey, from: Option<&MovementId>) -> Result<Decimal>;
}

/// A single atomic unit of work against the stock store.
///
/// Balance reads taken through [`lock_balance`](Self::lock_balance) hold a
/// write-intent lock until the transaction ends, so a check followed by
/// [`apply_delta`](Self::apply_delta) cannot interleave with another writer.
#[async_trait]
pub trait StockTransaction: Send {
    /// Reads a balance with write intent, creating an empty entry when the
    /// key has never been moved. Waits at most the store's lock timeout.
    async fn lock_balance(&mut self, key: &BalanceKey) -> Result<BalanceEntry>;

    /// Applies a signed delta to a balance. This is the only balance mutator.
    async fn apply_delta(
        &mut self,
        key: &BalanceKey,
        delta: Decimal,
        policy: DeltaPolicy,
        at: DateTime<Utc>,
    ) -> Result<AppliedDelta>;

    /// Atomically increments and returns the counter for a sequence scope.
    async fn next_sequence(&mut self, scope: &SequenceScope) -> Result<u32>;

    /// Sums the contributions to `key` of the whole ledger as this
    /// transaction sees it, its own appended entries included. Taken after
    /// [`lock_balance`](Self::lock_balance), the total cannot race a writer
    /// of the same key.
    async fn ledger_total(&mut self, key: &BalanceKey) -> Result<Decimal>;

    /// Appends a ledger entry. Existing entries are never overwritten.
    async fn append_movement(&mut self, record: &MovementRecord) -> Result<()>;

    /// Makes every write of this transaction visible atomically.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discards every write of this transaction.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Extension trait providing convenience methods for stock stores.
#[async_trait]
pub trait StockStoreExt: StockStore {
    /// Reads a balance, treating a never-moved key as empty.
    async fn balance_or_empty(&self, key: &BalanceKey) -> Result<BalanceEntry> {
        Ok(self
            .get_balance(key)
            .await?
            .unwrap_or_else(|| BalanceEntry::empty(key.clone())))
    }

    /// Retrieves every ledger entry that touched a key, in insertion order.
    async fn movements_for_key(&self, key: &BalanceKey) -> Result<Vec<MovementRecord>> {
        let movements = self
            .query_movements(
                MovementQuery::new()
                    .material(key.material_id.clone())
                    .location(key.location_id.clone()),
            )
            .await?;
        Ok(movements.into_iter().filter(|m| m.touches(key)).collect())
    }
}

// Blanket implementation for all StockStore implementations
impl<T: StockStore + ?Sized> StockStoreExt for T {}

/// Validates a ledger entry before appending.
pub fn validate_record_for_append(record: &MovementRecord) -> Result<()> {
    if record.movement_id.as_str().trim().is_empty() {
        return Err(StoreError::InvalidRecord("movement id is empty".to_string()));
    }
    if record.origin_location_id.is_none() && record.destination_location_id.is_none() {
        return Err(StoreError::InvalidRecord(format!(
            "movement {} references no location",
            record.movement_id
        )));
    }
    if record.kind != MovementKind::Adjust && record.quantity <= Decimal::ZERO {
        return Err(StoreError::InvalidRecord(format!(
            "movement {} has non-positive quantity {}",
            record.movement_id, record.quantity
        )));
    }
    if record.kind != MovementKind::Adjust && record.applied_quantity != record.quantity {
        return Err(StoreError::InvalidRecord(format!(
            "only adjustments may apply a quantity other than requested ({})",
            record.movement_id
        )));
    }
    Ok(())
}

/// Folds the contributions of `records` to `key`, skipping everything up to
/// and including `from`.
pub(crate) fn sum_contributions<'a>(
    records: impl IntoIterator<Item = &'a MovementRecord>,
    key: &BalanceKey,
    from: Option<&MovementId>,
) -> Result<Decimal> {
    let mut records = records.into_iter();

    if let Some(from) = from {
        loop {
            match records.next() {
                Some(record) if &record.movement_id == from => break,
                Some(_) => continue,
                None => return Err(StoreError::MovementNotFound(from.clone())),
            }
        }
    }

    records.try_fold(Decimal::ZERO, |total, record| {
        add_contribution(total, record, key)
    })
}

/// Adds one record's contribution to `key` onto a running ledger total.
pub(crate) fn add_contribution(
    total: Decimal,
    record: &MovementRecord,
    key: &BalanceKey,
) -> Result<Decimal> {
    let delta = record.contribution(key);
    total
        .checked_add(delta)
        .ok_or_else(|| StoreError::QuantityOverflow {
            key: key.clone(),
            on_hand: total,
            delta,
        })
}
