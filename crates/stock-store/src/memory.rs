use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    AppliedDelta, BalanceEntry, BalanceKey, BalanceQuery, DeltaPolicy, MovementId, MovementQuery,
    MovementRecord, Result, SequenceScope, StoreError,
    store::{
        MovementStream, StockStore, StockTransaction, sum_contributions,
        validate_record_for_append,
    },
};

/// Default bound on how long a transaction waits for the store lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Default)]
struct StoreState {
    movements: Vec<MovementRecord>,
    movement_index: HashMap<MovementId, usize>,
    balances: BTreeMap<BalanceKey, BalanceEntry>,
    counters: HashMap<SequenceScope, u32>,
}

/// In-memory stock store implementation for testing.
///
/// A transaction holds the whole store lock from `begin` until it commits or
/// is dropped, which gives serializable semantics. Writes are staged inside
/// the transaction and merged on commit, so an abandoned transaction leaves
/// no trace.
#[derive(Clone)]
pub struct InMemoryStockStore {
    state: Arc<Mutex<StoreState>>,
    lock_timeout: Duration,
}

impl InMemoryStockStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how long `begin` waits for the store lock before failing with
    /// [`StoreError::LockTimeout`].
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Returns the total number of ledger entries.
    pub async fn movement_count(&self) -> usize {
        self.state.lock().await.movements.len()
    }

    /// Seeds a balance directly, bypassing the ledger. Test fixtures use this
    /// to set up reserved quantities.
    pub async fn seed_balance(&self, entry: BalanceEntry) {
        self.state
            .lock()
            .await
            .balances
            .insert(entry.key.clone(), entry);
    }

    /// Clears all movements, balances and counters.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        *state = StoreState::default();
    }
}

impl Default for InMemoryStockStore {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    async fn begin(&self) -> Result<Box<dyn StockTransaction>> {
        let guard = tokio::time::timeout(self.lock_timeout, self.state.clone().lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout {
                resource: "in-memory stock store".to_string(),
            })?;

        tracing::debug!("in-memory transaction started");

        Ok(Box::new(InMemoryTransaction {
            guard,
            balances: BTreeMap::new(),
            counters: HashMap::new(),
            movements: Vec::new(),
        }))
    }

    async fn get_balance(&self, key: &BalanceKey) -> Result<Option<BalanceEntry>> {
        Ok(self.state.lock().await.balances.get(key).cloned())
    }

    async fn list_balances(&self, query: BalanceQuery) -> Result<Vec<BalanceEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .balances
            .values()
            .filter(|entry| query.matches(entry))
            .cloned()
            .collect())
    }

    async fn get_movement(&self, movement_id: &MovementId) -> Result<Option<MovementRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .movement_index
            .get(movement_id)
            .map(|&index| state.movements[index].clone()))
    }

    async fn query_movements(&self, query: MovementQuery) -> Result<Vec<MovementRecord>> {
        let state = self.state.lock().await;
        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);

        Ok(state
            .movements
            .iter()
            .filter(|record| query.matches(record))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn stream_movements(&self) -> Result<MovementStream> {
        use futures_util::stream;

        let movements = self.state.lock().await.movements.clone();
        let stream = stream::iter(movements.into_iter().map(Ok));
        Ok(Box::pin(stream))
    }

    async fn sum_since(&self, key: &BalanceKey, from: Option<&MovementId>) -> Result<Decimal> {
        let state = self.state.lock().await;
        sum_contributions(&state.movements, key, from)
    }
}

/// Unit of work over the in-memory store. Holds the store lock for its
/// whole lifetime.
struct InMemoryTransaction {
    guard: OwnedMutexGuard<StoreState>,
    balances: BTreeMap<BalanceKey, BalanceEntry>,
    counters: HashMap<SequenceScope, u32>,
    movements: Vec<MovementRecord>,
}

impl InMemoryTransaction {
    fn current(&self, key: &BalanceKey) -> BalanceEntry {
        self.balances
            .get(key)
            .or_else(|| self.guard.balances.get(key))
            .cloned()
            .unwrap_or_else(|| BalanceEntry::empty(key.clone()))
    }
}

#[async_trait]
impl StockTransaction for InMemoryTransaction {
    async fn lock_balance(&mut self, key: &BalanceKey) -> Result<BalanceEntry> {
        Ok(self.current(key))
    }

    async fn apply_delta(
        &mut self,
        key: &BalanceKey,
        delta: Decimal,
        policy: DeltaPolicy,
        at: DateTime<Utc>,
    ) -> Result<AppliedDelta> {
        let applied = self.current(key).apply(delta, policy, at)?;
        self.balances.insert(key.clone(), applied.entry.clone());
        Ok(applied)
    }

    async fn next_sequence(&mut self, scope: &SequenceScope) -> Result<u32> {
        let last = self
            .counters
            .get(scope)
            .or_else(|| self.guard.counters.get(scope))
            .copied()
            .unwrap_or(0);
        let next = last + 1;
        self.counters.insert(scope.clone(), next);
        Ok(next)
    }

    async fn ledger_total(&mut self, key: &BalanceKey) -> Result<Decimal> {
        sum_contributions(self.guard.movements.iter().chain(&self.movements), key, None)
    }

    async fn append_movement(&mut self, record: &MovementRecord) -> Result<()> {
        validate_record_for_append(record)?;

        let duplicate = self.guard.movement_index.contains_key(&record.movement_id)
            || self
                .movements
                .iter()
                .any(|staged| staged.movement_id == record.movement_id);
        if duplicate {
            return Err(StoreError::DuplicateMovement(record.movement_id.clone()));
        }

        self.movements.push(record.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryTransaction {
            mut guard,
            balances,
            counters,
            movements,
        } = *self;

        guard.balances.extend(balances);
        guard.counters.extend(counters);
        for record in movements {
            let index = guard.movements.len();
            guard.movement_index.insert(record.movement_id.clone(), index);
            guard.movements.push(record);
        }

        tracing::debug!("in-memory transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        tracing::debug!("in-memory transaction rolled back");
        Ok(())
    }
}
