//! The movement engine: validation, balance mutation and ledger append as
//! one atomic unit.

use std::time::Instant;

use chrono::Utc;
use stock_store::{
    BalanceEntry, BalanceKey, MovementId, MovementRecord, SequenceScope, StockStore,
    StockStoreExt,
};

use crate::{
    catalog::CatalogGateway,
    config::EngineConfig,
    error::{EntityKind, MovementError, Result},
    notify::{BalanceChanged, BalanceNotifier, NotifyError},
    request::{LegRole, MovementPlan, RecordMovement},
};

/// Records stock movements.
///
/// The engine is the only writer of balances and ledger entries. Each
/// accepted movement locks the balances it touches in ascending key order,
/// checks stock, applies the deltas, draws a movement number and appends the
/// ledger entry inside a single store transaction. Lost lock races are
/// retried with backoff; business rejections are not.
pub struct MovementEngine<S, C, N> {
    store: S,
    catalog: C,
    notifier: N,
    config: EngineConfig,
}

impl<S, C, N> MovementEngine<S, C, N>
where
    S: StockStore,
    C: CatalogGateway,
    N: BalanceNotifier,
{
    /// Creates an engine with the default configuration.
    pub fn new(store: S, catalog: C, notifier: N) -> Self {
        Self {
            store,
            catalog,
            notifier,
            config: EngineConfig::default(),
        }
    }

    /// Replaces the engine configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns a reference to the underlying stock store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validates and records a movement.
    ///
    /// On success the ledger entry is committed and every touched balance
    /// reflects it. On failure nothing is written.
    #[tracing::instrument(
        skip(self, request),
        fields(kind = %request.kind, plant = %request.plant, material = %request.material_id)
    )]
    pub async fn record_movement(&self, request: RecordMovement) -> Result<MovementRecord> {
        let started = Instant::now();
        let result = self.record(&request).await;
        metrics::histogram!("movement_duration_seconds").record(started.elapsed().as_secs_f64());

        match &result {
            Ok(record) => {
                metrics::counter!("movements_recorded_total", "kind" => record.kind.as_str())
                    .increment(1);
                tracing::info!(
                    movement_id = %record.movement_id,
                    quantity = %record.quantity,
                    applied_quantity = %record.applied_quantity,
                    "movement recorded"
                );
                self.notify(record).await;
            }
            Err(e) => {
                metrics::counter!("movements_rejected_total", "reason" => e.kind().as_str())
                    .increment(1);
                tracing::info!(error = %e, "movement rejected");
            }
        }

        result
    }

    /// Reads the current balance for a key. A never-moved key is empty.
    pub async fn balance(&self, key: &BalanceKey) -> Result<BalanceEntry> {
        Ok(self.store.balance_or_empty(key).await?)
    }

    /// Reads a ledger entry.
    pub async fn movement(&self, movement_id: &MovementId) -> Result<MovementRecord> {
        self.store
            .get_movement(movement_id)
            .await?
            .ok_or_else(|| MovementError::NotFound {
                entity: EntityKind::Movement,
                id: movement_id.to_string(),
            })
    }

    async fn record(&self, request: &RecordMovement) -> Result<MovementRecord> {
        let plan = request.validate()?;
        self.resolve(&plan).await?;

        let retry = &self.config.retry;
        let mut attempt = 1;
        loop {
            match self.attempt(&plan).await {
                Ok(record) => {
                    if attempt > 1 {
                        tracing::debug!(attempt, "movement succeeded after retry");
                    }
                    return Ok(record);
                }
                Err(e) if e.is_retryable() && retry.should_retry(attempt) => {
                    let delay = retry.backoff(attempt);
                    tracing::warn!(attempt, ?delay, error = %e, "movement lost a lock race, retrying");
                    metrics::counter!("movement_retries_total").increment(1);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(MovementError::ConcurrencyConflict { reason, .. }) => {
                    return Err(MovementError::ConcurrencyConflict {
                        attempts: attempt,
                        reason,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Checks every referenced catalog entity exists, is active and belongs
    /// to the request's plant.
    async fn resolve(&self, plan: &MovementPlan) -> Result<()> {
        let material = self
            .catalog
            .resolve_material(&plan.material_id)
            .await?
            .ok_or_else(|| MovementError::NotFound {
                entity: EntityKind::Material,
                id: plan.material_id.to_string(),
            })?;
        if !material.active {
            return Err(MovementError::InactiveEntity {
                entity: EntityKind::Material,
                id: plan.material_id.to_string(),
            });
        }

        for location_id in plan.locations() {
            let location = self
                .catalog
                .resolve_location(location_id)
                .await?
                .ok_or_else(|| MovementError::NotFound {
                    entity: EntityKind::Location,
                    id: location_id.to_string(),
                })?;
            if !location.active {
                return Err(MovementError::InactiveEntity {
                    entity: EntityKind::Location,
                    id: location_id.to_string(),
                });
            }
            if location.plant != plan.plant {
                return Err(MovementError::InvalidRequest(format!(
                    "location {} belongs to plant {}, not {}",
                    location_id, location.plant, plan.plant
                )));
            }
        }

        Ok(())
    }

    /// One attempt at the atomic unit. Any early return drops the
    /// transaction, which rolls it back.
    async fn attempt(&self, plan: &MovementPlan) -> Result<MovementRecord> {
        let recorded_at = Utc::now();
        let legs = plan.legs();
        let mut tx = self.store.begin().await?;

        for leg in &legs {
            let entry = tx.lock_balance(&leg.key).await?;
            tracing::debug!(key = %leg.key, on_hand = %entry.on_hand, "balance locked");

            if leg.role == LegRole::Origin && plan.rules.debits_origin() {
                let requested = -leg.delta;
                if entry.available() < requested {
                    return Err(MovementError::InsufficientStock {
                        key: leg.key.clone(),
                        available: entry.available(),
                        requested,
                    });
                }
            }
        }

        let mut origin_balance_after = None;
        let mut destination_balance_after = None;
        let mut applied_quantity = plan.quantity;
        for leg in &legs {
            let applied = tx
                .apply_delta(&leg.key, leg.delta, plan.rules.delta_policy(), recorded_at)
                .await?;
            if plan.rules.signed_quantity() {
                applied_quantity = applied.applied;
                if applied.was_clamped() {
                    tracing::warn!(
                        key = %leg.key,
                        requested = %applied.requested,
                        applied = %applied.applied,
                        "adjustment clamped at zero"
                    );
                }
            }
            match leg.role {
                LegRole::Origin => origin_balance_after = Some(applied.entry.on_hand),
                LegRole::Destination => destination_balance_after = Some(applied.entry.on_hand),
            }
        }

        let scope = SequenceScope::new(plan.plant.clone(), plan.kind, recorded_at);
        let seq = tx.next_sequence(&scope).await?;

        let record = MovementRecord {
            movement_id: scope.movement_id(seq),
            kind: plan.kind,
            plant: plan.plant.clone(),
            material_id: plan.material_id.clone(),
            lot: plan.lot.clone(),
            quantity: plan.quantity,
            applied_quantity,
            origin_location_id: plan.origin.clone(),
            destination_location_id: plan.destination.clone(),
            occurred_at: plan.occurred_at.unwrap_or(recorded_at),
            recorded_at,
            actor_id: plan.actor_id.clone(),
            origin_balance_after,
            destination_balance_after,
        };

        tx.append_movement(&record).await?;
        tx.commit().await?;

        Ok(record)
    }

    /// Tells the notifier about every touched balance. Failures are logged
    /// and counted only.
    async fn notify(&self, record: &MovementRecord) {
        for key in record.touched_keys() {
            let Some(on_hand) = record.balance_after(&key) else {
                continue;
            };
            let change = BalanceChanged {
                material_id: key.material_id,
                location_id: key.location_id,
                lot: key.lot,
                on_hand,
                movement_id: record.movement_id.clone(),
            };

            let outcome = tokio::time::timeout(
                self.config.notify_timeout,
                self.notifier.balance_changed(&change),
            )
            .await
            .unwrap_or(Err(NotifyError::Timeout));

            if let Err(e) = outcome {
                metrics::counter!("notifications_failed_total").increment(1);
                tracing::warn!(
                    movement_id = %record.movement_id,
                    key = %change.key(),
                    error = %e,
                    "balance change notification failed"
                );
            }
        }
    }
}
