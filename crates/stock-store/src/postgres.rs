use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::{ActorId, LocationId, Lot, MaterialId, Plant};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::{
    AppliedDelta, BalanceEntry, BalanceKey, BalanceQuery, DeltaPolicy, MovementId, MovementKind,
    MovementQuery, MovementRecord, Result, SequenceScope, StoreError,
    memory::DEFAULT_LOCK_TIMEOUT,
    store::{
        MovementStream, StockStore, StockTransaction, add_contribution,
        validate_record_for_append,
    },
};

const MOVEMENT_COLUMNS: &str = "movement_id, kind, plant, material_id, lot, quantity, \
     applied_quantity, origin_location_id, destination_location_id, occurred_at, recorded_at, \
     actor_id, origin_balance_after, destination_balance_after";

const BALANCE_COLUMNS: &str = "material_id, location_id, lot, on_hand, reserved, last_movement_at";

const STREAM_PAGE_SIZE: i64 = 500;

/// Ledger entries touching a balance key after a position, oldest first.
fn key_movements_sql() -> String {
    format!(
        "SELECT {MOVEMENT_COLUMNS} FROM movements \
         WHERE material_id = $1 AND lot = $2 \
           AND (origin_location_id = $3 OR destination_location_id = $3) \
           AND position > $4 \
         ORDER BY position ASC"
    )
}

fn fold_rows(rows: Vec<PgRow>, key: &BalanceKey) -> Result<Decimal> {
    rows.into_iter().try_fold(Decimal::ZERO, |total, row| {
        add_contribution(total, &row_to_movement(row)?, key)
    })
}

/// PostgreSQL-backed stock store implementation.
///
/// Transactions run at read committed isolation. Balance rows are locked
/// with `SELECT ... FOR UPDATE`, and every lock wait inside a transaction is
/// bounded by `lock_timeout`.
#[derive(Clone)]
pub struct PostgresStockStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresStockStore {
    /// Creates a new PostgreSQL stock store.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Sets the per-transaction lock wait bound.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }
}

fn row_to_movement(row: PgRow) -> Result<MovementRecord> {
    let kind: String = row.try_get("kind")?;
    let kind = kind
        .parse::<MovementKind>()
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;

    Ok(MovementRecord {
        movement_id: MovementId::new(row.try_get::<String, _>("movement_id")?),
        kind,
        plant: Plant::new(row.try_get::<String, _>("plant")?),
        material_id: MaterialId::new(row.try_get::<String, _>("material_id")?),
        lot: Lot::new(row.try_get::<String, _>("lot")?),
        quantity: row.try_get("quantity")?,
        applied_quantity: row.try_get("applied_quantity")?,
        origin_location_id: row
            .try_get::<Option<String>, _>("origin_location_id")?
            .map(LocationId::new),
        destination_location_id: row
            .try_get::<Option<String>, _>("destination_location_id")?
            .map(LocationId::new),
        occurred_at: row.try_get("occurred_at")?,
        recorded_at: row.try_get("recorded_at")?,
        actor_id: ActorId::new(row.try_get::<String, _>("actor_id")?),
        origin_balance_after: row.try_get("origin_balance_after")?,
        destination_balance_after: row.try_get("destination_balance_after")?,
    })
}

fn row_to_balance(row: PgRow) -> Result<BalanceEntry> {
    Ok(BalanceEntry {
        key: BalanceKey::new(
            MaterialId::new(row.try_get::<String, _>("material_id")?),
            LocationId::new(row.try_get::<String, _>("location_id")?),
            Lot::new(row.try_get::<String, _>("lot")?),
        ),
        on_hand: row.try_get("on_hand")?,
        reserved: row.try_get("reserved")?,
        last_movement_at: row.try_get::<Option<DateTime<Utc>>, _>("last_movement_at")?,
    })
}

#[async_trait]
impl StockStore for PostgresStockStore {
    async fn begin(&self) -> Result<Box<dyn StockTransaction>> {
        let mut tx = self.pool.begin().await?;

        // SET cannot take bind parameters; set_config with is_local = true
        // scopes the timeout to this transaction.
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await?;

        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn get_balance(&self, key: &BalanceKey) -> Result<Option<BalanceEntry>> {
        let row = sqlx::query(&format!(
            "SELECT {BALANCE_COLUMNS} FROM balances \
             WHERE material_id = $1 AND location_id = $2 AND lot = $3"
        ))
        .bind(key.material_id.as_str())
        .bind(key.location_id.as_str())
        .bind(key.lot.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_balance).transpose()
    }

    async fn list_balances(&self, query: BalanceQuery) -> Result<Vec<BalanceEntry>> {
        let mut sql = format!("SELECT {BALANCE_COLUMNS} FROM balances WHERE 1=1");
        let mut param_count = 0;

        if query.material_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND material_id = ${param_count}"));
        }
        if query.location_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND location_id = ${param_count}"));
        }
        sql.push_str(" ORDER BY material_id, location_id, lot");

        let mut sqlx_query = sqlx::query(&sql);
        if let Some(material) = query.material_id {
            sqlx_query = sqlx_query.bind(material.as_str().to_string());
        }
        if let Some(location) = query.location_id {
            sqlx_query = sqlx_query.bind(location.as_str().to_string());
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(row_to_balance).collect()
    }

    async fn get_movement(&self, movement_id: &MovementId) -> Result<Option<MovementRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM movements WHERE movement_id = $1"
        ))
        .bind(movement_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_movement).transpose()
    }

    async fn query_movements(&self, query: MovementQuery) -> Result<Vec<MovementRecord>> {
        let mut sql = format!("SELECT {MOVEMENT_COLUMNS} FROM movements WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if query.material_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND material_id = ${param_count}"));
        }
        if query.location_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(
                " AND (origin_location_id = ${param_count} OR destination_location_id = ${param_count})"
            ));
        }
        if query.plant.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND plant = ${param_count}"));
        }
        if query.kinds.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND kind = ANY(${param_count})"));
        }
        if query.from_recorded_at.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND recorded_at >= ${param_count}"));
        }
        if query.to_recorded_at.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND recorded_at <= ${param_count}"));
        }

        sql.push_str(" ORDER BY position ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        // Build and execute query with parameters
        let mut sqlx_query = sqlx::query(&sql);

        if let Some(material) = query.material_id {
            sqlx_query = sqlx_query.bind(material.as_str().to_string());
        }
        if let Some(location) = query.location_id {
            sqlx_query = sqlx_query.bind(location.as_str().to_string());
        }
        if let Some(plant) = query.plant {
            sqlx_query = sqlx_query.bind(plant.as_str().to_string());
        }
        if let Some(kinds) = query.kinds {
            let kinds: Vec<String> = kinds.iter().map(|k| k.as_str().to_string()).collect();
            sqlx_query = sqlx_query.bind(kinds);
        }
        if let Some(from) = query.from_recorded_at {
            sqlx_query = sqlx_query.bind(from);
        }
        if let Some(to) = query.to_recorded_at {
            sqlx_query = sqlx_query.bind(to);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(row_to_movement).collect()
    }

    async fn stream_movements(&self) -> Result<MovementStream> {
        use futures_util::{TryStreamExt, stream};

        // Keyset pages over the ledger position; the stream owns its pool
        // handle so it can outlive the store reference.
        let pool = self.pool.clone();
        let pages = stream::try_unfold((pool, 0i64), |(pool, after)| async move {
            let rows = sqlx::query(&format!(
                "SELECT position, {MOVEMENT_COLUMNS} FROM movements \
                 WHERE position > $1 ORDER BY position ASC LIMIT $2"
            ))
            .bind(after)
            .bind(STREAM_PAGE_SIZE)
            .fetch_all(&pool)
            .await?;

            if rows.is_empty() {
                return Ok(None);
            }

            let mut last = after;
            let mut records = Vec::with_capacity(rows.len());
            for row in rows {
                last = row.try_get("position")?;
                records.push(row_to_movement(row)?);
            }
            let page = stream::iter(records.into_iter().map(Ok::<_, StoreError>));
            Ok::<_, StoreError>(Some((page, (pool, last))))
        })
        .try_flatten();

        Ok(Box::pin(pages))
    }

    async fn sum_since(&self, key: &BalanceKey, from: Option<&MovementId>) -> Result<Decimal> {
        let after_position: i64 = match from {
            Some(movement_id) => {
                sqlx::query_scalar("SELECT position FROM movements WHERE movement_id = $1")
                    .bind(movement_id.as_str())
                    .fetch_optional(&self.pool)
                    .await?
                    .ok_or_else(|| StoreError::MovementNotFound(movement_id.clone()))?
            }
            None => 0,
        };

        let rows = sqlx::query(&key_movements_sql())
            .bind(key.material_id.as_str())
            .bind(key.lot.as_str())
            .bind(key.location_id.as_str())
            .bind(after_position)
            .fetch_all(&self.pool)
            .await?;

        fold_rows(rows, key)
    }
}

/// Unit of work over a PostgreSQL transaction. sqlx rolls the transaction
/// back when it is dropped without a commit.
struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StockTransaction for PostgresTransaction {
    #[tracing::instrument(skip(self), fields(key = %key))]
    async fn lock_balance(&mut self, key: &BalanceKey) -> Result<BalanceEntry> {
        // Upsert a zero placeholder so there is a row to lock; it vanishes
        // with the transaction if the movement never commits.
        sqlx::query(
            r#"
            INSERT INTO balances (material_id, location_id, lot)
            VALUES ($1, $2, $3)
            ON CONFLICT (material_id, location_id, lot) DO NOTHING
            "#,
        )
        .bind(key.material_id.as_str())
        .bind(key.location_id.as_str())
        .bind(key.lot.as_str())
        .execute(&mut *self.tx)
        .await?;

        let row = sqlx::query(&format!(
            "SELECT {BALANCE_COLUMNS} FROM balances \
             WHERE material_id = $1 AND location_id = $2 AND lot = $3 \
             FOR UPDATE"
        ))
        .bind(key.material_id.as_str())
        .bind(key.location_id.as_str())
        .bind(key.lot.as_str())
        .fetch_one(&mut *self.tx)
        .await?;

        row_to_balance(row)
    }

    async fn apply_delta(
        &mut self,
        key: &BalanceKey,
        delta: Decimal,
        policy: DeltaPolicy,
        at: DateTime<Utc>,
    ) -> Result<AppliedDelta> {
        let current = self.lock_balance(key).await?;
        let applied = current.apply(delta, policy, at)?;

        sqlx::query(
            r#"
            UPDATE balances
            SET on_hand = $4, reserved = $5, last_movement_at = $6
            WHERE material_id = $1 AND location_id = $2 AND lot = $3
            "#,
        )
        .bind(key.material_id.as_str())
        .bind(key.location_id.as_str())
        .bind(key.lot.as_str())
        .bind(applied.entry.on_hand)
        .bind(applied.entry.reserved)
        .bind(at)
        .execute(&mut *self.tx)
        .await?;

        Ok(applied)
    }

    async fn next_sequence(&mut self, scope: &SequenceScope) -> Result<u32> {
        let day: NaiveDate = scope.day;
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sequence_counters (plant, kind, day, last_value)
            VALUES ($1, $2, $3, 1)
            ON CONFLICT (plant, kind, day)
            DO UPDATE SET last_value = sequence_counters.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(scope.plant.as_str())
        .bind(scope.kind.as_str())
        .bind(day)
        .fetch_one(&mut *self.tx)
        .await?;

        u32::try_from(value)
            .map_err(|_| StoreError::Corrupt(format!("sequence value {value} out of range")))
    }

    async fn ledger_total(&mut self, key: &BalanceKey) -> Result<Decimal> {
        let rows = sqlx::query(&key_movements_sql())
            .bind(key.material_id.as_str())
            .bind(key.lot.as_str())
            .bind(key.location_id.as_str())
            .bind(0_i64)
            .fetch_all(&mut *self.tx)
            .await?;

        fold_rows(rows, key)
    }

    async fn append_movement(&mut self, record: &MovementRecord) -> Result<()> {
        validate_record_for_append(record)?;

        sqlx::query(&format!(
            "INSERT INTO movements ({MOVEMENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
        ))
        .bind(record.movement_id.as_str())
        .bind(record.kind.as_str())
        .bind(record.plant.as_str())
        .bind(record.material_id.as_str())
        .bind(record.lot.as_str())
        .bind(record.quantity)
        .bind(record.applied_quantity)
        .bind(record.origin_location_id.as_ref().map(|l| l.as_str()))
        .bind(record.destination_location_id.as_ref().map(|l| l.as_str()))
        .bind(record.occurred_at)
        .bind(record.recorded_at)
        .bind(record.actor_id.as_str())
        .bind(record.origin_balance_after)
        .bind(record.destination_balance_after)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return StoreError::DuplicateMovement(record.movement_id.clone());
            }
            StoreError::from(e)
        })?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
