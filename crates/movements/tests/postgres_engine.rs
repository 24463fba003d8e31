//! Movement engine tests against PostgreSQL.
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p movements --test postgres_engine -- --test-threads=1
//! ```

use std::{collections::HashSet, sync::Arc, time::Duration};

use common::{LocationId, Lot, MaterialId};
use movements::{
    CatalogLocation, CatalogMaterial, EngineConfig, InMemoryCatalog, MovementEngine,
    MovementError, NoopNotifier, RecordMovement, RetryConfig,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::PgPool;
use stock_store::{BalanceKey, BalanceQuery, PostgresStockStore, StockStore};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

type PgEngine = MovementEngine<PostgresStockStore, InMemoryCatalog, NoopNotifier>;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_stock_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn create_engine() -> Arc<PgEngine> {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(20)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE movements, balances, sequence_counters RESTART IDENTITY")
        .execute(&pool)
        .await
        .unwrap();

    let catalog = InMemoryCatalog::new();
    catalog.insert_material(CatalogMaterial::active("M1")).await;
    for id in ["L1", "L2"] {
        catalog.insert_location(CatalogLocation::active(id, "P1")).await;
    }

    let config = EngineConfig {
        retry: RetryConfig {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(100),
            backoff_factor: 2.0,
        },
        lock_timeout: Duration::from_secs(2),
        ..EngineConfig::default()
    };
    let store = PostgresStockStore::new(pool).with_lock_timeout(config.lock_timeout);

    Arc::new(MovementEngine::new(store, catalog, NoopNotifier).with_config(config))
}

fn key(location: &str) -> BalanceKey {
    BalanceKey::new(MaterialId::new("M1"), LocationId::new(location), Lot::unlotted())
}

async fn on_hand(engine: &PgEngine, location: &str) -> Decimal {
    engine.balance(&key(location)).await.unwrap().on_hand
}

#[tokio::test]
async fn walkthrough_matches_in_memory_behaviour() {
    let engine = create_engine().await;

    engine
        .record_movement(RecordMovement::receive("P1", "M1", "L1", dec!(100), "alice"))
        .await
        .unwrap();
    engine
        .record_movement(RecordMovement::dispatch("P1", "M1", "L1", dec!(30), "alice"))
        .await
        .unwrap();

    let result = engine
        .record_movement(RecordMovement::dispatch("P1", "M1", "L1", dec!(80), "alice"))
        .await;
    assert!(matches!(result, Err(MovementError::InsufficientStock { .. })));

    engine
        .record_movement(RecordMovement::transfer(
            "P1",
            "M1",
            "L1",
            "L2",
            dec!(20),
            "alice",
        ))
        .await
        .unwrap();
    let adjusted = engine
        .record_movement(RecordMovement::adjust("P1", "M1", "L2", dec!(-50), "alice"))
        .await
        .unwrap();

    assert_eq!(on_hand(&engine, "L1").await, dec!(50));
    assert_eq!(on_hand(&engine, "L2").await, dec!(0));
    assert_eq!(adjusted.applied_quantity, dec!(-20));

    let store = engine.store();
    for balance in store.list_balances(BalanceQuery::all()).await.unwrap() {
        assert_eq!(
            store.sum_since(&balance.key, None).await.unwrap(),
            balance.on_hand
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_receives_get_distinct_ids() {
    let engine = create_engine().await;

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .record_movement(RecordMovement::receive("P1", "M1", "L1", dec!(1), "bot"))
                    .await
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        let record = handle.await.unwrap().unwrap();
        assert!(ids.insert(record.movement_id));
    }

    assert_eq!(ids.len(), 50);
    assert_eq!(on_hand(&engine, "L1").await, dec!(50));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_dispatches_never_overdraw() {
    let engine = create_engine().await;
    engine
        .record_movement(RecordMovement::receive("P1", "M1", "L1", dec!(10), "alice"))
        .await
        .unwrap();

    let handles: Vec<_> = (0..30)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .record_movement(RecordMovement::dispatch("P1", "M1", "L1", dec!(1), "bot"))
                    .await
            })
        })
        .collect();

    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(MovementError::InsufficientStock { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(accepted, 10);
    assert_eq!(on_hand(&engine, "L1").await, dec!(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn opposing_transfers_do_not_deadlock() {
    let engine = create_engine().await;
    engine
        .record_movement(RecordMovement::receive("P1", "M1", "L1", dec!(100), "alice"))
        .await
        .unwrap();
    engine
        .record_movement(RecordMovement::receive("P1", "M1", "L2", dec!(100), "alice"))
        .await
        .unwrap();

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let engine = engine.clone();
            let (from, to) = if i % 2 == 0 { ("L1", "L2") } else { ("L2", "L1") };
            tokio::spawn(async move {
                engine
                    .record_movement(RecordMovement::transfer("P1", "M1", from, to, dec!(1), "bot"))
                    .await
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(
        on_hand(&engine, "L1").await + on_hand(&engine, "L2").await,
        dec!(200)
    );
    assert_eq!(on_hand(&engine, "L1").await, dec!(100));
}

#[tokio::test]
async fn quantities_persist_without_rounding() {
    let engine = create_engine().await;

    let result = engine
        .record_movement(RecordMovement::receive(
            "P1",
            "M1",
            "L1",
            dec!(0.0000004),
            "alice",
        ))
        .await;
    assert!(matches!(result, Err(MovementError::InvalidRequest(_))));

    engine
        .record_movement(RecordMovement::receive("P1", "M1", "L1", dec!(0.000001), "alice"))
        .await
        .unwrap();
    assert_eq!(on_hand(&engine, "L1").await, dec!(0.000001));

    engine
        .record_movement(RecordMovement::receive(
            "P1",
            "M1",
            "L2",
            stock_store::max_quantity(),
            "alice",
        ))
        .await
        .unwrap();
    let result = engine
        .record_movement(RecordMovement::receive("P1", "M1", "L2", dec!(1), "alice"))
        .await;
    assert!(matches!(result, Err(MovementError::InvalidRequest(_))));
    assert_eq!(on_hand(&engine, "L2").await, stock_store::max_quantity());
    assert_eq!(
        engine.store().sum_since(&key("L2"), None).await.unwrap(),
        stock_store::max_quantity()
    );
}
