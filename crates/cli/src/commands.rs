//! Command implementations, generic over the stock store so they run against
//! PostgreSQL in production and the in-memory store in tests.

use std::path::Path;

use common::{LocationId, Lot, MaterialId};
use movements::{
    BalanceNotifier, CatalogGateway, InMemoryCatalog, MovementEngine, MovementError,
    MovementReceipt, RecordMovement, StructuredError,
};
use projections::{ReconciliationReport, Reconciler};
use sqlx::postgres::PgPoolOptions;
use stock_store::{BalanceEntry, BalanceKey, PostgresStockStore, StockStore, StockStoreExt};
use tokio::io::AsyncReadExt;

use crate::config::Config;
use crate::error::{CliError, Result};

/// Opens the connection pool and wraps it in a store.
pub async fn connect(config: &Config) -> Result<PostgresStockStore> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;
    Ok(PostgresStockStore::new(pool).with_lock_timeout(config.engine.lock_timeout))
}

/// Applies pending schema migrations.
pub async fn migrate(store: &PostgresStockStore) -> Result<()> {
    store.run_migrations().await?;
    tracing::info!("migrations applied");
    Ok(())
}

/// Loads the catalog JSON file into the in-memory gateway.
pub async fn load_catalog(path: &Path) -> Result<InMemoryCatalog> {
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CliError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let catalog = InMemoryCatalog::from_json(&json)?;
    let (materials, locations) = catalog.counts().await;
    tracing::info!(path = %path.display(), materials, locations, "catalog loaded");
    Ok(catalog)
}

/// Resolves a `record` argument: `-` reads standard input, anything else is
/// the request JSON itself.
pub async fn read_input(input: &str) -> Result<String> {
    if input != "-" {
        return Ok(input.to_string());
    }
    let mut buf = String::new();
    tokio::io::stdin()
        .read_to_string(&mut buf)
        .await
        .map_err(CliError::Stdin)?;
    Ok(buf)
}

/// Parses a movement request. Malformed JSON is an invalid request.
pub fn parse_request(json: &str) -> std::result::Result<RecordMovement, MovementError> {
    serde_json::from_str(json)
        .map_err(|e| MovementError::InvalidRequest(format!("malformed request: {e}")))
}

/// Records one movement, returning the receipt or the structured rejection.
pub async fn record<S, C, N>(
    engine: &MovementEngine<S, C, N>,
    json: &str,
) -> std::result::Result<MovementReceipt, StructuredError>
where
    S: StockStore,
    C: CatalogGateway,
    N: BalanceNotifier,
{
    let request = parse_request(json).map_err(|e| e.to_structured())?;
    engine
        .record_movement(request)
        .await
        .map(|record| MovementReceipt::from(&record))
        .map_err(|e| e.to_structured())
}

/// Reads one balance. A never-moved key reads as zero.
pub async fn balance<S: StockStore>(
    store: &S,
    material: &str,
    location: &str,
    lot: Option<&str>,
) -> Result<BalanceEntry> {
    let key = BalanceKey::new(
        MaterialId::new(material),
        LocationId::new(location),
        Lot::from_option(lot),
    );
    Ok(store.balance_or_empty(&key).await?)
}

/// Replays the ledger and compares it with the materialized balances.
pub async fn reconcile<S: StockStore + Clone>(store: &S) -> Result<ReconciliationReport> {
    Ok(Reconciler::new(store.clone()).reconcile().await?)
}
