pub mod balance;
pub mod error;
pub mod memory;
pub mod movement;
pub mod postgres;
pub mod query;
pub mod store;

pub use balance::{
    AppliedDelta, BalanceEntry, BalanceKey, DeltaPolicy, QUANTITY_SCALE, max_quantity,
};
pub use error::{Result, StoreError};
pub use memory::InMemoryStockStore;
pub use movement::{MovementId, MovementKind, MovementRecord, SequenceScope, UnknownMovementKind};
pub use postgres::PostgresStockStore;
pub use query::{BalanceQuery, MovementQuery};
pub use store::{MovementStream, StockStore, StockStoreExt, StockTransaction};
