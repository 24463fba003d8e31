//! Shared identifier types used across the inventory ledger crates.

mod types;

pub use types::{ActorId, LocationId, Lot, MaterialId, Plant};
