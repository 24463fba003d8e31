//! Movement engine for the inventory ledger.
//!
//! This crate provides:
//! - `MovementEngine`, the single writer of balances and ledger entries
//! - The per-kind policy table and request validation
//! - Catalog gateway and balance notifier seams, with in-memory implementations
//! - Retry and engine configuration

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod kind;
pub mod notify;
pub mod request;
pub mod retry;

pub use catalog::{CatalogError, CatalogGateway, CatalogLocation, CatalogMaterial, InMemoryCatalog};
pub use config::EngineConfig;
pub use engine::MovementEngine;
pub use error::{EntityKind, ErrorKind, MovementError, Result, StructuredError};
pub use kind::{BalanceEffect, KindPolicy, LegRequirement, policy};
pub use notify::{
    BalanceChanged, BalanceNotifier, BroadcastNotifier, NoopNotifier, NotifyError,
    RecordingNotifier,
};
pub use request::{Leg, LegRole, MovementPlan, MovementReceipt, RecordMovement};
pub use retry::RetryConfig;
