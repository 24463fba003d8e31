//! Read model views folded from the movement ledger.

pub mod ledger_balances;

pub use ledger_balances::{LedgerBalance, LedgerBalancesView, SnapshotMismatch};
