//! Engine configuration loaded from environment variables.

use std::time::Duration;

use crate::retry::RetryConfig;

/// Movement engine tuning with sensible defaults.
///
/// Reads from environment variables:
/// - `LEDGER_MAX_ATTEMPTS`: attempts per movement on conflict (default: `3`)
/// - `LEDGER_INITIAL_BACKOFF_MS`: first retry delay (default: `25`)
/// - `LEDGER_MAX_BACKOFF_MS`: retry delay cap (default: `500`)
/// - `LEDGER_LOCK_TIMEOUT_MS`: bound on any lock wait (default: `2000`)
/// - `LEDGER_NOTIFY_TIMEOUT_MS`: bound on each notification (default: `500`)
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub retry: RetryConfig,
    pub lock_timeout: Duration,
    pub notify_timeout: Duration,
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl EngineConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            retry: RetryConfig {
                max_attempts: env_u64("LEDGER_MAX_ATTEMPTS")
                    .and_then(|v| u32::try_from(v).ok())
                    .filter(|v| *v > 0)
                    .unwrap_or(defaults.retry.max_attempts),
                initial_backoff: env_u64("LEDGER_INITIAL_BACKOFF_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.retry.initial_backoff),
                max_backoff: env_u64("LEDGER_MAX_BACKOFF_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.retry.max_backoff),
                backoff_factor: defaults.retry.backoff_factor,
            },
            lock_timeout: env_u64("LEDGER_LOCK_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_timeout),
            notify_timeout: env_u64("LEDGER_NOTIFY_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.notify_timeout),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            lock_timeout: Duration::from_millis(2000),
            notify_timeout: Duration::from_millis(500),
        }
    }
}
