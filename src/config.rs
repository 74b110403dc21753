//! # Transport Configuration
//!
//! Serde-deserializable configuration for the table-based transport with
//! environment-variable loading. All knobs have production defaults; tests
//! and embedders override by construction.

use crate::error::{Result, TransportError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Transaction isolation level applied to receive transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// Statement issued right after `BEGIN` to apply the level.
    pub fn set_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => {
                "SET TRANSACTION ISOLATION LEVEL READ COMMITTED"
            }
            IsolationLevel::RepeatableRead => {
                "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ"
            }
            IsolationLevel::Serializable => "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE",
        }
    }
}

/// Backpressure settings for sends into a full queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueFullConfig {
    /// Attempts before a send fails with a queue-full error
    pub max_attempts: u32,
    /// Linear delay step between attempts, in milliseconds
    pub delay_step_ms: u64,
}

impl Default for QueueFullConfig {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            delay_step_ms: 50,
        }
    }
}

impl QueueFullConfig {
    pub fn delay_step(&self) -> Duration {
        Duration::from_millis(self.delay_step_ms)
    }
}

/// Backpressure settings for receive loops observing an empty queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEmptyConfig {
    /// Linear delay step per consecutive empty observation, in milliseconds
    pub delay_step_ms: u64,
    /// Delay ceiling, in milliseconds
    pub max_delay_ms: u64,
}

impl Default for QueueEmptyConfig {
    fn default() -> Self {
        Self {
            delay_step_ms: 100,
            max_delay_ms: 1_000,
        }
    }
}

impl QueueEmptyConfig {
    pub fn delay_step(&self) -> Duration {
        Duration::from_millis(self.delay_step_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Top-level configuration for the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Number of concurrent receive loops
    pub max_concurrency: usize,
    /// Isolation level for receive transactions
    pub isolation_level: IsolationLevel,
    /// Purge the input queue when the pump starts
    pub purge_on_startup: bool,
    /// Keep the receive transaction for the receive only; dispatches open
    /// their own connections
    pub receive_only_transactions: bool,
    /// How long receive failures may persist before the circuit breaker
    /// raises a critical error, in seconds
    pub circuit_breaker_wait_secs: u64,
    /// Failure cache capacity (entries)
    pub failure_cache_capacity: usize,
    /// Preallocated slots per queue table at provisioning time
    pub slot_count: i32,
    /// Full-queue backpressure
    pub queue_full: QueueFullConfig,
    /// Empty-queue backpressure
    pub queue_empty: QueueEmptyConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            isolation_level: IsolationLevel::ReadCommitted,
            purge_on_startup: false,
            receive_only_transactions: false,
            circuit_breaker_wait_secs: 30,
            failure_cache_capacity: 10_000,
            slot_count: 20_000,
            queue_full: QueueFullConfig::default(),
            queue_empty: QueueEmptyConfig::default(),
        }
    }
}

impl TransportConfig {
    /// Load configuration from `ROWMQ_`-prefixed environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("ROWMQ")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| TransportError::configuration(e.to_string()))?;

        settings
            .try_deserialize()
            .map_err(|e| TransportError::configuration(e.to_string()))
    }

    pub fn circuit_breaker_wait(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker_wait_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_provisioned_capacity() {
        let config = TransportConfig::default();
        assert_eq!(config.slot_count, 20_000);
        assert_eq!(config.failure_cache_capacity, 10_000);
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.isolation_level, IsolationLevel::ReadCommitted);
        assert!(!config.purge_on_startup);
    }

    #[test]
    fn isolation_level_sql() {
        assert!(IsolationLevel::ReadCommitted.set_sql().contains("READ COMMITTED"));
        assert!(IsolationLevel::Serializable.set_sql().contains("SERIALIZABLE"));
    }

    #[test]
    fn queue_full_delay_step() {
        let config = QueueFullConfig::default();
        assert_eq!(config.delay_step(), Duration::from_millis(50));
        assert_eq!(config.max_attempts, 20);
    }

    #[test]
    fn config_deserializes_from_partial_input() {
        let parsed: TransportConfig =
            serde_json::from_str(r#"{"max_concurrency": 8, "purge_on_startup": true}"#)
                .expect("should deserialize");
        assert_eq!(parsed.max_concurrency, 8);
        assert!(parsed.purge_on_startup);
        assert_eq!(parsed.slot_count, 20_000);
    }
}
