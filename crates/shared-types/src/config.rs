//! Relayer configuration with validation.
//!
//! One immutable [`RelayerConfig`] is constructed at startup and passed by
//! reference (behind an `Arc`) to every subsystem; there is no mutable
//! global. Every section carries serde defaults so partial config files
//! work, and [`RelayerConfig::validate`] rejects inconsistent values
//! before anything starts.

use crate::entities::U256;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Top-level relayer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayerConfig {
    /// Admission gate settings (credentials, windows, limits).
    pub admission: AdmissionConfig,
    /// Priority queue and retry settings.
    pub queue: QueueConfig,
    /// Worker pool settings.
    pub scheduler: SchedulerConfig,
    /// Wallet pool settings.
    pub wallet: WalletConfig,
    /// Gas and confirmation settings.
    pub gas: GasConfig,
    /// Chain identifier included in every outbound transaction.
    pub chain_id: u64,
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            admission: AdmissionConfig::default(),
            queue: QueueConfig::default(),
            scheduler: SchedulerConfig::default(),
            wallet: WalletConfig::default(),
            gas: GasConfig::default(),
            chain_id: 1,
        }
    }
}

/// Admission gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Accepted API keys. Empty means every key is rejected.
    pub api_keys: Vec<String>,
    /// Half-width of the intent freshness window, seconds.
    pub signature_window_secs: u64,
    /// Extra replay-record lifetime beyond the signature window, seconds.
    pub replay_grace_secs: u64,
    /// Fixed-window per-client request budget.
    pub max_requests_per_minute: u32,
    /// Per-transaction amount cap, base units. Equality admits.
    pub max_transaction_amount: U256,
    /// Prepaid ledger entry TTL, seconds.
    pub prepaid_ttl_secs: u64,
    /// Rollback point TTL, seconds. Must exceed the worst-case
    /// confirmation time.
    pub rollback_ttl_secs: u64,
    /// Job and status record TTL, seconds.
    pub status_ttl_secs: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            signature_window_secs: 300,
            replay_grace_secs: 60,
            max_requests_per_minute: 100,
            // 1 ETH in wei
            max_transaction_amount: U256::from(1_000_000_000_000_000_000u64),
            prepaid_ttl_secs: 86_400,
            rollback_ttl_secs: 3_600,
            status_ttl_secs: 3_600,
        }
    }
}

impl AdmissionConfig {
    /// Freshness window as a duration.
    pub fn signature_window(&self) -> Duration {
        Duration::from_secs(self.signature_window_secs)
    }

    /// Replay record TTL: signature window plus grace.
    pub fn replay_ttl(&self) -> Duration {
        Duration::from_secs(self.signature_window_secs + self.replay_grace_secs)
    }
}

/// Priority queue and retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Total queued-job capacity across all priority classes.
    pub max_queue_size: usize,
    /// Maximum delivery attempts per job (first attempt included).
    pub max_attempts: u32,
    /// Base retry delay, seconds; doubles per attempt.
    pub base_retry_delay_secs: u64,
    /// Retry delay ceiling, seconds.
    pub max_retry_delay_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 10_000,
            max_attempts: 3,
            base_retry_delay_secs: 5,
            max_retry_delay_secs: 300,
        }
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum concurrently processing jobs (worker count).
    pub max_concurrent: usize,
    /// Runtime worker threads for the async executor.
    pub worker_threads: usize,
    /// Cap on the time from lease to terminal outcome, seconds.
    pub processing_timeout_secs: u64,
    /// Idle sleep between empty pops, milliseconds.
    pub idle_poll_ms: u64,
    /// Grace period for in-flight jobs at shutdown, seconds.
    pub shutdown_grace_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            worker_threads: 4,
            processing_timeout_secs: 300,
            idle_poll_ms: 100,
            shutdown_grace_secs: 10,
        }
    }
}

impl SchedulerConfig {
    /// Per-job processing timeout as a duration.
    pub fn processing_timeout(&self) -> Duration {
        Duration::from_secs(self.processing_timeout_secs)
    }
}

/// Wallet pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Hex-encoded 32-byte signing keys, one per pool wallet.
    pub keys: Vec<String>,
    /// Wallets below this cached balance are not selectable; equality is.
    pub min_balance_threshold: U256,
    /// Balance monitor poll interval, seconds.
    pub balance_poll_interval_secs: u64,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            // 0.1 ETH in wei
            min_balance_threshold: U256::from(100_000_000_000_000_000u64),
            balance_poll_interval_secs: 30,
        }
    }
}

/// Gas and confirmation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GasConfig {
    /// Gas limit attached to every payment transaction.
    pub gas_limit: u64,
    /// Multiplier applied to the chain's fee suggestion.
    pub gas_price_multiplier: f64,
    /// Fee ceiling, wei per gas.
    pub max_gas_price: u64,
    /// Fee floor, wei per gas.
    pub min_gas_price: u64,
    /// Blocks to wait before a submission counts as confirmed.
    pub confirmation_blocks: u64,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            gas_limit: 21_000,
            gas_price_multiplier: 1.1,
            max_gas_price: 100_000_000_000, // 100 gwei
            min_gas_price: 1_000_000_000,   // 1 gwei
            confirmation_blocks: 1,
        }
    }
}

/// Configuration validation failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A numeric field that must be positive is zero.
    #[error("{field} must be greater than zero")]
    Zero {
        /// Offending field name.
        field: &'static str,
    },
    /// The gas price floor exceeds the ceiling.
    #[error("min_gas_price {min} exceeds max_gas_price {max}")]
    GasBounds {
        /// Configured floor.
        min: u64,
        /// Configured ceiling.
        max: u64,
    },
    /// The gas price multiplier is not a positive finite number.
    #[error("gas_price_multiplier must be positive and finite, got {0}")]
    Multiplier(f64),
    /// A wallet key is not 64 hex characters.
    #[error("wallet key #{index} is not a 32-byte hex string")]
    WalletKey {
        /// Position in `wallet.keys`.
        index: usize,
    },
}

impl RelayerConfig {
    /// Validates cross-field consistency. Called once at startup; a
    /// config that fails here never reaches the subsystems.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.admission.signature_window_secs == 0 {
            return Err(ConfigError::Zero { field: "signature_window_secs" });
        }
        if self.admission.max_requests_per_minute == 0 {
            return Err(ConfigError::Zero { field: "max_requests_per_minute" });
        }
        if self.queue.max_queue_size == 0 {
            return Err(ConfigError::Zero { field: "max_queue_size" });
        }
        if self.queue.max_attempts == 0 {
            return Err(ConfigError::Zero { field: "max_attempts" });
        }
        if self.scheduler.max_concurrent == 0 {
            return Err(ConfigError::Zero { field: "max_concurrent" });
        }
        if self.scheduler.worker_threads == 0 {
            return Err(ConfigError::Zero { field: "worker_threads" });
        }
        if self.scheduler.processing_timeout_secs == 0 {
            return Err(ConfigError::Zero { field: "processing_timeout_secs" });
        }
        if self.gas.gas_limit == 0 {
            return Err(ConfigError::Zero { field: "gas_limit" });
        }
        if self.gas.min_gas_price > self.gas.max_gas_price {
            return Err(ConfigError::GasBounds {
                min: self.gas.min_gas_price,
                max: self.gas.max_gas_price,
            });
        }
        if !self.gas.gas_price_multiplier.is_finite() || self.gas.gas_price_multiplier <= 0.0 {
            return Err(ConfigError::Multiplier(self.gas.gas_price_multiplier));
        }
        for (index, key) in self.wallet.keys.iter().enumerate() {
            let stripped = key.strip_prefix("0x").unwrap_or(key);
            if stripped.len() != 64 || hex::decode(stripped).is_err() {
                return Err(ConfigError::WalletKey { index });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(RelayerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_gas_bounds_checked() {
        let mut config = RelayerConfig::default();
        config.gas.min_gas_price = 200;
        config.gas.max_gas_price = 100;
        assert_eq!(
            config.validate(),
            Err(ConfigError::GasBounds { min: 200, max: 100 })
        );
    }

    #[test]
    fn test_zero_fields_rejected() {
        let mut config = RelayerConfig::default();
        config.queue.max_attempts = 0;
        assert_eq!(config.validate(), Err(ConfigError::Zero { field: "max_attempts" }));
    }

    #[test]
    fn test_bad_wallet_key_rejected() {
        let mut config = RelayerConfig::default();
        config.wallet.keys = vec!["0x1234".into()];
        assert_eq!(config.validate(), Err(ConfigError::WalletKey { index: 0 }));
    }

    #[test]
    fn test_replay_ttl_includes_grace() {
        let config = AdmissionConfig::default();
        assert_eq!(config.replay_ttl(), Duration::from_secs(360));
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let config: RelayerConfig =
            serde_json::from_str(r#"{"chain_id": 5, "queue": {"max_attempts": 7}}"#).unwrap();
        assert_eq!(config.chain_id, 5);
        assert_eq!(config.queue.max_attempts, 7);
        assert_eq!(config.queue.max_queue_size, 10_000);
        assert_eq!(config.gas.gas_limit, 21_000);
    }
}
