//! Configuration loading.
//!
//! Defaults, then an optional JSON file named by `RELAY_CONFIG`, then
//! `RELAY_*` environment overrides for the settings operators most
//! often set per deployment. The result is validated before anything
//! starts.

use shared_types::{ConfigError, RelayerConfig, U256};
use thiserror::Error;
use tracing::info;

/// Configuration loading failure.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    /// The `RELAY_CONFIG` file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Io {
        /// File named by `RELAY_CONFIG`.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for [`RelayerConfig`].
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        /// File named by `RELAY_CONFIG`.
        path: String,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// An environment override holds an unusable value.
    #[error("invalid value for {var}: {value}")]
    BadOverride {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },

    /// The assembled configuration is inconsistent.
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

/// Loads, overrides, and validates the runtime configuration.
pub fn load_config() -> Result<RelayerConfig, ConfigLoadError> {
    let mut config = match std::env::var("RELAY_CONFIG") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path)
                .map_err(|source| ConfigLoadError::Io { path: path.clone(), source })?;
            let parsed = serde_json::from_str(&raw)
                .map_err(|source| ConfigLoadError::Parse { path: path.clone(), source })?;
            info!(path = %path, "configuration loaded from file");
            parsed
        }
        Err(_) => RelayerConfig::default(),
    };

    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

fn apply_env_overrides(config: &mut RelayerConfig) -> Result<(), ConfigLoadError> {
    if let Some(keys) = read_list("RELAY_API_KEYS") {
        config.admission.api_keys = keys;
    }
    if let Some(keys) = read_list("RELAY_WALLET_KEYS") {
        config.wallet.keys = keys;
    }
    config.chain_id = read_parsed("RELAY_CHAIN_ID", config.chain_id)?;
    config.scheduler.max_concurrent =
        read_parsed("RELAY_MAX_CONCURRENT", config.scheduler.max_concurrent)?;
    config.scheduler.worker_threads =
        read_parsed("RELAY_WORKER_THREADS", config.scheduler.worker_threads)?;
    config.queue.max_queue_size =
        read_parsed("RELAY_MAX_QUEUE_SIZE", config.queue.max_queue_size)?;
    config.queue.max_attempts = read_parsed("RELAY_MAX_ATTEMPTS", config.queue.max_attempts)?;
    config.admission.max_requests_per_minute = read_parsed(
        "RELAY_MAX_REQUESTS_PER_MINUTE",
        config.admission.max_requests_per_minute,
    )?;

    if let Ok(raw) = std::env::var("RELAY_MAX_TRANSACTION_AMOUNT") {
        config.admission.max_transaction_amount = U256::from_dec_str(&raw).map_err(|_| {
            ConfigLoadError::BadOverride { var: "RELAY_MAX_TRANSACTION_AMOUNT", value: raw }
        })?;
    }
    if let Ok(raw) = std::env::var("RELAY_MIN_BALANCE_THRESHOLD") {
        config.wallet.min_balance_threshold = U256::from_dec_str(&raw).map_err(|_| {
            ConfigLoadError::BadOverride { var: "RELAY_MIN_BALANCE_THRESHOLD", value: raw }
        })?;
    }
    Ok(())
}

fn read_list(var: &'static str) -> Option<Vec<String>> {
    std::env::var(var).ok().map(|raw| {
        raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect()
    })
}

fn read_parsed<T: std::str::FromStr>(
    var: &'static str,
    default: T,
) -> Result<T, ConfigLoadError> {
    match std::env::var(var) {
        Ok(raw) => {
            raw.parse().map_err(|_| ConfigLoadError::BadOverride { var, value: raw })
        }
        Err(_) => Ok(default),
    }
}
