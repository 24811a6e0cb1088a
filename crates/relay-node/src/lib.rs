//! # Relay Node
//!
//! Wires the relayer core together and exposes the public operation
//! surface the HTTP layer calls:
//!
//! - `submit_intent`, `get_job_status`, `subscribe_status`
//! - `get_queue_status`, `list_wallets`
//! - `credit_prepaid`, `get_prepaid_balance`
//! - `force_rollback` (privileged)
//!
//! Startup order follows the dependency tree: wallets register and sync
//! their nonces, the boot sweep settles debits orphaned by a previous
//! crash, then the balance monitor and the worker pool come up.

mod config_loader;
mod service;

pub use config_loader::{load_config, ConfigLoadError};
pub use service::{ForceRollback, QueueStatus, Relayer, RelayerError};
