//! # Shared Types
//!
//! Core domain vocabulary shared by every relayer subsystem: addresses and
//! hashes, payment intents, jobs and their lifecycle statuses, wallet
//! snapshots, rejection reasons, and the immutable runtime configuration.
//!
//! Subsystem crates depend on this crate instead of on each other, which
//! keeps the dependency graph a tree (store and chain adapter at the
//! leaves, scheduler at the root).

pub mod config;
pub mod entities;
pub mod errors;
pub mod time;

pub use config::{ConfigError, RelayerConfig};
pub use entities::*;
pub use errors::RejectReason;
pub use time::{MockTimeSource, SystemTimeSource, TimeSource};
