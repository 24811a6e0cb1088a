//! KV store port.
//!
//! Modeled on a Redis-shaped key/value service. Every operation is
//! linearizable per key; the admission pipeline depends on that for its
//! replay and accounting guarantees.

use async_trait::async_trait;
use shared_types::U256;
use std::time::Duration;
use thiserror::Error;

/// Storage operation failure.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backend rejected or lost the operation.
    #[error("store backend error: {0}")]
    Backend(String),

    /// A stored value could not be parsed as the expected type.
    #[error("corrupt value at key {key}")]
    Corrupt {
        /// The offending key.
        key: String,
    },
}

/// Key/value storage port.
///
/// Scalar values are strings (records are JSON-encoded by callers);
/// balances are decimal [`U256`] strings; lists are FIFO when written
/// with [`lpush`](KvStore::lpush) and read with [`rpop`](KvStore::rpop).
///
/// A `ttl` of `None` means the key does not expire.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Reads a scalar value.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes a scalar value, replacing any previous value and TTL.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Writes a scalar value only if the key is absent (or expired).
    ///
    /// Returns `true` if the write happened. This is the atomic insert
    /// the replay guard depends on: of two concurrent calls with the
    /// same key, exactly one observes `true`.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// Atomically increments a counter, creating it (and applying `ttl`)
    /// if absent. Returns the new value.
    async fn incr(&self, key: &str, by: u64, ttl: Option<Duration>) -> Result<u64, StoreError>;

    /// Deletes a key. Returns `true` if it existed.
    async fn del(&self, key: &str) -> Result<bool, StoreError>;

    /// Atomically reads and deletes a key.
    ///
    /// Of two concurrent calls, at most one observes the value; rollback
    /// points are consumed through this to make the compensating credit
    /// at-most-once.
    async fn get_del(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Atomically debits a decimal [`U256`] balance if it is at least
    /// `amount`. Returns the new balance, or `None` (without writing)
    /// when the balance is insufficient. A missing key reads as zero.
    async fn debit_if_at_least(
        &self,
        key: &str,
        amount: U256,
    ) -> Result<Option<U256>, StoreError>;

    /// Atomically credits a decimal [`U256`] balance, creating the key
    /// if absent and refreshing its TTL. Returns the new balance.
    async fn credit(
        &self,
        key: &str,
        amount: U256,
        ttl: Option<Duration>,
    ) -> Result<U256, StoreError>;

    /// Pushes a value at the head of a list. Returns the new length.
    async fn lpush(&self, list: &str, value: &str) -> Result<u64, StoreError>;

    /// Pushes a value at the tail of a list (the next `rpop` returns it).
    /// Used to restore entries skipped during a visibility scan.
    async fn rpush(&self, list: &str, value: &str) -> Result<u64, StoreError>;

    /// Pops the value at the tail of a list (FIFO relative to `lpush`).
    async fn rpop(&self, list: &str) -> Result<Option<String>, StoreError>;

    /// Returns the length of a list.
    async fn llen(&self, list: &str) -> Result<u64, StoreError>;

    /// Lists the live scalar keys under a prefix.
    ///
    /// Only the boot-time rollback sweep uses this; it is not on any hot
    /// path.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}
