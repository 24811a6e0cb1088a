//! Replay protection.
//!
//! Records `(from, nonce)` pairs with a TTL of the signature window plus
//! grace. The record insert is atomic set-if-absent, so two concurrent
//! admissions of the same nonce cannot both pass.

use relay_store::{keys, KvStore, StoreError};
use serde::Serialize;
use shared_types::Address;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Operator-facing replay guard counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ReplayStats {
    /// Nonces recorded since startup.
    pub recorded_total: u64,
    /// Admissions rejected as replays since startup.
    pub rejected_total: u64,
    /// Configured record lifetime, seconds.
    pub ttl_secs: u64,
}

/// Guard over observed intent nonces.
pub struct ReplayGuard {
    store: Arc<dyn KvStore>,
    ttl: Duration,
    recorded_total: AtomicU64,
    rejected_total: AtomicU64,
}

impl ReplayGuard {
    /// Creates a guard whose records expire after `ttl`.
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            recorded_total: AtomicU64::new(0),
            rejected_total: AtomicU64::new(0),
        }
    }

    /// Attempts to record `(from, nonce)`.
    ///
    /// Returns `true` if the pair was fresh and is now recorded, `false`
    /// if it was already observed (reject as replay).
    pub async fn try_record(&self, from: &Address, nonce: &str) -> Result<bool, StoreError> {
        let inserted =
            self.store.set_if_absent(&keys::nonce_seen(from, nonce), "1", Some(self.ttl)).await?;
        if inserted {
            self.recorded_total.fetch_add(1, Ordering::Relaxed);
        } else {
            self.rejected_total.fetch_add(1, Ordering::Relaxed);
        }
        Ok(inserted)
    }

    /// Removes a record written by the current admission, compensating a
    /// downstream reject so the client can resubmit.
    pub async fn forget(&self, from: &Address, nonce: &str) -> Result<(), StoreError> {
        self.store.del(&keys::nonce_seen(from, nonce)).await?;
        Ok(())
    }

    /// True if the pair is currently recorded.
    pub async fn is_seen(&self, from: &Address, nonce: &str) -> Result<bool, StoreError> {
        Ok(self.store.get(&keys::nonce_seen(from, nonce)).await?.is_some())
    }

    /// Counter snapshot.
    pub fn stats(&self) -> ReplayStats {
        ReplayStats {
            recorded_total: self.recorded_total.load(Ordering::Relaxed),
            rejected_total: self.rejected_total.load(Ordering::Relaxed),
            ttl_secs: self.ttl.as_secs(),
        }
    }
}
