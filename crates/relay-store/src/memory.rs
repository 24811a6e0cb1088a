//! In-memory KV adapter.
//!
//! Single-process implementation of [`KvStore`] with TTL expiry driven by
//! a [`TimeSource`], so tests can advance the clock deterministically.
//! Locks are held only for the map operation itself, never across an
//! await.

use crate::kv::{KvStore, StoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{SystemTimeSource, TimeSource, U256};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

struct ScalarEntry {
    value: String,
    expires_at: Option<u64>,
}

impl ScalarEntry {
    fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|t| t <= now)
    }
}

/// In-memory [`KvStore`] with per-key TTL.
pub struct MemoryStore {
    scalars: Mutex<HashMap<String, ScalarEntry>>,
    lists: Mutex<HashMap<String, VecDeque<String>>>,
    time: Arc<dyn TimeSource>,
}

impl MemoryStore {
    /// Creates a store on the system clock.
    pub fn new() -> Self {
        Self::with_time(Arc::new(SystemTimeSource))
    }

    /// Creates a store on an explicit clock (deterministic tests).
    pub fn with_time(time: Arc<dyn TimeSource>) -> Self {
        Self {
            scalars: Mutex::new(HashMap::new()),
            lists: Mutex::new(HashMap::new()),
            time,
        }
    }

    fn expires_at(&self, ttl: Option<Duration>) -> Option<u64> {
        ttl.map(|t| self.time.now_ms() + t.as_millis() as u64)
    }

    /// Reads a live value, dropping the entry if its TTL has lapsed.
    fn read_live(map: &mut HashMap<String, ScalarEntry>, key: &str, now: u64) -> Option<String> {
        match map.get(key) {
            Some(entry) if entry.is_expired(now) => {
                map.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    fn parse_balance(key: &str, value: Option<&str>) -> Result<U256, StoreError> {
        match value {
            None => Ok(U256::zero()),
            Some(raw) => {
                U256::from_dec_str(raw).map_err(|_| StoreError::Corrupt { key: key.to_string() })
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.time.now_ms();
        let mut scalars = self.scalars.lock();
        Ok(Self::read_live(&mut scalars, key, now))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires_at = self.expires_at(ttl);
        let mut scalars = self.scalars.lock();
        scalars.insert(key.to_string(), ScalarEntry { value: value.to_string(), expires_at });
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let now = self.time.now_ms();
        let expires_at = self.expires_at(ttl);
        let mut scalars = self.scalars.lock();
        if Self::read_live(&mut scalars, key, now).is_some() {
            return Ok(false);
        }
        scalars.insert(key.to_string(), ScalarEntry { value: value.to_string(), expires_at });
        Ok(true)
    }

    async fn incr(&self, key: &str, by: u64, ttl: Option<Duration>) -> Result<u64, StoreError> {
        let now = self.time.now_ms();
        let expires_at = self.expires_at(ttl);
        let mut scalars = self.scalars.lock();
        match Self::read_live(&mut scalars, key, now) {
            Some(raw) => {
                let current: u64 =
                    raw.parse().map_err(|_| StoreError::Corrupt { key: key.to_string() })?;
                let next = current.saturating_add(by);
                // Keep the TTL set at window creation
                if let Some(entry) = scalars.get_mut(key) {
                    entry.value = next.to_string();
                }
                Ok(next)
            }
            None => {
                scalars.insert(key.to_string(), ScalarEntry { value: by.to_string(), expires_at });
                Ok(by)
            }
        }
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        let now = self.time.now_ms();
        let mut scalars = self.scalars.lock();
        match scalars.remove(key) {
            Some(entry) => Ok(!entry.is_expired(now)),
            None => Ok(false),
        }
    }

    async fn get_del(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.time.now_ms();
        let mut scalars = self.scalars.lock();
        match scalars.remove(key) {
            Some(entry) if !entry.is_expired(now) => Ok(Some(entry.value)),
            _ => Ok(None),
        }
    }

    async fn debit_if_at_least(
        &self,
        key: &str,
        amount: U256,
    ) -> Result<Option<U256>, StoreError> {
        let now = self.time.now_ms();
        let mut scalars = self.scalars.lock();
        let current = Self::parse_balance(key, Self::read_live(&mut scalars, key, now).as_deref())?;
        if current < amount {
            return Ok(None);
        }
        let next = current - amount;
        match scalars.get_mut(key) {
            Some(entry) => entry.value = next.to_string(),
            // Balance was implicitly zero and the debit was zero
            None => {
                scalars.insert(key.to_string(), ScalarEntry { value: next.to_string(), expires_at: None });
            }
        }
        Ok(Some(next))
    }

    async fn credit(
        &self,
        key: &str,
        amount: U256,
        ttl: Option<Duration>,
    ) -> Result<U256, StoreError> {
        let now = self.time.now_ms();
        let expires_at = self.expires_at(ttl);
        let mut scalars = self.scalars.lock();
        let current = Self::parse_balance(key, Self::read_live(&mut scalars, key, now).as_deref())?;
        let next = current.saturating_add(amount);
        scalars.insert(key.to_string(), ScalarEntry { value: next.to_string(), expires_at });
        Ok(next)
    }

    async fn lpush(&self, list: &str, value: &str) -> Result<u64, StoreError> {
        let mut lists = self.lists.lock();
        let entries = lists.entry(list.to_string()).or_default();
        entries.push_front(value.to_string());
        Ok(entries.len() as u64)
    }

    async fn rpush(&self, list: &str, value: &str) -> Result<u64, StoreError> {
        let mut lists = self.lists.lock();
        let entries = lists.entry(list.to_string()).or_default();
        entries.push_back(value.to_string());
        Ok(entries.len() as u64)
    }

    async fn rpop(&self, list: &str) -> Result<Option<String>, StoreError> {
        let mut lists = self.lists.lock();
        Ok(lists.get_mut(list).and_then(|entries| entries.pop_back()))
    }

    async fn llen(&self, list: &str) -> Result<u64, StoreError> {
        let lists = self.lists.lock();
        Ok(lists.get(list).map_or(0, |entries| entries.len() as u64))
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let now = self.time.now_ms();
        let scalars = self.scalars.lock();
        Ok(scalars
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::MockTimeSource;

    fn store_at(initial: u64) -> (MemoryStore, MockTimeSource) {
        let clock = MockTimeSource::new(initial);
        let store = MemoryStore::with_time(Arc::new(clock.clone()));
        (store, clock)
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let (store, _) = store_at(0);
        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let (store, clock) = store_at(0);
        store.set("k", "v", Some(Duration::from_secs(1))).await.unwrap();
        assert!(store.get("k").await.unwrap().is_some());

        clock.advance(999);
        assert!(store.get("k").await.unwrap().is_some());

        clock.advance(1);
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_if_absent_blocks_second_writer() {
        let (store, _) = store_at(0);
        assert!(store.set_if_absent("k", "a", None).await.unwrap());
        assert!(!store.set_if_absent("k", "b", None).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_set_if_absent_succeeds_after_expiry() {
        let (store, clock) = store_at(0);
        assert!(store.set_if_absent("k", "a", Some(Duration::from_secs(5))).await.unwrap());
        clock.advance(5_000);
        assert!(store.set_if_absent("k", "b", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_incr_keeps_window_ttl() {
        let (store, clock) = store_at(0);
        assert_eq!(store.incr("c", 1, Some(Duration::from_secs(60))).await.unwrap(), 1);
        clock.advance(30_000);
        assert_eq!(store.incr("c", 1, Some(Duration::from_secs(60))).await.unwrap(), 2);

        // Window expires relative to creation, not the last increment
        clock.advance(30_000);
        assert_eq!(store.incr("c", 1, Some(Duration::from_secs(60))).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_del_consumes_once() {
        let (store, _) = store_at(0);
        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.get_del("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.get_del("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_debit_requires_sufficient_balance() {
        let (store, _) = store_at(0);
        store.credit("bal", U256::from(100u64), None).await.unwrap();

        assert_eq!(
            store.debit_if_at_least("bal", U256::from(40u64)).await.unwrap(),
            Some(U256::from(60u64))
        );
        // Insufficient: no write happens
        assert_eq!(store.debit_if_at_least("bal", U256::from(61u64)).await.unwrap(), None);
        assert_eq!(
            store.debit_if_at_least("bal", U256::from(60u64)).await.unwrap(),
            Some(U256::zero())
        );
    }

    #[tokio::test]
    async fn test_debit_missing_key_reads_zero() {
        let (store, _) = store_at(0);
        assert_eq!(store.debit_if_at_least("bal", U256::from(1u64)).await.unwrap(), None);
        assert_eq!(store.debit_if_at_least("bal", U256::zero()).await.unwrap(), Some(U256::zero()));
    }

    #[tokio::test]
    async fn test_list_fifo_order() {
        let (store, _) = store_at(0);
        store.lpush("q", "first").await.unwrap();
        store.lpush("q", "second").await.unwrap();
        store.lpush("q", "third").await.unwrap();

        assert_eq!(store.llen("q").await.unwrap(), 3);
        assert_eq!(store.rpop("q").await.unwrap().as_deref(), Some("first"));
        assert_eq!(store.rpop("q").await.unwrap().as_deref(), Some("second"));
        assert_eq!(store.rpop("q").await.unwrap().as_deref(), Some("third"));
        assert_eq!(store.rpop("q").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rpush_restores_tail() {
        let (store, _) = store_at(0);
        store.lpush("q", "a").await.unwrap();
        store.lpush("q", "b").await.unwrap();

        let popped = store.rpop("q").await.unwrap().unwrap();
        assert_eq!(popped, "a");
        store.rpush("q", &popped).await.unwrap();

        // "a" is back at the tail and pops first again
        assert_eq!(store.rpop("q").await.unwrap().as_deref(), Some("a"));
        assert_eq!(store.rpop("q").await.unwrap().as_deref(), Some("b"));
    }
}
