//! Per-client rate limiting.
//!
//! Fixed 60-second windows backed by the store's atomic counter, so the
//! budget holds across every process sharing the store.

use relay_store::{keys, KvStore, StoreError};
use shared_types::ClientId;
use std::sync::Arc;
use std::time::Duration;

const WINDOW: Duration = Duration::from_secs(60);

/// Fixed-window request counter.
pub struct RateWindow {
    store: Arc<dyn KvStore>,
    limit: u32,
}

impl RateWindow {
    /// Creates a window allowing `limit` requests per minute per client.
    pub fn new(store: Arc<dyn KvStore>, limit: u32) -> Self {
        Self { store, limit }
    }

    /// Counts one request. Returns `true` while the client is inside its
    /// budget for the current window.
    pub async fn check(&self, client_id: &ClientId) -> Result<bool, StoreError> {
        let count = self.store.incr(&keys::rate_limit(client_id), 1, Some(WINDOW)).await?;
        Ok(count <= self.limit as u64)
    }

    /// Configured per-minute budget.
    pub fn limit(&self) -> u32 {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_store::MemoryStore;
    use shared_types::MockTimeSource;

    #[tokio::test]
    async fn test_budget_enforced_per_window() {
        let clock = MockTimeSource::new(0);
        let store = Arc::new(MemoryStore::with_time(Arc::new(clock.clone())));
        let window = RateWindow::new(store, 3);
        let client = "c1".to_string();

        for _ in 0..3 {
            assert!(window.check(&client).await.unwrap());
        }
        assert!(!window.check(&client).await.unwrap());

        // A new window resets the budget
        clock.advance(60_000);
        assert!(window.check(&client).await.unwrap());
    }

    #[tokio::test]
    async fn test_clients_counted_independently() {
        let store = Arc::new(MemoryStore::new());
        let window = RateWindow::new(store, 1);

        assert!(window.check(&"a".to_string()).await.unwrap());
        assert!(window.check(&"b".to_string()).await.unwrap());
        assert!(!window.check(&"a".to_string()).await.unwrap());
    }
}
