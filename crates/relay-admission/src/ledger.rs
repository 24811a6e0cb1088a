//! Prepaid ledger.
//!
//! One decimal balance per client in the kv store. The debit is a single
//! conditional store operation, so the balance can never go negative no
//! matter how admissions interleave.

use relay_store::{keys, KvStore, StoreError};
use shared_types::{ClientId, U256};
use std::sync::Arc;
use std::time::Duration;

/// Client prepaid balances.
#[derive(Clone)]
pub struct PrepaidLedger {
    store: Arc<dyn KvStore>,
    ttl: Duration,
}

impl PrepaidLedger {
    /// Creates a ledger whose entries live for `ttl` after the last
    /// credit.
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Adds funds, returning the new balance. Refreshes the entry TTL.
    pub async fn credit(&self, client_id: &ClientId, amount: U256) -> Result<U256, StoreError> {
        self.store.credit(&keys::prepaid(client_id), amount, Some(self.ttl)).await
    }

    /// Atomically debits `amount` if the balance covers it.
    ///
    /// Returns the new balance, or `None` (no write) when it does not.
    pub async fn debit_if_covered(
        &self,
        client_id: &ClientId,
        amount: U256,
    ) -> Result<Option<U256>, StoreError> {
        self.store.debit_if_at_least(&keys::prepaid(client_id), amount).await
    }

    /// Current balance; absent clients read as zero.
    pub async fn balance(&self, client_id: &ClientId) -> Result<U256, StoreError> {
        match self.store.get(&keys::prepaid(client_id)).await? {
            None => Ok(U256::zero()),
            Some(raw) => U256::from_dec_str(&raw)
                .map_err(|_| StoreError::Corrupt { key: keys::prepaid(client_id) }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_store::MemoryStore;

    fn ledger() -> PrepaidLedger {
        PrepaidLedger::new(Arc::new(MemoryStore::new()), Duration::from_secs(86_400))
    }

    #[tokio::test]
    async fn test_credit_then_debit() {
        let ledger = ledger();
        let client = "c1".to_string();

        assert_eq!(ledger.credit(&client, U256::from(100u64)).await.unwrap(), U256::from(100u64));
        assert_eq!(
            ledger.debit_if_covered(&client, U256::from(30u64)).await.unwrap(),
            Some(U256::from(70u64))
        );
        assert_eq!(ledger.balance(&client).await.unwrap(), U256::from(70u64));
    }

    #[tokio::test]
    async fn test_debit_never_overdraws() {
        let ledger = ledger();
        let client = "c1".to_string();
        ledger.credit(&client, U256::from(10u64)).await.unwrap();

        assert_eq!(ledger.debit_if_covered(&client, U256::from(11u64)).await.unwrap(), None);
        assert_eq!(ledger.balance(&client).await.unwrap(), U256::from(10u64));
    }

    #[tokio::test]
    async fn test_unknown_client_reads_zero() {
        let ledger = ledger();
        assert_eq!(ledger.balance(&"nobody".to_string()).await.unwrap(), U256::zero());
    }

    #[tokio::test]
    async fn test_exact_balance_debit_leaves_zero() {
        let ledger = ledger();
        let client = "c1".to_string();
        ledger.credit(&client, U256::from(25u64)).await.unwrap();

        assert_eq!(
            ledger.debit_if_covered(&client, U256::from(25u64)).await.unwrap(),
            Some(U256::zero())
        );
        assert_eq!(ledger.balance(&client).await.unwrap(), U256::zero());
    }
}
