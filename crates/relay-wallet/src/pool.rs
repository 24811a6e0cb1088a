//! The wallet pool.

use crate::lease::{OrphanBin, WalletLease};
use crate::records::{PoolStats, WalletRecord};
use crate::WalletError;
use relay_chain::ChainAdapter;
use shared_crypto::RelayerKeyPair;
use shared_types::{Address, JobId, LeaseOutcome, TimeSource, U256, WalletInfo, WalletState};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// How `acquire` ranks candidate wallets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionStrategy {
    /// Lowest pending work, then highest success rate, then least
    /// recently used.
    #[default]
    Balanced,
    /// Strict least-recently-used rotation.
    LeastRecentlyUsed,
    /// Highest success rate first.
    BestPerformance,
}

/// Pool of relayer signing wallets.
///
/// All record mutation happens under one async mutex, held only for the
/// field updates themselves. Chain I/O (nonce and balance reads) runs
/// outside the critical section.
pub struct WalletPool {
    records: Mutex<HashMap<Address, WalletRecord>>,
    chain: Arc<dyn ChainAdapter>,
    time: Arc<dyn TimeSource>,
    min_balance: U256,
    strategy: SelectionStrategy,
    bin: Arc<OrphanBin>,
}

impl WalletPool {
    /// Creates an empty pool.
    pub fn new(
        chain: Arc<dyn ChainAdapter>,
        time: Arc<dyn TimeSource>,
        min_balance: U256,
        strategy: SelectionStrategy,
    ) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            chain,
            time,
            min_balance,
            strategy,
            bin: Arc::new(OrphanBin::default()),
        }
    }

    /// Registers a wallet, initialising its nonce and balance from the
    /// chain. Returns its address.
    pub async fn register(&self, signer: RelayerKeyPair) -> Result<Address, WalletError> {
        let signer = Arc::new(signer);
        let address = signer.address();
        let nonce = self.chain.get_nonce(address).await?;
        let balance = self.chain.get_balance(address).await?;

        let mut records = self.records.lock().await;
        records.insert(address, WalletRecord::new(signer, nonce, balance));
        info!(wallet = %address, nonce, balance = %balance, "wallet registered");
        Ok(address)
    }

    /// Leases the best idle wallet, reserving its next nonce.
    ///
    /// Returns `None` when no wallet passes the filter (idle, balance at
    /// or above the threshold).
    pub async fn acquire(&self, job_id: JobId) -> Option<WalletLease> {
        let strategy = self.strategy;
        let min_balance = self.min_balance;
        let now = self.time.now_ms();
        let bin = self.bin.clone();

        let mut records = self.records.lock().await;
        Self::settle_orphans(&mut records, &self.bin);

        let candidate = records
            .values_mut()
            .filter(|r| r.state == WalletState::Idle && r.balance >= min_balance)
            .min_by(|a, b| match strategy {
                SelectionStrategy::Balanced => a
                    .in_flight
                    .len()
                    .cmp(&b.in_flight.len())
                    .then_with(|| b.success_rate.total_cmp(&a.success_rate))
                    .then_with(|| a.last_used.cmp(&b.last_used)),
                SelectionStrategy::LeastRecentlyUsed => a.last_used.cmp(&b.last_used),
                SelectionStrategy::BestPerformance => b
                    .success_rate
                    .total_cmp(&a.success_rate)
                    .then_with(|| a.last_used.cmp(&b.last_used)),
            })?;

        candidate.state = WalletState::Leased;
        candidate.in_flight.insert(job_id);
        candidate.last_used = now;
        let nonce = candidate.local_nonce;
        candidate.local_nonce += 1;

        Some(WalletLease {
            address: candidate.address,
            nonce,
            job_id,
            signer: candidate.signer.clone(),
            bin,
            returned: false,
        })
    }

    /// Returns a lease with its outcome.
    ///
    /// Updates counters and the success-rate EMA; a draining wallet
    /// whose last lease just came back gets its nonce re-synced from the
    /// chain before returning to service.
    pub async fn release(&self, mut lease: WalletLease, outcome: LeaseOutcome) {
        lease.mark_returned();
        let address = lease.address();
        let job_id = lease.job_id();
        drop(lease);

        let needs_resync = {
            let mut records = self.records.lock().await;
            Self::settle_orphans(&mut records, &self.bin);
            match records.get_mut(&address) {
                Some(record) => {
                    record.apply_release(&job_id, outcome);
                    record.ready_for_resync()
                }
                None => {
                    warn!(wallet = %address, "release for unknown wallet");
                    false
                }
            }
        };

        if needs_resync {
            self.resync(address).await;
        }
    }

    /// Moves a wallet into `draining` after the chain reported nonce
    /// divergence. The re-sync happens once in-flight work settles (or
    /// immediately when there is none).
    pub async fn mark_divergence(&self, address: Address) -> Result<(), WalletError> {
        let ready = {
            let mut records = self.records.lock().await;
            let record =
                records.get_mut(&address).ok_or(WalletError::UnknownWallet(address))?;
            match record.state {
                WalletState::Disabled => false,
                _ => {
                    record.state = WalletState::Draining;
                    warn!(wallet = %address, "nonce divergence, wallet draining");
                    record.ready_for_resync()
                }
            }
        };

        if ready {
            self.resync(address).await;
        }
        Ok(())
    }

    /// Operator disable. Stays disabled until [`enable`](Self::enable).
    pub async fn disable(&self, address: Address, reason: &str) -> Result<(), WalletError> {
        let mut records = self.records.lock().await;
        let record = records.get_mut(&address).ok_or(WalletError::UnknownWallet(address))?;
        record.state = WalletState::Disabled;
        record.auto_disabled = false;
        warn!(wallet = %address, reason, "wallet disabled");
        Ok(())
    }

    /// Operator re-enable.
    pub async fn enable(&self, address: Address) -> Result<(), WalletError> {
        let mut records = self.records.lock().await;
        let record = records.get_mut(&address).ok_or(WalletError::UnknownWallet(address))?;
        if record.state == WalletState::Disabled {
            record.state = WalletState::Idle;
            record.auto_disabled = false;
            info!(wallet = %address, "wallet enabled");
        }
        Ok(())
    }

    /// Re-reads every wallet balance from the chain and applies the
    /// disable/re-enable threshold transitions. Called by the balance
    /// monitor.
    pub async fn refresh_balances(&self) {
        let addresses: Vec<Address> = {
            let records = self.records.lock().await;
            records.keys().copied().collect()
        };

        for address in addresses {
            match self.chain.get_balance(address).await {
                Ok(balance) => self.apply_balance(address, balance).await,
                Err(e) => warn!(wallet = %address, error = %e, "balance read failed"),
            }
        }
    }

    /// Applies an observed balance and its state transitions.
    pub async fn apply_balance(&self, address: Address, balance: U256) {
        let mut records = self.records.lock().await;
        let Some(record) = records.get_mut(&address) else { return };
        record.balance = balance;

        match record.state {
            WalletState::Idle if balance < self.min_balance => {
                record.state = WalletState::Disabled;
                record.auto_disabled = true;
                warn!(wallet = %address, balance = %balance, "wallet below balance threshold, disabled");
            }
            WalletState::Disabled if record.auto_disabled && balance >= self.min_balance => {
                record.state = WalletState::Idle;
                record.auto_disabled = false;
                info!(wallet = %address, balance = %balance, "wallet balance recovered, enabled");
            }
            _ => {}
        }
    }

    /// Public snapshot of every wallet. No key material.
    pub async fn snapshot(&self) -> Vec<WalletInfo> {
        let mut records = self.records.lock().await;
        Self::settle_orphans(&mut records, &self.bin);
        let mut infos: Vec<WalletInfo> = records.values().map(WalletRecord::info).collect();
        infos.sort_by_key(|w| w.address);
        infos
    }

    /// Aggregate counters.
    pub async fn stats(&self) -> PoolStats {
        let records = self.records.lock().await;
        let mut stats = PoolStats {
            total_wallets: records.len(),
            idle_wallets: 0,
            leased_wallets: 0,
            draining_wallets: 0,
            disabled_wallets: 0,
            total_submissions: 0,
            overall_success_rate: 1.0,
        };
        let mut successes = 0u64;
        for record in records.values() {
            match record.state {
                WalletState::Idle => stats.idle_wallets += 1,
                WalletState::Leased => stats.leased_wallets += 1,
                WalletState::Draining => stats.draining_wallets += 1,
                WalletState::Disabled => stats.disabled_wallets += 1,
            }
            stats.total_submissions += record.total_submissions;
            successes += record.successful_submissions;
        }
        if stats.total_submissions > 0 {
            stats.overall_success_rate = successes as f64 / stats.total_submissions as f64;
        }
        stats
    }

    /// Number of leases currently outstanding across the pool. The
    /// shutdown path waits for this to reach zero.
    pub async fn outstanding_leases(&self) -> usize {
        let mut records = self.records.lock().await;
        Self::settle_orphans(&mut records, &self.bin);
        records.values().map(|r| r.in_flight.len()).sum()
    }

    /// Re-syncs a drained wallet's nonce from the chain.
    async fn resync(&self, address: Address) {
        let chain_nonce = match self.chain.get_nonce(address).await {
            Ok(nonce) => nonce,
            Err(e) => {
                warn!(wallet = %address, error = %e, "nonce re-sync failed, wallet stays draining");
                return;
            }
        };

        let mut records = self.records.lock().await;
        if let Some(record) = records.get_mut(&address) {
            if record.ready_for_resync() {
                record.local_nonce = chain_nonce;
                record.state = WalletState::Idle;
                info!(wallet = %address, nonce = chain_nonce, "wallet nonce re-synced");
            }
        }
    }

    /// Settles leases that were dropped without release as failures.
    fn settle_orphans(records: &mut HashMap<Address, WalletRecord>, bin: &OrphanBin) {
        for (address, job_id) in bin.drain() {
            if let Some(record) = records.get_mut(&address) {
                record.apply_release(&job_id, LeaseOutcome::Failure);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_chain::MockChain;
    use shared_types::MockTimeSource;

    async fn pool_with_wallets(
        count: usize,
        strategy: SelectionStrategy,
    ) -> (Arc<WalletPool>, Arc<MockChain>, Vec<Address>, MockTimeSource) {
        let chain = Arc::new(MockChain::new());
        let clock = MockTimeSource::new(1_000);
        let pool = Arc::new(WalletPool::new(
            chain.clone(),
            Arc::new(clock.clone()),
            U256::from(100u64),
            strategy,
        ));

        let mut addresses = Vec::new();
        for _ in 0..count {
            let signer = RelayerKeyPair::generate();
            chain.set_balance(signer.address(), U256::from(1_000u64));
            addresses.push(pool.register(signer).await.unwrap());
        }
        (pool, chain, addresses, clock)
    }

    #[tokio::test]
    async fn test_lease_reserves_increasing_nonces() {
        let (pool, _, addresses, _) = pool_with_wallets(1, SelectionStrategy::Balanced).await;

        let lease = pool.acquire(JobId::new_v4()).await.unwrap();
        assert_eq!(lease.address(), addresses[0]);
        assert_eq!(lease.next_nonce(), 0);
        pool.release(lease, LeaseOutcome::Success { gas_used: 21_000 }).await;

        let lease = pool.acquire(JobId::new_v4()).await.unwrap();
        assert_eq!(lease.next_nonce(), 1);
        pool.release(lease, LeaseOutcome::Success { gas_used: 21_000 }).await;
    }

    #[tokio::test]
    async fn test_no_double_lease() {
        let (pool, _, _, _) = pool_with_wallets(1, SelectionStrategy::Balanced).await;

        let lease = pool.acquire(JobId::new_v4()).await.unwrap();
        // The only wallet is leased: nothing available
        assert!(pool.acquire(JobId::new_v4()).await.is_none());

        pool.release(lease, LeaseOutcome::Failure).await;
        assert!(pool.acquire(JobId::new_v4()).await.is_some());
    }

    #[tokio::test]
    async fn test_round_robin_under_uniform_load() {
        let (pool, _, _, clock) = pool_with_wallets(3, SelectionStrategy::Balanced).await;

        let mut seen = Vec::new();
        for _ in 0..3 {
            clock.advance(10);
            let lease = pool.acquire(JobId::new_v4()).await.unwrap();
            seen.push(lease.address());
            pool.release(lease, LeaseOutcome::Success { gas_used: 0 }).await;
        }

        // Uniform load: three distinct wallets before any repeats
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 3);
    }

    #[tokio::test]
    async fn test_proven_wallet_preferred() {
        let (pool, _, addresses, clock) = pool_with_wallets(2, SelectionStrategy::Balanced).await;

        // Tank the first wallet's success rate
        for _ in 0..3 {
            clock.advance(10);
            let job = JobId::new_v4();
            let lease = loop {
                let lease = pool.acquire(job).await.unwrap();
                if lease.address() == addresses[0] {
                    break lease;
                }
                pool.release(lease, LeaseOutcome::Success { gas_used: 0 }).await;
            };
            pool.release(lease, LeaseOutcome::Failure).await;
        }

        clock.advance(10);
        let lease = pool.acquire(JobId::new_v4()).await.unwrap();
        assert_eq!(lease.address(), addresses[1]);
        pool.release(lease, LeaseOutcome::Success { gas_used: 0 }).await;
    }

    #[tokio::test]
    async fn test_balance_threshold_boundary() {
        let (pool, _, addresses, _) = pool_with_wallets(1, SelectionStrategy::Balanced).await;

        // Exactly at the threshold: selectable
        pool.apply_balance(addresses[0], U256::from(100u64)).await;
        let lease = pool.acquire(JobId::new_v4()).await.unwrap();
        pool.release(lease, LeaseOutcome::Success { gas_used: 0 }).await;

        // Below: disabled and not selectable
        pool.apply_balance(addresses[0], U256::from(99u64)).await;
        assert!(pool.acquire(JobId::new_v4()).await.is_none());
        let snapshot = pool.snapshot().await;
        let info = &snapshot[0];
        assert_eq!(info.state, WalletState::Disabled);

        // Recovered: re-enabled automatically
        pool.apply_balance(addresses[0], U256::from(150u64)).await;
        assert!(pool.acquire(JobId::new_v4()).await.is_some());
    }

    #[tokio::test]
    async fn test_operator_disable_sticks_through_balance_reads() {
        let (pool, _, addresses, _) = pool_with_wallets(1, SelectionStrategy::Balanced).await;

        pool.disable(addresses[0], "maintenance").await.unwrap();
        // A healthy balance read does not re-enable an operator disable
        pool.apply_balance(addresses[0], U256::from(10_000u64)).await;
        assert!(pool.acquire(JobId::new_v4()).await.is_none());

        pool.enable(addresses[0]).await.unwrap();
        assert!(pool.acquire(JobId::new_v4()).await.is_some());
    }

    #[tokio::test]
    async fn test_divergence_drains_then_resyncs() {
        let (pool, chain, addresses, _) = pool_with_wallets(1, SelectionStrategy::Balanced).await;

        let lease = pool.acquire(JobId::new_v4()).await.unwrap();
        pool.mark_divergence(addresses[0]).await.unwrap();

        // Draining: no new leases even though in-flight work exists
        assert!(pool.acquire(JobId::new_v4()).await.is_none());

        // The chain has moved on to nonce 7
        chain.set_nonce(addresses[0], 7);
        pool.release(lease, LeaseOutcome::Failure).await;

        let snapshot = pool.snapshot().await;
        let info = &snapshot[0];
        assert_eq!(info.state, WalletState::Idle);
        assert_eq!(info.local_nonce, 7);

        let lease = pool.acquire(JobId::new_v4()).await.unwrap();
        assert_eq!(lease.next_nonce(), 7);
        pool.release(lease, LeaseOutcome::Success { gas_used: 0 }).await;
    }

    #[tokio::test]
    async fn test_idle_divergence_resyncs_immediately() {
        let (pool, chain, addresses, _) = pool_with_wallets(1, SelectionStrategy::Balanced).await;

        chain.set_nonce(addresses[0], 3);
        pool.mark_divergence(addresses[0]).await.unwrap();

        let snapshot = pool.snapshot().await;
        let info = &snapshot[0];
        assert_eq!(info.state, WalletState::Idle);
        assert_eq!(info.local_nonce, 3);
    }

    #[tokio::test]
    async fn test_dropped_lease_settles_as_failure() {
        let (pool, _, _, _) = pool_with_wallets(1, SelectionStrategy::Balanced).await;

        let lease = pool.acquire(JobId::new_v4()).await.unwrap();
        drop(lease);

        // The drop guard returns the wallet on the next critical section
        assert_eq!(pool.outstanding_leases().await, 0);
        let snapshot = pool.snapshot().await;
        let info = &snapshot[0];
        assert_eq!(info.state, WalletState::Idle);
        assert_eq!(info.failed_submissions, 1);
    }

    #[tokio::test]
    async fn test_lease_accounting_matches_pending() {
        let (pool, _, _, _) = pool_with_wallets(3, SelectionStrategy::Balanced).await;

        let a = pool.acquire(JobId::new_v4()).await.unwrap();
        let b = pool.acquire(JobId::new_v4()).await.unwrap();
        assert_eq!(pool.outstanding_leases().await, 2);

        pool.release(a, LeaseOutcome::Success { gas_used: 0 }).await;
        assert_eq!(pool.outstanding_leases().await, 1);
        pool.release(b, LeaseOutcome::Failure).await;
        assert_eq!(pool.outstanding_leases().await, 0);
    }

    #[tokio::test]
    async fn test_register_initialises_from_chain() {
        let chain = Arc::new(MockChain::new());
        let clock = MockTimeSource::new(0);
        let pool = WalletPool::new(
            chain.clone(),
            Arc::new(clock.clone()),
            U256::zero(),
            SelectionStrategy::Balanced,
        );

        let signer = RelayerKeyPair::generate();
        let address = signer.address();
        chain.set_nonce(address, 42);
        chain.set_balance(address, U256::from(777u64));

        pool.register(signer).await.unwrap();
        let snapshot = pool.snapshot().await;
        let info = &snapshot[0];
        assert_eq!(info.local_nonce, 42);
        assert_eq!(info.balance, U256::from(777u64));
    }
}
