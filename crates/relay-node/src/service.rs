//! The relayer service facade.

use relay_admission::{AdmissionError, AdmissionGate, PrepaidLedger, ReplayStats};
use relay_chain::ChainAdapter;
use relay_lifecycle::{startup_sweep, Lifecycle, RollbackManager, RollbackOutcome, StatusPublisher};
use relay_queue::{JobQueue, QueueError};
use relay_scheduler::Scheduler;
use relay_store::{keys, AuditEvent, AuditLog, KvStore, StoreError};
use relay_wallet::{run_balance_monitor, PoolStats, SelectionStrategy, WalletPool};
use shared_crypto::RelayerKeyPair;
use shared_types::{
    Address, ClientId, ConfigError, Job, JobId, JobStatus, PaymentIntent, Priority,
    RelayerConfig, StatusRecord, TimeSource, U256, WalletInfo,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Service construction or startup failure.
#[derive(Debug, Error)]
pub enum RelayerError {
    /// The configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A configured wallet key is unusable.
    #[error("wallet key #{index}: {source}")]
    WalletKey {
        /// Position in `wallet.keys`.
        index: usize,
        /// Underlying crypto error.
        #[source]
        source: shared_crypto::CryptoError,
    },

    /// A wallet could not be registered against the chain.
    #[error(transparent)]
    Wallet(#[from] relay_wallet::WalletError),

    /// The store failed during startup.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Snapshot returned by [`Relayer::get_queue_status`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueueStatus {
    /// Backlog depth per priority class, dispatch order.
    pub queued_by_priority: Vec<(Priority, u64)>,
    /// Queued jobs whose backoff gate has opened.
    pub visible: u64,
    /// Jobs currently between pop and settlement.
    pub in_flight: usize,
    /// Configured worker count.
    pub max_concurrent: usize,
    /// Ids of the in-flight jobs.
    pub in_flight_ids: Vec<JobId>,
}

/// Result of the privileged [`Relayer::force_rollback`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForceRollback {
    /// The compensating credit was applied and the job is `rolled_back`.
    Applied {
        /// Amount restored to the client.
        amount: U256,
    },
    /// The job is not in a rollback-eligible state.
    NotApplicable {
        /// Why the rollback was refused.
        reason: String,
    },
}

/// The assembled relayer core.
///
/// Construction wires the components over the injected store, chain
/// adapter, and audit log; [`start`](Relayer::start) brings up the
/// background tasks; [`shutdown`](Relayer::shutdown) drains them.
pub struct Relayer {
    config: Arc<RelayerConfig>,
    store: Arc<dyn KvStore>,
    queue: Arc<JobQueue>,
    wallets: Arc<WalletPool>,
    gate: AdmissionGate,
    ledger: PrepaidLedger,
    status: Arc<StatusPublisher>,
    rollback: RollbackManager,
    scheduler: Scheduler,
    audit: Arc<dyn AuditLog>,
    time: Arc<dyn TimeSource>,
    cancel: CancellationToken,
    monitor: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Relayer {
    /// Builds the core and registers the configured wallets (each one
    /// syncs its nonce and balance from the chain).
    pub async fn new(
        config: RelayerConfig,
        store: Arc<dyn KvStore>,
        chain: Arc<dyn ChainAdapter>,
        audit: Arc<dyn AuditLog>,
        time: Arc<dyn TimeSource>,
    ) -> Result<Self, RelayerError> {
        config.validate()?;
        let config = Arc::new(config);

        let status_ttl = Duration::from_secs(config.admission.status_ttl_secs);
        let prepaid_ttl = Duration::from_secs(config.admission.prepaid_ttl_secs);

        let queue = Arc::new(JobQueue::new(
            store.clone(),
            time.clone(),
            config.queue.clone(),
            status_ttl,
        ));
        let ledger = PrepaidLedger::new(store.clone(), prepaid_ttl);
        let status = Arc::new(StatusPublisher::new(store.clone(), status_ttl));
        let rollback =
            RollbackManager::new(store.clone(), audit.clone(), time.clone(), prepaid_ttl);

        let wallets = Arc::new(WalletPool::new(
            chain.clone(),
            time.clone(),
            config.wallet.min_balance_threshold,
            SelectionStrategy::Balanced,
        ));
        for (index, raw_key) in config.wallet.keys.iter().enumerate() {
            let signer = RelayerKeyPair::from_hex(raw_key)
                .map_err(|source| RelayerError::WalletKey { index, source })?;
            wallets.register(signer).await?;
        }

        let lifecycle = Arc::new(Lifecycle::new(
            config.clone(),
            chain.clone(),
            store.clone(),
            status.clone(),
            rollback.clone(),
            audit.clone(),
            time.clone(),
        ));

        let gate = AdmissionGate::new(
            config.clone(),
            store.clone(),
            chain,
            queue.clone(),
            ledger.clone(),
            audit.clone(),
            time.clone(),
        );

        let cancel = CancellationToken::new();
        let scheduler = Scheduler::new(
            config.clone(),
            queue.clone(),
            wallets.clone(),
            lifecycle,
            status.clone(),
            audit.clone(),
            time.clone(),
            cancel.child_token(),
        );

        Ok(Self {
            config,
            store,
            queue,
            wallets,
            gate,
            ledger,
            status,
            rollback,
            scheduler,
            audit,
            time,
            cancel,
            monitor: std::sync::Mutex::new(None),
        })
    }

    /// Runs the boot sweep, then starts the balance monitor and the
    /// worker pool.
    pub async fn start(&self) -> Result<(), RelayerError> {
        let applied = startup_sweep(self.store.clone(), &self.rollback).await?;
        if applied > 0 {
            info!(applied, "boot sweep settled orphaned debits");
        }
        self.persist_wallet_meta().await;

        let interval = Duration::from_secs(self.config.wallet.balance_poll_interval_secs);
        let handle = tokio::spawn(run_balance_monitor(
            self.wallets.clone(),
            interval,
            self.cancel.child_token(),
        ));
        *self.monitor.lock().expect("monitor handle lock") = Some(handle);

        self.scheduler.start();
        info!("relayer started");
        Ok(())
    }

    /// Cancels everything and waits for workers and leases to settle
    /// (bounded by the shutdown grace deadline).
    pub async fn shutdown(&self) {
        info!("relayer shutting down");
        self.cancel.cancel();
        self.scheduler.shutdown().await;
        if let Some(handle) = self.monitor.lock().expect("monitor handle lock").take() {
            let _ = handle.await;
        }
        info!("relayer stopped");
    }

    // -------------------------------------------------------------------------
    // Public operation surface (called by the HTTP layer)
    // -------------------------------------------------------------------------

    /// Admits a signed intent; returns the job id or a structured
    /// reject.
    pub async fn submit_intent(&self, intent: PaymentIntent) -> Result<JobId, AdmissionError> {
        self.gate.admit(intent).await
    }

    /// Latest status record for a job, if any exists (records expire
    /// after the status TTL).
    pub async fn get_job_status(
        &self,
        job_id: &JobId,
    ) -> Result<Option<StatusRecord>, StoreError> {
        self.status.get(job_id).await
    }

    /// Queue depths plus in-flight occupancy.
    pub async fn get_queue_status(&self) -> Result<QueueStatus, QueueError> {
        let queued_by_priority = self.queue.size_by_priority().await?;
        let visible = self.queue.visible_len().await?;
        let stats = self.scheduler.stats();
        Ok(QueueStatus {
            queued_by_priority,
            visible,
            in_flight: stats.in_flight,
            max_concurrent: stats.max_concurrent,
            in_flight_ids: stats.in_flight_ids,
        })
    }

    /// Wallet snapshots. Key material never appears here.
    pub async fn list_wallets(&self) -> Vec<WalletInfo> {
        self.wallets.snapshot().await
    }

    /// Aggregate wallet pool counters.
    pub async fn wallet_stats(&self) -> PoolStats {
        self.wallets.stats().await
    }

    /// Replay guard counters.
    pub fn replay_stats(&self) -> ReplayStats {
        self.gate.replay_stats()
    }

    /// Adds prepaid funds for a client. Returns the new balance.
    pub async fn credit_prepaid(
        &self,
        client_id: &ClientId,
        amount: U256,
    ) -> Result<U256, StoreError> {
        let balance = self.ledger.credit(client_id, amount).await?;
        info!(client_id = %client_id, amount = %amount, balance = %balance, "prepaid credited");
        Ok(balance)
    }

    /// Current prepaid balance for a client.
    pub async fn get_prepaid_balance(&self, client_id: &ClientId) -> Result<U256, StoreError> {
        self.ledger.balance(client_id).await
    }

    /// Privileged escape hatch: applies the compensating credit for a
    /// job stuck in `failed` whose rollback point was never consumed.
    /// Any other state is refused.
    pub async fn force_rollback(&self, job_id: &JobId) -> Result<ForceRollback, StoreError> {
        let Some(raw) = self.store.get(&keys::job(job_id)).await? else {
            return Ok(ForceRollback::NotApplicable { reason: "job record not found".into() });
        };
        let mut job: Job = serde_json::from_str(&raw)
            .map_err(|_| StoreError::Corrupt { key: keys::job(job_id) })?;

        if job.status != JobStatus::Failed {
            return Ok(ForceRollback::NotApplicable {
                reason: format!("job is {}, only failed jobs are eligible", job.status),
            });
        }

        match self.rollback.apply(job_id).await? {
            RollbackOutcome::Applied { amount, .. } => {
                job.status = JobStatus::RolledBack;
                if let Err(e) = self.queue.persist_job(&job).await {
                    warn!(job_id = %job_id, error = %e, "failed to persist forced rollback");
                }
                let now = self.time.now_ms();
                if let Err(e) = self.status.publish(StatusRecord::from_job(&job, now)).await {
                    warn!(job_id = %job_id, error = %e, "failed to publish forced rollback");
                }
                Ok(ForceRollback::Applied { amount })
            }
            RollbackOutcome::NotFound => Ok(ForceRollback::NotApplicable {
                reason: "rollback already applied or expired".into(),
            }),
        }
    }

    /// Live status stream for a job. The subscriber receives every
    /// future transition; a lagging subscriber drops records rather
    /// than blocking the pipeline.
    pub fn subscribe_status(&self, job_id: JobId) -> broadcast::Receiver<StatusRecord> {
        self.status.subscribe(job_id)
    }

    /// Operator wallet disable.
    pub async fn disable_wallet(
        &self,
        address: Address,
        reason: &str,
    ) -> Result<(), relay_wallet::WalletError> {
        self.wallets.disable(address, reason).await?;
        self.persist_wallet_meta().await;
        self.audit
            .append(AuditEvent {
                ts: self.time.now_ms(),
                subject: address.to_hex(),
                kind: "wallet_disabled".into(),
                data: serde_json::json!({ "reason": reason }),
            })
            .await;
        Ok(())
    }

    /// Operator wallet re-enable.
    pub async fn enable_wallet(&self, address: Address) -> Result<(), relay_wallet::WalletError> {
        self.wallets.enable(address).await?;
        self.persist_wallet_meta().await;
        self.audit
            .append(AuditEvent {
                ts: self.time.now_ms(),
                subject: address.to_hex(),
                kind: "wallet_enabled".into(),
                data: serde_json::json!({}),
            })
            .await;
        Ok(())
    }

    /// Mirrors wallet snapshots into `wallet_meta:{address}` so
    /// operators can inspect the pool through the store. Informational:
    /// the pool itself re-initialises from the chain at startup.
    async fn persist_wallet_meta(&self) {
        for info in self.wallets.snapshot().await {
            match serde_json::to_string(&info) {
                Ok(encoded) => {
                    if let Err(e) =
                        self.store.set(&keys::wallet_meta(&info.address), &encoded, None).await
                    {
                        warn!(wallet = %info.address, error = %e, "failed to persist wallet metadata");
                    }
                }
                Err(e) => warn!(wallet = %info.address, error = %e, "failed to encode wallet metadata"),
            }
        }
    }
}
