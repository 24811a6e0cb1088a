//! The admission gate.

use crate::ledger::PrepaidLedger;
use crate::limiter::RateWindow;
use crate::replay::{ReplayGuard, ReplayStats};
use crate::validation::validate_intent;
use relay_chain::ChainAdapter;
use relay_queue::{JobQueue, QueueError};
use relay_store::{keys, AuditEvent, AuditLog, KvStore, StoreError};
use shared_types::{
    Job, JobId, PaymentIntent, RejectReason, RelayerConfig, RollbackPoint, StatusRecord,
    TimeSource,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Admission failure: either a structured reject for the client, or a
/// store fault the API layer surfaces as an internal error.
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// The intent was rejected; see [`RejectReason::kind`].
    #[error(transparent)]
    Rejected(#[from] RejectReason),

    /// The store failed mid-admission; side effects were compensated.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Validates inbound intents and turns them into queued jobs.
///
/// The check order is fixed and every step short-circuits. The only
/// durable side effects are the replay record (step 4) and the prepaid
/// debit + rollback point (step 7); both are compensated when a later
/// step fails.
pub struct AdmissionGate {
    config: Arc<RelayerConfig>,
    store: Arc<dyn KvStore>,
    chain: Arc<dyn ChainAdapter>,
    queue: Arc<JobQueue>,
    ledger: PrepaidLedger,
    replay: ReplayGuard,
    limiter: RateWindow,
    audit: Arc<dyn AuditLog>,
    time: Arc<dyn TimeSource>,
}

impl AdmissionGate {
    /// Wires the gate over its collaborators.
    pub fn new(
        config: Arc<RelayerConfig>,
        store: Arc<dyn KvStore>,
        chain: Arc<dyn ChainAdapter>,
        queue: Arc<JobQueue>,
        ledger: PrepaidLedger,
        audit: Arc<dyn AuditLog>,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        let replay = ReplayGuard::new(store.clone(), config.admission.replay_ttl());
        let limiter = RateWindow::new(store.clone(), config.admission.max_requests_per_minute);
        Self { config, store, chain, queue, ledger, replay, limiter, audit, time }
    }

    /// Replay guard counters for the operator surface.
    pub fn replay_stats(&self) -> ReplayStats {
        self.replay.stats()
    }

    /// Runs the admission pipeline for one intent.
    ///
    /// On success the job is persisted, enqueued, and its debit
    /// committed; the returned id can immediately be polled for status.
    pub async fn admit(&self, intent: PaymentIntent) -> Result<JobId, AdmissionError> {
        // 1. Structure
        if let Err(reject) = validate_intent(&intent) {
            return Err(self.rejected(&intent, reject).await);
        }

        // 2. Credential, constant time over every configured key
        if !self.api_key_valid(&intent.api_key) {
            return Err(self.rejected(&intent, RejectReason::BadApiKey).await);
        }

        // 3. Rate limit
        if !self.limiter.check(&intent.client_id).await? {
            let reject = RejectReason::RateLimited { limit: self.limiter.limit() };
            return Err(self.rejected(&intent, reject).await);
        }

        // 4. Freshness, then the atomic replay insert
        let now = self.time.now_ms();
        let window_ms = self.config.admission.signature_window_secs * 1_000;
        if now.abs_diff(intent.timestamp) >= window_ms {
            let reject = RejectReason::StaleTimestamp {
                window_secs: self.config.admission.signature_window_secs,
            };
            return Err(self.rejected(&intent, reject).await);
        }
        if !self.replay.try_record(&intent.from_address, &intent.nonce).await? {
            let reject = RejectReason::Replay {
                from: intent.from_address.to_hex(),
                nonce: intent.nonce.clone(),
            };
            return Err(self.rejected(&intent, reject).await);
        }

        // From here on a reject must free the replay record it just wrote.

        // 5. Signature recovery against the claimed payer
        let message = intent.canonical_message();
        let recovered =
            self.chain.verify_message(message.as_bytes(), &intent.signature).await;
        match recovered {
            Ok(signer) if signer == intent.from_address => {}
            _ => {
                self.forget_replay(&intent).await;
                return Err(self.rejected(&intent, RejectReason::BadSignature).await);
            }
        }

        // 6. Amount cap; equality admits
        if intent.amount > self.config.admission.max_transaction_amount {
            self.forget_replay(&intent).await;
            return Err(self.rejected(&intent, RejectReason::OverAmountLimit).await);
        }

        // 7. Conditional debit and its rollback point
        let job_id = JobId::new_v4();
        let reserve = intent.amount;
        match self.ledger.debit_if_covered(&intent.client_id, reserve).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                self.forget_replay(&intent).await;
                return Err(self.rejected(&intent, RejectReason::InsufficientPrepaid).await);
            }
            Err(e) => {
                self.forget_replay(&intent).await;
                return Err(e.into());
            }
        }
        if let Err(e) = self.write_rollback_point(&job_id, &intent, now).await {
            self.compensate(&job_id, &intent, reserve).await;
            return Err(e.into());
        }

        // 8. Persist and enqueue; compensate everything on failure
        let job = Job::new(job_id, intent, now);
        match self.queue.enqueue(&job).await {
            Ok(()) => {}
            Err(QueueError::Full { capacity }) => {
                debug!(capacity, "enqueue rejected by backpressure");
                self.compensate(&job_id, &job.intent, reserve).await;
                return Err(self.rejected(&job.intent, RejectReason::QueueFull).await);
            }
            Err(QueueError::Store(e)) => {
                self.compensate(&job_id, &job.intent, reserve).await;
                return Err(e.into());
            }
        }

        self.publish_queued_status(&job, now).await;

        info!(
            job_id = %job.job_id,
            client_id = %job.intent.client_id,
            priority = %job.priority,
            amount = %job.intent.amount,
            "intent admitted"
        );
        self.audit
            .append(AuditEvent {
                ts: now,
                subject: job.job_id.to_string(),
                kind: "intent_admitted".into(),
                data: serde_json::json!({
                    "client_id": job.intent.client_id,
                    "from": job.intent.from_address.to_hex(),
                    "amount": job.intent.amount.to_string(),
                    "priority": job.priority.as_str(),
                }),
            })
            .await;

        Ok(job_id)
    }

    fn api_key_valid(&self, presented: &str) -> bool {
        // Check every configured key so timing does not reveal which one
        // (if any) matched.
        let mut valid = false;
        for key in &self.config.admission.api_keys {
            valid |= shared_crypto::constant_time_compare(presented, key);
        }
        valid
    }

    async fn write_rollback_point(
        &self,
        job_id: &JobId,
        intent: &PaymentIntent,
        now: u64,
    ) -> Result<(), StoreError> {
        let point = RollbackPoint {
            client_id: intent.client_id.clone(),
            amount: intent.amount,
            created_at: now,
        };
        let encoded = serde_json::to_string(&point)
            .map_err(|e| StoreError::Backend(format!("encode rollback point: {e}")))?;
        let ttl = Duration::from_secs(self.config.admission.rollback_ttl_secs);
        self.store.set(&keys::rollback(job_id), &encoded, Some(ttl)).await
    }

    /// Undoes the debit, rollback point, and replay record after a
    /// failure between debit and enqueue.
    async fn compensate(&self, job_id: &JobId, intent: &PaymentIntent, reserve: shared_types::U256) {
        if let Err(e) = self.ledger.credit(&intent.client_id, reserve).await {
            error!(job_id = %job_id, error = %e, "failed to re-credit prepaid balance");
        }
        if let Err(e) = self.store.del(&keys::rollback(job_id)).await {
            error!(job_id = %job_id, error = %e, "failed to delete rollback point");
        }
        self.forget_replay(intent).await;
    }

    async fn forget_replay(&self, intent: &PaymentIntent) {
        if let Err(e) = self.replay.forget(&intent.from_address, &intent.nonce).await {
            error!(from = %intent.from_address, error = %e, "failed to free replay record");
        }
    }

    async fn publish_queued_status(&self, job: &Job, now: u64) {
        let record = StatusRecord::from_job(job, now);
        let ttl = Duration::from_secs(self.config.admission.status_ttl_secs);
        match serde_json::to_string(&record) {
            Ok(encoded) => {
                if let Err(e) =
                    self.store.set(&keys::job_status(&job.job_id), &encoded, Some(ttl)).await
                {
                    warn!(job_id = %job.job_id, error = %e, "failed to write initial status");
                }
            }
            Err(e) => warn!(job_id = %job.job_id, error = %e, "failed to encode initial status"),
        }
    }

    async fn rejected(&self, intent: &PaymentIntent, reject: RejectReason) -> AdmissionError {
        debug!(
            client_id = %intent.client_id,
            kind = reject.kind(),
            "intent rejected"
        );
        self.audit
            .append(AuditEvent {
                ts: self.time.now_ms(),
                subject: intent.client_id.clone(),
                kind: "intent_rejected".into(),
                data: serde_json::json!({
                    "reject": reject.kind(),
                    "from": intent.from_address.to_hex(),
                }),
            })
            .await;
        AdmissionError::Rejected(reject)
    }
}
