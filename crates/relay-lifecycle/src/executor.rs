//! The lifecycle executor.

use crate::rollback::{RollbackManager, RollbackOutcome};
use crate::status::StatusPublisher;
use relay_chain::{derive_fee, ChainAdapter, ChainError, ErrorClass, PaymentTx, SignedPaymentTx};
use relay_store::{keys, AuditEvent, AuditLog, KvStore};
use relay_wallet::WalletLease;
use shared_types::{Job, JobOutcome, JobStatus, RelayerConfig, StatusRecord, TimeSource};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Drives one job from `leased` to an outcome.
///
/// The executor sees the wallet only through its lease capability; the
/// scheduler owns the lease and returns it to the pool afterwards with
/// the outcome the executor reports.
pub struct Lifecycle {
    config: Arc<RelayerConfig>,
    chain: Arc<dyn ChainAdapter>,
    store: Arc<dyn KvStore>,
    status: Arc<StatusPublisher>,
    rollback: RollbackManager,
    audit: Arc<dyn AuditLog>,
    time: Arc<dyn TimeSource>,
}

impl Lifecycle {
    /// Wires the executor over its collaborators.
    pub fn new(
        config: Arc<RelayerConfig>,
        chain: Arc<dyn ChainAdapter>,
        store: Arc<dyn KvStore>,
        status: Arc<StatusPublisher>,
        rollback: RollbackManager,
        audit: Arc<dyn AuditLog>,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        Self { config, chain, store, status, rollback, audit, time }
    }

    /// Builds, signs, submits, and confirms the job's transaction.
    ///
    /// Mutates the job in place through its status transitions and
    /// persists each one. The caller handles the outcome: re-enqueue on
    /// `Retry`, nothing further on `Confirmed`/`Failed` (rollback has
    /// already been applied here).
    pub async fn run(&self, job: &mut Job, lease: &WalletLease) -> JobOutcome {
        // Fee derivation from the live suggestion. The lease has already
        // reserved a nonce, so failures before the chain accepts the
        // transaction leave that nonce unconsumed and force a re-sync.
        let suggestion = match self.chain.suggest_fees().await {
            Ok(suggestion) => suggestion,
            Err(e) => return self.settle_chain_error(job, e, "fee suggestion", true).await,
        };
        let fees = derive_fee(suggestion, &self.config.gas);

        // Build and sign against the lease's reserved nonce
        let tx = PaymentTx {
            chain_id: self.config.chain_id,
            nonce: lease.next_nonce(),
            to: job.intent.to_address,
            value: job.intent.amount,
            gas_limit: self.config.gas.gas_limit,
            fees,
        };
        let signature = match lease.sign_digest(&tx.signing_digest()) {
            Ok(signature) => signature,
            Err(e) => return self.fail_and_rollback(job, format!("signing failed: {e}")).await,
        };
        let signed = SignedPaymentTx { tx, from: lease.address(), signature };
        let intended = signed.hash();

        // Record the intended hash before the send: a crash past this
        // point resubmits the identical payload and treats the chain's
        // "already known" as its own success.
        job.status = JobStatus::Submitted;
        job.tx_hash = Some(intended);
        job.assigned_wallet = Some(lease.address());
        self.persist_and_publish(job).await;

        match self.chain.send_raw(&signed).await {
            Ok(hash) => {
                if hash != intended {
                    job.tx_hash = Some(hash);
                    self.persist_and_publish(job).await;
                }
                debug!(job_id = %job.job_id, tx_hash = %hash, "transaction submitted");
            }
            Err(ChainError::Duplicate) => {
                debug!(job_id = %job.job_id, tx_hash = %intended, "transaction already known, awaiting confirmation");
            }
            Err(e) => return self.settle_chain_error(job, e, "submission", true).await,
        }

        self.audit
            .append(AuditEvent {
                ts: self.time.now_ms(),
                subject: job.job_id.to_string(),
                kind: "tx_submitted".into(),
                data: serde_json::json!({
                    "tx_hash": intended.to_hex(),
                    "wallet": lease.address().to_hex(),
                    "nonce": lease.next_nonce(),
                    "attempt": job.attempt,
                }),
            })
            .await;

        let tx_hash = job.tx_hash.unwrap_or(intended);
        match self.chain.wait_confirmation(tx_hash, self.config.gas.confirmation_blocks).await {
            Ok(receipt) => {
                job.status = JobStatus::Confirmed;
                job.block_number = Some(receipt.block_number);
                job.gas_used = Some(receipt.gas_used);
                job.last_error = None;
                self.persist_and_publish(job).await;

                // The debit stands: drop the rollback point unapplied
                if let Err(e) = self.rollback.discard(&job.job_id).await {
                    warn!(job_id = %job.job_id, error = %e, "failed to discard rollback point");
                }

                info!(
                    job_id = %job.job_id,
                    tx_hash = %tx_hash,
                    block = receipt.block_number,
                    "transaction confirmed"
                );
                self.audit
                    .append(AuditEvent {
                        ts: self.time.now_ms(),
                        subject: job.job_id.to_string(),
                        kind: "tx_confirmed".into(),
                        data: serde_json::json!({
                            "tx_hash": tx_hash.to_hex(),
                            "block_number": receipt.block_number,
                            "gas_used": receipt.gas_used,
                        }),
                    })
                    .await;

                JobOutcome::Confirmed {
                    tx_hash,
                    block_number: receipt.block_number,
                    gas_used: receipt.gas_used,
                }
            }
            Err(e) => self.settle_chain_error(job, e, "confirmation", false).await,
        }
    }

    /// Terminal failure entry point for conditions detected outside the
    /// executor (the scheduler's processing timeout at the last
    /// attempt). Applies the same `failed → rolled_back` path as a
    /// permanent chain error.
    pub async fn fail(&self, job: &mut Job, reason: String) -> JobOutcome {
        self.fail_and_rollback(job, reason).await
    }

    /// Classifies a chain error into the job's outcome, honouring the
    /// attempt budget.
    ///
    /// `nonce_unconsumed` marks failures where the chain never accepted
    /// the transaction: the lease's reserved nonce is now a gap and the
    /// wallet needs a re-sync regardless of the error kind.
    async fn settle_chain_error(
        &self,
        job: &mut Job,
        error: ChainError,
        stage: &str,
        nonce_unconsumed: bool,
    ) -> JobOutcome {
        let reason = format!("{stage}: {error}");
        job.last_error = Some(reason.clone());

        if let ChainError::Unknown(_) = &error {
            // Conservative class; flag for operator attention
            self.audit
                .append(AuditEvent {
                    ts: self.time.now_ms(),
                    subject: job.job_id.to_string(),
                    kind: "unclassified_chain_error".into(),
                    data: serde_json::json!({ "error": error.to_string(), "stage": stage }),
                })
                .await;
        }

        match error.class() {
            ErrorClass::Permanent => self.fail_and_rollback(job, reason).await,
            ErrorClass::Transient | ErrorClass::WalletState => {
                if job.attempt + 1 >= self.config.queue.max_attempts {
                    let exhausted = format!("retries exhausted: {reason}");
                    self.fail_and_rollback(job, exhausted).await
                } else {
                    debug!(
                        job_id = %job.job_id,
                        attempt = job.attempt,
                        reason = %reason,
                        "transient failure, will retry"
                    );
                    JobOutcome::Retry {
                        reason,
                        wallet_divergence: nonce_unconsumed || error.is_nonce_divergence(),
                    }
                }
            }
        }
    }

    /// Terminal failure path: `failed`, apply the compensating credit,
    /// then `rolled_back`.
    async fn fail_and_rollback(&self, job: &mut Job, reason: String) -> JobOutcome {
        job.status = JobStatus::Failed;
        job.last_error = Some(reason.clone());
        self.persist_and_publish(job).await;

        match self.rollback.apply(&job.job_id).await {
            Ok(RollbackOutcome::Applied { .. }) => {
                job.status = JobStatus::RolledBack;
                self.persist_and_publish(job).await;
            }
            Ok(RollbackOutcome::NotFound) => {
                // Nothing to compensate (already consumed); stay failed
                warn!(job_id = %job.job_id, "no rollback point to apply");
            }
            Err(e) => {
                error!(job_id = %job.job_id, error = %e, "rollback failed, job left failed");
            }
        }

        warn!(job_id = %job.job_id, reason = %reason, "job failed");
        self.audit
            .append(AuditEvent {
                ts: self.time.now_ms(),
                subject: job.job_id.to_string(),
                kind: "job_failed".into(),
                data: serde_json::json!({ "reason": reason, "attempt": job.attempt }),
            })
            .await;

        JobOutcome::Failed { reason }
    }

    /// Persists the job record and publishes its status. Store faults
    /// here are logged, not propagated: the in-memory state machine
    /// stays authoritative for the current run.
    async fn persist_and_publish(&self, job: &Job) {
        let now = self.time.now_ms();
        let ttl = Duration::from_secs(self.config.admission.status_ttl_secs);

        match serde_json::to_string(job) {
            Ok(encoded) => {
                if let Err(e) = self.store.set(&keys::job(&job.job_id), &encoded, Some(ttl)).await
                {
                    error!(job_id = %job.job_id, error = %e, "failed to persist job record");
                }
            }
            Err(e) => error!(job_id = %job.job_id, error = %e, "failed to encode job record"),
        }

        if let Err(e) = self.status.publish(StatusRecord::from_job(job, now)).await {
            error!(job_id = %job.job_id, error = %e, "failed to publish status");
        }
    }
}
