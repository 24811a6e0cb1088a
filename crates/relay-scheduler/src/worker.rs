//! The worker loop.

use dashmap::DashMap;
use relay_lifecycle::{Lifecycle, StatusPublisher};
use relay_queue::JobQueue;
use relay_store::{AuditEvent, AuditLog};
use relay_wallet::WalletPool;
use shared_types::{
    Address, Job, JobId, JobOutcome, JobStatus, LeaseOutcome, RelayerConfig, StatusRecord,
    TimeSource,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Everything a worker needs, shared across the pool.
pub(crate) struct WorkerCtx {
    pub config: Arc<RelayerConfig>,
    pub queue: Arc<JobQueue>,
    pub wallets: Arc<WalletPool>,
    pub lifecycle: Arc<Lifecycle>,
    pub status: Arc<StatusPublisher>,
    pub audit: Arc<dyn AuditLog>,
    pub time: Arc<dyn TimeSource>,
    pub cancel: CancellationToken,
    pub in_flight: DashMap<JobId, ()>,
}

impl WorkerCtx {
    async fn idle_sleep(&self) {
        let pause = Duration::from_millis(self.config.scheduler.idle_poll_ms);
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(pause) => {}
        }
    }

    /// Publishes the job's current state, logging instead of failing.
    async fn publish(&self, job: &Job) {
        if let Err(e) = self.status.publish(StatusRecord::from_job(job, self.time.now_ms())).await
        {
            error!(job_id = %job.job_id, error = %e, "status publish failed");
        }
    }

    /// Drains a wallet for nonce re-sync and records the transition.
    async fn drain_wallet(&self, wallet: Address, job_id: JobId, cause: &str) {
        if let Err(e) = self.wallets.mark_divergence(wallet).await {
            error!(wallet = %wallet, error = %e, "failed to drain wallet for re-sync");
            return;
        }
        self.audit
            .append(AuditEvent {
                ts: self.time.now_ms(),
                subject: wallet.to_hex(),
                kind: "wallet_draining".into(),
                data: serde_json::json!({ "cause": cause, "job_id": job_id.to_string() }),
            })
            .await;
    }
}

/// Runs one worker until cancellation.
pub(crate) async fn worker_loop(ctx: Arc<WorkerCtx>, worker_id: usize) {
    debug!(worker_id, "worker started");

    while !ctx.cancel.is_cancelled() {
        let popped = tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            popped = ctx.queue.pop() => popped,
        };

        match popped {
            Ok(Some(job)) => process_job(&ctx, job).await,
            Ok(None) => ctx.idle_sleep().await,
            Err(e) => {
                warn!(worker_id, error = %e, "queue pop failed");
                ctx.idle_sleep().await;
            }
        }
    }

    debug!(worker_id, "worker stopped");
}

/// Drives one popped job to its next settlement.
async fn process_job(ctx: &Arc<WorkerCtx>, mut job: Job) {
    ctx.in_flight.insert(job.job_id, ());

    let Some(lease) = ctx.wallets.acquire(job.job_id).await else {
        // No wallet passes the policy right now. The job keeps its
        // place; back off briefly so this does not spin.
        debug!(job_id = %job.job_id, "no wallet available, requeueing");
        if let Err(e) = ctx.queue.requeue(&mut job).await {
            error!(job_id = %job.job_id, error = %e, "requeue failed");
        }
        ctx.in_flight.remove(&job.job_id);
        ctx.idle_sleep().await;
        return;
    };

    job.status = JobStatus::Leased;
    job.assigned_wallet = Some(lease.address());
    if let Err(e) = ctx.queue.persist_job(&job).await {
        error!(job_id = %job.job_id, error = %e, "failed to persist leased job");
    }
    ctx.publish(&job).await;

    let timeout = ctx.config.scheduler.processing_timeout();
    let run = tokio::select! {
        _ = ctx.cancel.cancelled() => None,
        run = tokio::time::timeout(timeout, ctx.lifecycle.run(&mut job, &lease)) => Some(run),
    };

    match run {
        // Shutdown interrupted the job before a terminal state: return
        // the wallet and put the job back at its original priority.
        None => {
            info!(job_id = %job.job_id, "shutdown during processing, requeueing job");
            ctx.wallets.release(lease, LeaseOutcome::Failure).await;
            if let Err(e) = ctx.queue.requeue(&mut job).await {
                error!(job_id = %job.job_id, error = %e, "requeue on shutdown failed");
            }
            ctx.publish(&job).await;
        }

        // Processing timeout: a transient outcome by definition, with
        // the usual attempt budget.
        Some(Err(_elapsed)) => {
            warn!(job_id = %job.job_id, attempt = job.attempt, "processing timeout");
            let wallet = lease.address();
            ctx.wallets.release(lease, LeaseOutcome::Failure).await;
            // The run was cut off mid-flight; whether the nonce was
            // consumed is unknown, so re-sync from the chain.
            ctx.drain_wallet(wallet, job.job_id, "processing_timeout").await;
            if job.attempt + 1 >= ctx.config.queue.max_attempts {
                ctx.lifecycle.fail(&mut job, "processing timeout".into()).await;
            } else {
                job.attempt += 1;
                job.last_error = Some("processing timeout".into());
                if let Err(e) = ctx.queue.schedule_retry(&mut job).await {
                    error!(job_id = %job.job_id, error = %e, "retry scheduling failed");
                }
                ctx.publish(&job).await;
            }
        }

        Some(Ok(outcome)) => settle_outcome(ctx, &mut job, lease, outcome).await,
    }

    ctx.in_flight.remove(&job.job_id);
}

async fn settle_outcome(
    ctx: &Arc<WorkerCtx>,
    job: &mut Job,
    lease: relay_wallet::WalletLease,
    outcome: JobOutcome,
) {
    match outcome {
        JobOutcome::Confirmed { gas_used, .. } => {
            ctx.wallets.release(lease, LeaseOutcome::Success { gas_used }).await;
        }

        JobOutcome::Retry { reason, wallet_divergence } => {
            let wallet = lease.address();
            ctx.wallets.release(lease, LeaseOutcome::Failure).await;
            if wallet_divergence {
                ctx.drain_wallet(wallet, job.job_id, "nonce_divergence").await;
            }

            job.attempt += 1;
            job.last_error = Some(reason);
            if let Err(e) = ctx.queue.schedule_retry(job).await {
                error!(job_id = %job.job_id, error = %e, "retry scheduling failed");
            }
            ctx.publish(job).await;
        }

        // Rollback already applied inside the lifecycle. The wallet
        // re-syncs its nonce in case the failed attempt left a gap.
        JobOutcome::Failed { .. } => {
            let wallet = lease.address();
            ctx.wallets.release(lease, LeaseOutcome::Failure).await;
            ctx.drain_wallet(wallet, job.job_id, "job_failed").await;
        }
    }
}
