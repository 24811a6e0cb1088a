//! Worker pool lifecycle.

use crate::worker::{worker_loop, WorkerCtx};
use dashmap::DashMap;
use relay_lifecycle::{Lifecycle, StatusPublisher};
use relay_queue::JobQueue;
use relay_store::AuditLog;
use relay_wallet::WalletPool;
use shared_types::{JobId, RelayerConfig, TimeSource};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Live scheduler counters for the operator surface.
#[derive(Debug, Clone)]
pub struct SchedulerStats {
    /// Jobs currently between pop and settlement.
    pub in_flight: usize,
    /// Configured worker count.
    pub max_concurrent: usize,
    /// Ids of the in-flight jobs.
    pub in_flight_ids: Vec<JobId>,
}

/// Owns the worker tasks.
pub struct Scheduler {
    ctx: Arc<WorkerCtx>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    /// Wires the scheduler over its collaborators. Workers observe
    /// `cancel`; cancelling it (directly or via [`shutdown`]) stops the
    /// pool.
    ///
    /// [`shutdown`]: Scheduler::shutdown
    pub fn new(
        config: Arc<RelayerConfig>,
        queue: Arc<JobQueue>,
        wallets: Arc<WalletPool>,
        lifecycle: Arc<Lifecycle>,
        status: Arc<StatusPublisher>,
        audit: Arc<dyn AuditLog>,
        time: Arc<dyn TimeSource>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            ctx: Arc::new(WorkerCtx {
                config,
                queue,
                wallets,
                lifecycle,
                status,
                audit,
                time,
                cancel,
                in_flight: DashMap::new(),
            }),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawns the worker tasks. Idempotent only in the sense that it
    /// must be called once; callers hold the scheduler behind an `Arc`.
    pub fn start(&self) {
        let count = self.ctx.config.scheduler.max_concurrent;
        let mut handles = self.handles.lock().expect("scheduler handle lock");
        for worker_id in 0..count {
            handles.push(tokio::spawn(worker_loop(self.ctx.clone(), worker_id)));
        }
        info!(workers = count, "scheduler started");
    }

    /// Cancels the workers and waits for them to settle.
    ///
    /// Every worker finishes its current await point; jobs that did not
    /// reach a terminal state are back in the queue. Returns once the
    /// wallet pool reports all leases released, or at the hard grace
    /// deadline.
    pub async fn shutdown(&self) {
        self.ctx.cancel.cancel();

        let grace = Duration::from_secs(self.ctx.config.scheduler.shutdown_grace_secs);
        let deadline = tokio::time::Instant::now() + grace;

        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self.handles.lock().expect("scheduler handle lock");
            guard.drain(..).collect()
        };
        for handle in handles {
            let remaining = deadline
                .saturating_duration_since(tokio::time::Instant::now());
            if tokio::time::timeout(remaining, handle).await.is_err() {
                warn!("worker did not stop within the grace period");
            }
        }

        while self.ctx.wallets.outstanding_leases().await > 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!("wallet leases still outstanding at the hard deadline");
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        info!("scheduler stopped");
    }

    /// Live counters.
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            in_flight: self.ctx.in_flight.len(),
            max_concurrent: self.ctx.config.scheduler.max_concurrent,
            in_flight_ids: self.ctx.in_flight.iter().map(|e| *e.key()).collect(),
        }
    }
}
