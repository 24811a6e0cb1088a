//! The durable priority queue.

use crate::backoff::retry_delay;
use relay_store::{keys, KvStore, StoreError};
use serde::Serialize;
use shared_types::config::QueueConfig;
use shared_types::{Job, JobId, JobStatus, Priority, TimeSource};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Queue operation failure.
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    /// The queue is at `max_queue_size`; admission must back off.
    #[error("queue is full ({capacity} jobs)")]
    Full {
        /// Configured capacity.
        capacity: usize,
    },

    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Queue depth and lifetime counters.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    /// Backlog depth per priority class, dispatch order.
    pub depth_by_priority: Vec<(Priority, u64)>,
    /// Total backlog across classes (visible or not).
    pub total_depth: u64,
    /// Lifetime enqueues (admissions, not retries).
    pub enqueued_total: u64,
    /// Lifetime retry re-insertions.
    pub retried_total: u64,
    /// Lifetime successful pops.
    pub popped_total: u64,
}

/// Priority-ordered, kv-backed job queue.
pub struct JobQueue {
    store: Arc<dyn KvStore>,
    time: Arc<dyn TimeSource>,
    config: QueueConfig,
    /// TTL applied to persisted job records.
    job_ttl: Duration,
    enqueued_total: AtomicU64,
    retried_total: AtomicU64,
    popped_total: AtomicU64,
}

impl JobQueue {
    /// Creates a queue over the given store and clock.
    pub fn new(
        store: Arc<dyn KvStore>,
        time: Arc<dyn TimeSource>,
        config: QueueConfig,
        job_ttl: Duration,
    ) -> Self {
        Self {
            store,
            time,
            config,
            job_ttl,
            enqueued_total: AtomicU64::new(0),
            retried_total: AtomicU64::new(0),
            popped_total: AtomicU64::new(0),
        }
    }

    /// Persists a job record under its key.
    pub async fn persist_job(&self, job: &Job) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(job)
            .map_err(|e| StoreError::Backend(format!("encode job: {e}")))?;
        self.store.set(&keys::job(&job.job_id), &encoded, Some(self.job_ttl)).await
    }

    /// Loads a job record, if present.
    pub async fn load_job(&self, job_id: &JobId) -> Result<Option<Job>, StoreError> {
        match self.store.get(&keys::job(job_id)).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|_| StoreError::Corrupt { key: keys::job(job_id) }),
            None => Ok(None),
        }
    }

    /// Admits a freshly created job into its priority class.
    ///
    /// Fails with [`QueueError::Full`] at capacity (the admission gate
    /// compensates its side effects and surfaces `queue_full`). The job
    /// record is persisted before the id becomes poppable.
    pub async fn enqueue(&self, job: &Job) -> Result<(), QueueError> {
        let capacity = self.config.max_queue_size;
        if self.total_depth().await? >= capacity as u64 {
            return Err(QueueError::Full { capacity });
        }

        self.persist_job(job).await?;
        self.store.lpush(&keys::queue(job.priority), &job.job_id.to_string()).await?;
        self.enqueued_total.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Re-enters a job for retry at the tail of its original class.
    ///
    /// Sets the backoff visibility gate from the job's attempt counter
    /// and persists the updated record. Capacity is not checked: the job
    /// already holds its queue slot.
    pub async fn schedule_retry(&self, job: &mut Job) -> Result<(), QueueError> {
        let delay = retry_delay(&self.config, job.attempt);
        job.status = JobStatus::Queued;
        job.not_before = Some(self.time.now_ms() + delay.as_millis() as u64);
        job.assigned_wallet = None;
        // A queued job carries no submission artifacts
        job.tx_hash = None;
        job.block_number = None;
        job.gas_used = None;

        self.persist_job(job).await?;
        self.store.lpush(&keys::queue(job.priority), &job.job_id.to_string()).await?;
        self.retried_total.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Returns a job to its class without touching attempt or backoff
    /// state (shutdown requeue path).
    pub async fn requeue(&self, job: &mut Job) -> Result<(), QueueError> {
        job.status = JobStatus::Queued;
        job.assigned_wallet = None;
        job.tx_hash = None;
        job.block_number = None;
        job.gas_used = None;
        self.persist_job(job).await?;
        self.store.lpush(&keys::queue(job.priority), &job.job_id.to_string()).await?;
        Ok(())
    }

    /// Pops the oldest visible job from the highest non-empty class.
    ///
    /// Entries still inside their backoff window are skipped and restored
    /// in order; ids whose job record has vanished (TTL lapse) are
    /// dropped. Returns `None` when no class has a visible job.
    pub async fn pop(&self) -> Result<Option<Job>, QueueError> {
        let now = self.time.now_ms();

        for priority in Priority::ALL {
            let list = keys::queue(priority);
            let depth = self.store.llen(&list).await?;
            let mut skipped: Vec<String> = Vec::new();
            let mut found: Option<Job> = None;

            for _ in 0..depth {
                let Some(raw_id) = self.store.rpop(&list).await? else { break };

                let job = match raw_id.parse::<JobId>() {
                    Ok(id) => self.load_job(&id).await?,
                    Err(_) => {
                        warn!(entry = %raw_id, "dropping unparseable queue entry");
                        continue;
                    }
                };
                let Some(job) = job else {
                    warn!(job_id = %raw_id, "dropping queue entry with no job record");
                    continue;
                };

                if job.is_visible(now) {
                    found = Some(job);
                    break;
                }
                skipped.push(raw_id);
            }

            // Restore skipped entries so the oldest pops first again
            for raw_id in skipped.iter().rev() {
                self.store.rpush(&list, raw_id).await?;
            }

            if let Some(job) = found {
                self.popped_total.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(job));
            }
        }

        Ok(None)
    }

    /// Backlog depth per class.
    pub async fn size_by_priority(&self) -> Result<Vec<(Priority, u64)>, QueueError> {
        let mut sizes = Vec::with_capacity(Priority::ALL.len());
        for priority in Priority::ALL {
            sizes.push((priority, self.store.llen(&keys::queue(priority)).await?));
        }
        Ok(sizes)
    }

    /// Number of queued jobs whose backoff gate has opened.
    pub async fn visible_len(&self) -> Result<u64, QueueError> {
        let now = self.time.now_ms();
        let mut visible = 0u64;

        for priority in Priority::ALL {
            let list = keys::queue(priority);
            let depth = self.store.llen(&list).await?;
            let mut entries: Vec<String> = Vec::with_capacity(depth as usize);

            for _ in 0..depth {
                let Some(raw_id) = self.store.rpop(&list).await? else { break };
                if let Ok(id) = raw_id.parse::<JobId>() {
                    if let Some(job) = self.load_job(&id).await? {
                        if job.is_visible(now) {
                            visible += 1;
                        }
                    }
                }
                entries.push(raw_id);
            }
            // Restore the class exactly as it was
            for raw_id in entries.iter().rev() {
                self.store.rpush(&list, raw_id).await?;
            }
        }

        Ok(visible)
    }

    /// Total backlog across classes.
    pub async fn total_depth(&self) -> Result<u64, StoreError> {
        let mut total = 0u64;
        for priority in Priority::ALL {
            total += self.store.llen(&keys::queue(priority)).await?;
        }
        Ok(total)
    }

    /// Depths plus lifetime counters.
    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        let depth_by_priority = self.size_by_priority().await?;
        let total_depth = depth_by_priority.iter().map(|(_, n)| n).sum();
        Ok(QueueStats {
            depth_by_priority,
            total_depth,
            enqueued_total: self.enqueued_total.load(Ordering::Relaxed),
            retried_total: self.retried_total.load(Ordering::Relaxed),
            popped_total: self.popped_total.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_store::MemoryStore;
    use shared_types::{Address, MockTimeSource, PaymentIntent, U256};

    fn intent(priority: Priority) -> PaymentIntent {
        PaymentIntent {
            from_address: Address([0xAA; 20]),
            to_address: Address([0xBB; 20]),
            amount: U256::from(100u64),
            nonce: "n".into(),
            timestamp: 0,
            signature: [0u8; 65],
            client_id: "c".into(),
            api_key: "k".into(),
            priority,
        }
    }

    fn queue_with(config: QueueConfig) -> (JobQueue, MockTimeSource) {
        let clock = MockTimeSource::new(1_000_000);
        let store = Arc::new(MemoryStore::with_time(Arc::new(clock.clone())));
        let queue = JobQueue::new(store, Arc::new(clock.clone()), config, Duration::from_secs(3_600));
        (queue, clock)
    }

    fn job(priority: Priority, now: u64) -> Job {
        Job::new(JobId::new_v4(), intent(priority), now)
    }

    #[tokio::test]
    async fn test_fifo_within_class() {
        let (queue, clock) = queue_with(QueueConfig::default());
        let first = job(Priority::Normal, clock.now_ms());
        let second = job(Priority::Normal, clock.now_ms());

        queue.enqueue(&first).await.unwrap();
        queue.enqueue(&second).await.unwrap();

        assert_eq!(queue.pop().await.unwrap().unwrap().job_id, first.job_id);
        assert_eq!(queue.pop().await.unwrap().unwrap().job_id, second.job_id);
        assert!(queue.pop().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_strict_class_precedence() {
        let (queue, clock) = queue_with(QueueConfig::default());
        let low = job(Priority::Low, clock.now_ms());
        let urgent = job(Priority::Urgent, clock.now_ms());
        let normal = job(Priority::Normal, clock.now_ms());

        queue.enqueue(&low).await.unwrap();
        queue.enqueue(&normal).await.unwrap();
        queue.enqueue(&urgent).await.unwrap();

        assert_eq!(queue.pop().await.unwrap().unwrap().job_id, urgent.job_id);
        assert_eq!(queue.pop().await.unwrap().unwrap().job_id, normal.job_id);
        assert_eq!(queue.pop().await.unwrap().unwrap().job_id, low.job_id);
    }

    #[tokio::test]
    async fn test_capacity_boundary() {
        let config = QueueConfig { max_queue_size: 2, ..QueueConfig::default() };
        let (queue, clock) = queue_with(config);

        queue.enqueue(&job(Priority::Normal, clock.now_ms())).await.unwrap();
        // At capacity − 1: admits
        queue.enqueue(&job(Priority::High, clock.now_ms())).await.unwrap();
        // At capacity: rejects
        let result = queue.enqueue(&job(Priority::Urgent, clock.now_ms())).await;
        assert!(matches!(result, Err(QueueError::Full { capacity: 2 })));
    }

    #[tokio::test]
    async fn test_backoff_hides_job_until_due() {
        let (queue, clock) = queue_with(QueueConfig::default());
        let mut delayed = job(Priority::Normal, clock.now_ms());
        delayed.attempt = 1;
        queue.schedule_retry(&mut delayed).await.unwrap();

        // base delay 5s: invisible now
        assert!(queue.pop().await.unwrap().is_none());
        assert_eq!(queue.visible_len().await.unwrap(), 0);
        assert_eq!(queue.total_depth().await.unwrap(), 1);

        clock.advance(5_000);
        let popped = queue.pop().await.unwrap().unwrap();
        assert_eq!(popped.job_id, delayed.job_id);
    }

    #[tokio::test]
    async fn test_delayed_job_keeps_fifo_position() {
        let (queue, clock) = queue_with(QueueConfig::default());

        let mut retried = job(Priority::Normal, clock.now_ms());
        retried.attempt = 1;
        queue.schedule_retry(&mut retried).await.unwrap();

        let fresh = job(Priority::Normal, clock.now_ms());
        queue.enqueue(&fresh).await.unwrap();

        // The delayed job is skipped, the fresh one dispatches
        assert_eq!(queue.pop().await.unwrap().unwrap().job_id, fresh.job_id);

        // Once due, the retried job is still there
        clock.advance(5_000);
        assert_eq!(queue.pop().await.unwrap().unwrap().job_id, retried.job_id);
    }

    #[tokio::test]
    async fn test_retry_goes_to_tail() {
        let (queue, clock) = queue_with(QueueConfig {
            base_retry_delay_secs: 0,
            ..QueueConfig::default()
        });

        let mut retried = job(Priority::Normal, clock.now_ms());
        retried.attempt = 1;
        queue.schedule_retry(&mut retried).await.unwrap();

        let fresh = job(Priority::Normal, clock.now_ms());
        queue.enqueue(&fresh).await.unwrap();

        // Zero delay: both visible; the retried job entered first
        assert_eq!(queue.pop().await.unwrap().unwrap().job_id, retried.job_id);
        assert_eq!(queue.pop().await.unwrap().unwrap().job_id, fresh.job_id);
    }

    #[tokio::test]
    async fn test_stats_track_lifecycle() {
        let (queue, clock) = queue_with(QueueConfig::default());
        let mut item = job(Priority::High, clock.now_ms());
        queue.enqueue(&item).await.unwrap();
        queue.pop().await.unwrap().unwrap();
        item.attempt = 1;
        queue.schedule_retry(&mut item).await.unwrap();

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.enqueued_total, 1);
        assert_eq!(stats.popped_total, 1);
        assert_eq!(stats.retried_total, 1);
        assert_eq!(stats.total_depth, 1);
    }

    #[tokio::test]
    async fn test_queue_survives_restart() {
        let clock = MockTimeSource::new(1_000_000);
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::with_time(Arc::new(clock.clone())));

        let queue = JobQueue::new(
            store.clone(),
            Arc::new(clock.clone()),
            QueueConfig::default(),
            Duration::from_secs(3_600),
        );
        let item = job(Priority::Normal, clock.now_ms());
        queue.enqueue(&item).await.unwrap();
        drop(queue);

        // A new queue over the same store sees the backlog
        let revived = JobQueue::new(
            store,
            Arc::new(clock.clone()),
            QueueConfig::default(),
            Duration::from_secs(3_600),
        );
        assert_eq!(revived.pop().await.unwrap().unwrap().job_id, item.job_id);
    }
}
