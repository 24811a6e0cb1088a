//! Status persistence and fanout.

use dashmap::DashMap;
use relay_store::{keys, KvStore, StoreError};
use shared_types::{JobId, StatusRecord};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Per-job broadcast buffer. Slow subscribers beyond this lag lose
/// records instead of blocking the pipeline.
const FANOUT_BUFFER: usize = 64;

/// Writes status records to the store and fans them out to subscribers.
///
/// Writes are monotonic per job: a record for a job that already has a
/// terminal status is dropped, so an out-of-order write after a crash
/// can never resurrect a finished job.
pub struct StatusPublisher {
    store: Arc<dyn KvStore>,
    ttl: Duration,
    subscribers: DashMap<JobId, broadcast::Sender<StatusRecord>>,
}

impl StatusPublisher {
    /// Creates a publisher whose records live for `ttl`.
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { store, ttl, subscribers: DashMap::new() }
    }

    /// Persists a status record and notifies subscribers.
    pub async fn publish(&self, record: StatusRecord) -> Result<(), StoreError> {
        if let Some(existing) = self.get(&record.job_id).await? {
            if existing.status.is_terminal() && !record.status.is_terminal() {
                debug!(
                    job_id = %record.job_id,
                    existing = %existing.status,
                    attempted = %record.status,
                    "dropping non-terminal status write over terminal record"
                );
                return Ok(());
            }
        }

        let encoded = serde_json::to_string(&record)
            .map_err(|e| StoreError::Backend(format!("encode status: {e}")))?;
        self.store.set(&keys::job_status(&record.job_id), &encoded, Some(self.ttl)).await?;

        // Fanout is best-effort: no subscriber, or a lagging one, never
        // blocks the pipeline.
        if let Some(sender) = self.subscribers.get(&record.job_id) {
            let _ = sender.send(record.clone());
        }
        if record.status.is_terminal() {
            self.subscribers.remove_if(&record.job_id, |_, s| s.receiver_count() == 0);
        }
        Ok(())
    }

    /// Current status record for a job, if one exists.
    pub async fn get(&self, job_id: &JobId) -> Result<Option<StatusRecord>, StoreError> {
        match self.store.get(&keys::job_status(job_id)).await? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(record) => Ok(Some(record)),
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "corrupt status record");
                    Err(StoreError::Corrupt { key: keys::job_status(job_id) })
                }
            },
            None => Ok(None),
        }
    }

    /// Subscribes to future status records for a job.
    pub fn subscribe(&self, job_id: JobId) -> broadcast::Receiver<StatusRecord> {
        self.subscribers
            .entry(job_id)
            .or_insert_with(|| broadcast::channel(FANOUT_BUFFER).0)
            .subscribe()
    }

    /// Number of jobs with at least one subscriber.
    pub fn subscribed_jobs(&self) -> usize {
        self.subscribers.len()
    }
}
