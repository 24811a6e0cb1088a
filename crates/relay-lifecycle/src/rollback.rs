//! Rollback point consumption.
//!
//! A rollback point is consumed exactly once per job, through the
//! store's atomic get-and-delete: either the confirming path discards it
//! (the debit stands) or the failing path applies it (compensating
//! credit). Two racing consumers cannot both observe it.

use relay_store::{keys, AuditEvent, AuditLog, KvStore, StoreError};
use shared_types::{JobId, RollbackPoint, TimeSource, U256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Result of attempting to apply a rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// The compensating credit was applied.
    Applied {
        /// Client that was re-credited.
        client_id: String,
        /// Amount restored.
        amount: U256,
        /// Balance after the credit.
        new_balance: U256,
    },
    /// No rollback point exists (already consumed, expired, or never
    /// written).
    NotFound,
}

/// Applies or discards rollback points.
#[derive(Clone)]
pub struct RollbackManager {
    store: Arc<dyn KvStore>,
    audit: Arc<dyn AuditLog>,
    time: Arc<dyn TimeSource>,
    prepaid_ttl: Duration,
}

impl RollbackManager {
    /// Creates a manager that re-credits into the prepaid namespace.
    pub fn new(
        store: Arc<dyn KvStore>,
        audit: Arc<dyn AuditLog>,
        time: Arc<dyn TimeSource>,
        prepaid_ttl: Duration,
    ) -> Self {
        Self { store, audit, time, prepaid_ttl }
    }

    /// Consumes the job's rollback point and applies the compensating
    /// credit.
    pub async fn apply(&self, job_id: &JobId) -> Result<RollbackOutcome, StoreError> {
        let Some(raw) = self.store.get_del(&keys::rollback(job_id)).await? else {
            return Ok(RollbackOutcome::NotFound);
        };

        let point: RollbackPoint = serde_json::from_str(&raw).map_err(|e| {
            warn!(job_id = %job_id, error = %e, "corrupt rollback point");
            StoreError::Corrupt { key: keys::rollback(job_id) }
        })?;

        let new_balance = self
            .store
            .credit(&keys::prepaid(&point.client_id), point.amount, Some(self.prepaid_ttl))
            .await?;

        info!(
            job_id = %job_id,
            client_id = %point.client_id,
            amount = %point.amount,
            "rollback applied, prepaid balance restored"
        );
        self.audit
            .append(AuditEvent {
                ts: self.time.now_ms(),
                subject: job_id.to_string(),
                kind: "rollback_applied".into(),
                data: serde_json::json!({
                    "client_id": point.client_id,
                    "amount": point.amount.to_string(),
                }),
            })
            .await;

        Ok(RollbackOutcome::Applied {
            client_id: point.client_id,
            amount: point.amount,
            new_balance,
        })
    }

    /// Consumes the job's rollback point without applying it: the debit
    /// stands. Returns `true` if a point was discarded.
    pub async fn discard(&self, job_id: &JobId) -> Result<bool, StoreError> {
        Ok(self.store.get_del(&keys::rollback(job_id)).await?.is_some())
    }
}
