//! Boot-time rollback sweep.
//!
//! Admission debits the ledger before it enqueues. A crash in that
//! window leaves a rollback point with no job record behind it; this
//! sweep finds those orphans on startup and applies their compensating
//! credits, which is what lets the two steps run without a distributed
//! transaction.

use crate::rollback::{RollbackManager, RollbackOutcome};
use relay_store::{keys, KvStore, StoreError};
use shared_types::JobId;
use std::sync::Arc;
use tracing::{info, warn};

const ROLLBACK_PREFIX: &str = "rollback:";

/// Applies the compensating credit for every rollback point whose job
/// record no longer exists. Returns the number of credits applied.
pub async fn startup_sweep(
    store: Arc<dyn KvStore>,
    rollback: &RollbackManager,
) -> Result<u32, StoreError> {
    let mut applied = 0u32;

    for key in store.keys_with_prefix(ROLLBACK_PREFIX).await? {
        let Some(raw_id) = key.strip_prefix(ROLLBACK_PREFIX) else { continue };
        let Ok(job_id) = raw_id.parse::<JobId>() else {
            warn!(key = %key, "rollback point with unparseable job id");
            continue;
        };

        // A live job record means the job is queued or in flight and the
        // lifecycle still owns its rollback point.
        if store.get(&keys::job(&job_id)).await?.is_some() {
            continue;
        }

        match rollback.apply(&job_id).await {
            Ok(RollbackOutcome::Applied { client_id, amount, .. }) => {
                info!(
                    job_id = %job_id,
                    client_id = %client_id,
                    amount = %amount,
                    "startup sweep applied orphaned rollback"
                );
                applied += 1;
            }
            Ok(RollbackOutcome::NotFound) => {}
            Err(e) => warn!(job_id = %job_id, error = %e, "startup sweep rollback failed"),
        }
    }

    if applied > 0 {
        info!(applied, "startup sweep settled orphaned debits");
    }
    Ok(applied)
}
