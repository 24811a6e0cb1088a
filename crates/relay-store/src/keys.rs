//! KV key namespaces.
//!
//! Every persisted record lives under one of these prefixes. Keys embed
//! lowercase hex addresses so lookups are case-insensitive by
//! construction.

use shared_types::{Address, ClientId, JobId, Priority};

/// Fixed-window request counter for a client. 60 s TTL.
pub fn rate_limit(client_id: &ClientId) -> String {
    format!("rate_limit:{client_id}")
}

/// Replay record for an observed `(from, nonce)` pair.
pub fn nonce_seen(from: &Address, nonce: &str) -> String {
    format!("nonce_seen:{from}:{nonce}")
}

/// Prepaid balance for a client, decimal base units.
pub fn prepaid(client_id: &ClientId) -> String {
    format!("prepaid:{client_id}")
}

/// Rollback point for a job that debited the ledger.
pub fn rollback(job_id: &JobId) -> String {
    format!("rollback:{job_id}")
}

/// Persisted job record.
pub fn job(job_id: &JobId) -> String {
    format!("job:{job_id}")
}

/// Externally visible status record.
pub fn job_status(job_id: &JobId) -> String {
    format!("job_status:{job_id}")
}

/// Priority class backlog list.
pub fn queue(priority: Priority) -> String {
    format!("queue:{}", priority.as_str())
}

/// Wallet metadata record.
pub fn wallet_meta(address: &Address) -> String {
    format!("wallet_meta:{address}")
}
