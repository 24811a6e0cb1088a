//! Audit log port.
//!
//! Best-effort, append-only operator trail. Appends never fail the
//! caller; loss is tolerated and ordering is only meaningful per subject.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shared_types::Timestamp;

/// One audit trail entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event time, milliseconds since epoch.
    pub ts: Timestamp,
    /// What the event is about (job id, wallet address, client id).
    pub subject: String,
    /// Event kind, e.g. `admission_rejected`, `tx_confirmed`,
    /// `wallet_disabled`, `rollback_applied`.
    pub kind: String,
    /// Free-form structured payload.
    pub data: serde_json::Value,
}

/// Append-only audit sink.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Appends an event. Implementations swallow their own failures.
    async fn append(&self, event: AuditEvent);
}

/// Audit sink that emits events as structured log lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditLog;

#[async_trait]
impl AuditLog for TracingAuditLog {
    async fn append(&self, event: AuditEvent) {
        tracing::info!(
            target: "relay_audit",
            ts = event.ts,
            subject = %event.subject,
            kind = %event.kind,
            data = %event.data,
            "audit"
        );
    }
}

/// Audit sink that retains events in memory, for tests.
#[derive(Default)]
pub struct MemoryAuditLog {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditLog {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything appended so far.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    /// Events of one kind, in append order.
    pub fn events_of_kind(&self, kind: &str) -> Vec<AuditEvent> {
        self.events.lock().iter().filter(|e| e.kind == kind).cloned().collect()
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn append(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_audit_retains_order() {
        let log = MemoryAuditLog::new();
        for i in 0..3u64 {
            log.append(AuditEvent {
                ts: i,
                subject: "job-1".into(),
                kind: "tx_submitted".into(),
                data: serde_json::json!({ "attempt": i }),
            })
            .await;
        }

        let events = log.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].ts, 0);
        assert_eq!(events[2].ts, 2);
        assert_eq!(log.events_of_kind("tx_submitted").len(), 3);
        assert!(log.events_of_kind("rollback_applied").is_empty());
    }
}
