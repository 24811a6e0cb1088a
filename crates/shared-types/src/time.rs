//! Time source abstraction.
//!
//! All freshness windows, backoff gates, and TTL expiry run against a
//! [`TimeSource`] so tests can drive the clock deterministically.

use crate::entities::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source of the current wall-clock time in milliseconds.
pub trait TimeSource: Send + Sync {
    /// Returns the current timestamp in milliseconds since UNIX epoch.
    fn now_ms(&self) -> Timestamp;
}

/// Default system time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> Timestamp {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as Timestamp
    }
}

/// Deterministic time source for tests.
///
/// Cloning shares the underlying clock, so a test can hold one handle
/// and advance time under components holding another.
#[derive(Debug, Clone)]
pub struct MockTimeSource {
    time: Arc<AtomicU64>,
}

impl MockTimeSource {
    /// Creates a clock frozen at `initial` milliseconds.
    pub fn new(initial: Timestamp) -> Self {
        Self { time: Arc::new(AtomicU64::new(initial)) }
    }

    /// Advances the clock by `ms` milliseconds.
    pub fn advance(&self, ms: u64) {
        self.time.fetch_add(ms, Ordering::SeqCst);
    }

    /// Sets the clock to an absolute time.
    pub fn set(&self, time: Timestamp) {
        self.time.store(time, Ordering::SeqCst);
    }
}

impl TimeSource for MockTimeSource {
    fn now_ms(&self) -> Timestamp {
        self.time.load(Ordering::SeqCst)
    }
}
