//! Retry backoff schedule.

use shared_types::config::QueueConfig;
use std::time::Duration;

/// Delay before retry attempt `attempt` (1-based): exponential doubling
/// from the base delay, capped at the configured maximum.
pub fn retry_delay(config: &QueueConfig, attempt: u32) -> Duration {
    let base = config.base_retry_delay_secs;
    let cap = config.max_retry_delay_secs;
    let exponent = attempt.saturating_sub(1).min(32);
    let delay = base.saturating_mul(1u64 << exponent);
    Duration::from_secs(delay.min(cap))
}
