//! Background balance monitor.

use crate::pool::WalletPool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Periodically re-reads every wallet balance and applies the threshold
/// transitions (disable below, re-enable at or above). Runs until the
/// cancellation token fires.
pub async fn run_balance_monitor(
    pool: Arc<WalletPool>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("balance monitor stopping");
                return;
            }
            _ = ticker.tick() => {
                pool.refresh_balances().await;
            }
        }
    }
}
