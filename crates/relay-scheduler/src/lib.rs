//! # Relay Scheduler
//!
//! The bounded worker pool connecting the queue, the wallet pool, and
//! the lifecycle executor.
//!
//! ## Worker loop
//!
//! Each worker: pop a visible job (brief sleep when the queue is dry) →
//! lease a wallet → mark the job `leased` → run the lifecycle under the
//! processing timeout → release the wallet on *every* path → settle the
//! outcome (nothing more for terminal outcomes, backoff re-enqueue for
//! retries).
//!
//! ## Cancellation
//!
//! One `CancellationToken` is observed at every suspension point. On
//! shutdown a worker finishes its current await; a job that has not
//! reached a terminal state goes back to `queued` at its original
//! priority, its wallet is returned, and the scheduler waits for the
//! pool to report all leases released (bounded by the grace deadline).

mod scheduler;
mod worker;

pub use scheduler::{Scheduler, SchedulerStats};
