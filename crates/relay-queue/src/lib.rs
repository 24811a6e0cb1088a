//! # Relay Queue
//!
//! Durable, priority-ordered backlog of admitted jobs.
//!
//! ## Ordering
//!
//! Four classes, strictly prioritised `urgent > high > normal > low`;
//! FIFO within a class. A lower class is only served when every higher
//! class has no *visible* job (a retry waiting out its backoff delay is
//! invisible but keeps its place in line).
//!
//! ## Durability
//!
//! The kv store is the source of truth: each class is one kv list of job
//! ids, and the job records themselves live under `job:{id}`. A process
//! restart loses nothing.
//!
//! ## Backoff
//!
//! Retries re-enter at the tail of their original class with a persisted
//! `not_before` timestamp of `base_delay · 2^(attempt−1)`, capped at
//! `max_retry_delay`. Pops skip and faithfully restore delayed entries.

mod backoff;
mod queue;

pub use backoff::retry_delay;
pub use queue::{JobQueue, QueueError, QueueStats};
