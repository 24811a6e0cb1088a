//! # Relay Lifecycle
//!
//! Drives an in-flight job from `leased` through chain submission to a
//! terminal status, and owns everything that happens at the terminal
//! edge: rollback of the prepaid debit on permanent failure, the
//! monotonic status store, the subscriber fanout, and the boot-time
//! sweep that settles debits orphaned by a crash.
//!
//! ## Idempotency
//!
//! The signed transaction's hash is recorded on the job *before* the
//! send, so a crash-and-resubmit of the identical payload recognises the
//! chain's "already known" response as its own submission. Status writes
//! are monotonic per job: once a terminal record exists, non-terminal
//! writes are ignored.

mod executor;
mod rollback;
mod status;
mod sweep;

pub use executor::Lifecycle;
pub use rollback::{RollbackManager, RollbackOutcome};
pub use status::StatusPublisher;
pub use sweep::startup_sweep;
