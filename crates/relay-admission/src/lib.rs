//! # Relay Admission
//!
//! The admission gate: decides whether a signed payment intent becomes a
//! queued job. Checks run in a fixed order and short-circuit on the
//! first failure:
//!
//! 1. structural validation
//! 2. API-key check (constant time)
//! 3. fixed-window rate limit per client
//! 4. freshness window and replay protection (atomic set-if-absent)
//! 5. signature recovery against the claimed payer
//! 6. per-transaction amount cap
//! 7. conditional prepaid debit + rollback point
//! 8. job persistence and enqueue
//!
//! Rejects are synchronous and leave no durable side effects: a replay
//! record written at step 4 is compensated if any later step rejects,
//! and a debit at step 7 is compensated if the enqueue fails.

mod gate;
mod ledger;
mod limiter;
mod replay;
mod validation;

pub use gate::{AdmissionError, AdmissionGate};
pub use ledger::PrepaidLedger;
pub use limiter::RateWindow;
pub use replay::{ReplayGuard, ReplayStats};
pub use validation::validate_intent;
