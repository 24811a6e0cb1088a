//! # Integration Tests
//!
//! Cross-subsystem tests that drive the assembled relayer (admission →
//! queue → scheduler → wallets → lifecycle) over the in-memory store
//! and the mock chain adapter.
//!
//! ## Structure
//!
//! - `helpers`: the assembled test stack and intent builders
//! - `scenarios`: the end-to-end flows: happy path, replay, prepaid
//!   shortfall, transient retry, permanent rollback, nonce divergence
//! - `invariants`: concurrency properties: ledger non-negativity,
//!   replay exclusivity, per-wallet nonce monotonicity, lease accounting

pub mod helpers;

#[cfg(test)]
mod invariants;
#[cfg(test)]
mod scenarios;
