//! # Relay Chain
//!
//! The chain adapter port: everything the relayer asks of the blockchain,
//! behind one trait so the RPC client stays an external collaborator.
//!
//! ## Contents
//!
//! - [`ChainAdapter`]: fee suggestion, account nonce/balance reads, raw
//!   submission, confirmation wait, and message-signer recovery
//! - [`ChainError`]: the exhaustive error taxonomy every adapter failure
//!   is classified into, with its retry class
//! - [`PaymentTx`] / [`SignedPaymentTx`]: the outbound transaction shape
//!   and its deterministic digest
//! - [`derive_fee`]: suggestion × multiplier, clamped to the configured
//!   floor and ceiling
//! - [`MockChain`]: scriptable in-memory adapter used across the
//!   workspace's tests

mod adapter;
mod error;
mod fees;
mod mock;
mod tx;

pub use adapter::{ChainAdapter, ConfirmationReceipt};
pub use error::{ChainError, ErrorClass};
pub use fees::{derive_fee, FeeSuggestion};
pub use mock::MockChain;
pub use tx::{PaymentTx, SignedPaymentTx};
