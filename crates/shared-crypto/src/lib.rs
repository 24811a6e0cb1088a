//! # Shared Crypto
//!
//! Cryptographic primitives for the relayer:
//!
//! - Keccak-256 hashing and EIP-191 personal-message digests
//! - Recoverable secp256k1 ECDSA: signing with relayer wallet keys and
//!   signer recovery for inbound intents
//! - Constant-time credential comparison for API keys
//!
//! ## Security Properties
//!
//! - RFC 6979 deterministic nonces (no RNG dependency for signing)
//! - Secret key material zeroized on drop, never logged
//! - Credential checks take the same time regardless of match position

mod compare;
mod ecdsa;
mod hashing;

pub use compare::constant_time_compare;
pub use ecdsa::{recover_signer, RelayerKeyPair};
pub use hashing::{keccak256, personal_message_hash};

use thiserror::Error;

/// Cryptographic operation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// The 32-byte secret is not a valid secp256k1 scalar.
    #[error("invalid private key")]
    InvalidPrivateKey,

    /// The signature bytes are not a valid (r, s) pair.
    #[error("invalid signature encoding")]
    InvalidSignature,

    /// The recovery id (v) is not 0, 1, 27, or 28.
    #[error("invalid recovery id")]
    InvalidRecoveryId,

    /// Public key recovery failed for the given digest and signature.
    #[error("signer recovery failed")]
    RecoveryFailed,
}
