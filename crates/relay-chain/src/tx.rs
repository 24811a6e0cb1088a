//! Outbound payment transactions.
//!
//! The relayer only ever produces simple value transfers; the wire
//! encoding belongs to the chain adapter. What the core needs is a
//! deterministic signing digest and a transaction hash computable
//! *before* submission, so a resubmission after a crash can recognise
//! "already known" responses as its own transaction.

use crate::fees::FeeSuggestion;
use serde::{Deserialize, Serialize};
use shared_crypto::keccak256;
use shared_types::{Address, Signature, TxHash, U256};

/// An unsigned payment transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTx {
    /// Chain the transaction is valid on.
    pub chain_id: u64,
    /// Sender account nonce.
    pub nonce: u64,
    /// Recipient.
    pub to: Address,
    /// Transfer amount, base units.
    pub value: U256,
    /// Gas limit.
    pub gas_limit: u64,
    /// Fee pair attached to the transaction.
    pub fees: FeeSuggestion,
}

impl PaymentTx {
    /// Deterministic signing digest over every field.
    pub fn signing_digest(&self) -> [u8; 32] {
        let mut preimage = Vec::with_capacity(128);
        preimage.extend_from_slice(&self.chain_id.to_be_bytes());
        preimage.extend_from_slice(&self.nonce.to_be_bytes());
        preimage.extend_from_slice(self.to.as_bytes());
        let mut value_bytes = [0u8; 32];
        self.value.to_big_endian(&mut value_bytes);
        preimage.extend_from_slice(&value_bytes);
        preimage.extend_from_slice(&self.gas_limit.to_be_bytes());
        let mut fee_bytes = [0u8; 32];
        self.fees.max_fee_per_gas.to_big_endian(&mut fee_bytes);
        preimage.extend_from_slice(&fee_bytes);
        self.fees.max_priority_fee_per_gas.to_big_endian(&mut fee_bytes);
        preimage.extend_from_slice(&fee_bytes);
        keccak256(&preimage)
    }
}

/// A signed payment transaction ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPaymentTx {
    /// The unsigned body.
    pub tx: PaymentTx,
    /// Sender address (the signing wallet).
    pub from: Address,
    /// Recoverable signature over the signing digest.
    pub signature: Signature,
}

impl SignedPaymentTx {
    /// Transaction hash: digest of the signed payload.
    ///
    /// Stable across resubmissions of the identical transaction, which
    /// is what makes the duplicate-as-success path sound.
    pub fn hash(&self) -> TxHash {
        let mut preimage = Vec::with_capacity(97);
        preimage.extend_from_slice(&self.tx.signing_digest());
        preimage.extend_from_slice(&self.signature);
        TxHash(keccak256(&preimage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx() -> PaymentTx {
        PaymentTx {
            chain_id: 1,
            nonce: 7,
            to: Address([0xBB; 20]),
            value: U256::from(250_000u64),
            gas_limit: 21_000,
            fees: FeeSuggestion {
                max_fee_per_gas: U256::from(22_000_000_000u64),
                max_priority_fee_per_gas: U256::from(2_000_000_000u64),
            },
        }
    }

    #[test]
    fn test_digest_is_deterministic() {
        assert_eq!(sample_tx().signing_digest(), sample_tx().signing_digest());
    }

    #[test]
    fn test_digest_covers_every_field() {
        let base = sample_tx();

        let mut other = base.clone();
        other.nonce = 8;
        assert_ne!(base.signing_digest(), other.signing_digest());

        let mut other = base.clone();
        other.value = U256::from(250_001u64);
        assert_ne!(base.signing_digest(), other.signing_digest());

        let mut other = base.clone();
        other.chain_id = 5;
        assert_ne!(base.signing_digest(), other.signing_digest());
    }

    #[test]
    fn test_hash_stable_across_resubmission() {
        let signed = SignedPaymentTx {
            tx: sample_tx(),
            from: Address([0x11; 20]),
            signature: [9u8; 65],
        };
        assert_eq!(signed.hash(), signed.clone().hash());
    }
}
