//! Chain adapter port.

use crate::error::ChainError;
use crate::fees::FeeSuggestion;
use crate::tx::SignedPaymentTx;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared_types::{Address, Signature, TxHash, U256};

/// Inclusion receipt returned once a transaction is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationReceipt {
    /// Block the transaction landed in.
    pub block_number: u64,
    /// Gas actually consumed.
    pub gas_used: u64,
}

/// Everything the relayer asks of the blockchain.
///
/// Implementations classify backend failures into [`ChainError`] before
/// returning; the lifecycle manager never sees raw RPC errors.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// Current market fee suggestion.
    async fn suggest_fees(&self) -> Result<FeeSuggestion, ChainError>;

    /// Confirmed account nonce for `address`.
    async fn get_nonce(&self, address: Address) -> Result<u64, ChainError>;

    /// Current balance of `address`, base units.
    async fn get_balance(&self, address: Address) -> Result<U256, ChainError>;

    /// Submits a signed transaction, returning its hash.
    async fn send_raw(&self, tx: &SignedPaymentTx) -> Result<TxHash, ChainError>;

    /// Waits until `tx_hash` has `min_blocks` confirmations.
    async fn wait_confirmation(
        &self,
        tx_hash: TxHash,
        min_blocks: u64,
    ) -> Result<ConfirmationReceipt, ChainError>;

    /// Recovers the signer of a personal-message signature.
    async fn verify_message(
        &self,
        message: &[u8],
        signature: &Signature,
    ) -> Result<Address, ChainError>;
}
