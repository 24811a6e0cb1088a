//! Chain error taxonomy.
//!
//! Every failure an adapter can surface is one of these variants, and
//! every variant maps to exactly one retry class. The lifecycle manager
//! matches exhaustively; unknown backend errors must be classified by the
//! adapter before they reach it, defaulting to [`ChainError::Unknown`]
//! which takes the most conservative class.

use thiserror::Error;

/// Classified chain interaction failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// The node already knows this transaction.
    ///
    /// Treated as success on the retry path when the recorded intended
    /// hash matches the resubmission.
    #[error("transaction already known")]
    Duplicate,

    /// The fee is below the node's acceptance threshold.
    #[error("transaction underpriced")]
    Underpriced,

    /// The transaction nonce is behind the account's chain nonce.
    #[error("nonce too low (chain expects a higher nonce)")]
    NonceTooLow,

    /// The transaction nonce is ahead of the account's chain nonce.
    #[error("nonce too high (gap before this nonce)")]
    NonceTooHigh,

    /// The sending wallet cannot cover value + max fee.
    #[error("insufficient funds on the sending wallet")]
    InsufficientFunds,

    /// The transaction executed and reverted.
    #[error("transaction reverted on chain")]
    Reverted,

    /// The node rejected the transaction signature.
    #[error("signature rejected by the chain")]
    SignatureRejected,

    /// Transport-level failure talking to the node.
    #[error("network error: {0}")]
    Network(String),

    /// The operation did not complete within the adapter's deadline.
    #[error("chain operation timed out")]
    Timeout,

    /// Backend error the adapter could not classify.
    #[error("unclassified chain error: {0}")]
    Unknown(String),
}

/// Retry class of a chain error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry the same job with backoff.
    Transient,
    /// Retry on a different or re-synced wallet; the wallet needs
    /// attention (nonce re-sync or funding), not the job.
    WalletState,
    /// Fail the job and roll back the prepaid debit.
    Permanent,
}

impl ChainError {
    /// The retry class this error belongs to.
    pub fn class(&self) -> ErrorClass {
        match self {
            ChainError::Duplicate
            | ChainError::Underpriced
            | ChainError::Network(_)
            | ChainError::Timeout => ErrorClass::Transient,

            ChainError::NonceTooLow
            | ChainError::NonceTooHigh
            | ChainError::InsufficientFunds => ErrorClass::WalletState,

            ChainError::Reverted | ChainError::SignatureRejected => ErrorClass::Permanent,

            // Conservative default: fail and roll back, flag for operators
            ChainError::Unknown(_) => ErrorClass::Permanent,
        }
    }

    /// True for nonce divergence, which additionally drains the wallet.
    pub fn is_nonce_divergence(&self) -> bool {
        matches!(self, ChainError::NonceTooLow | ChainError::NonceTooHigh)
    }
}
