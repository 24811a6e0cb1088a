//! # Rejection Reasons
//!
//! Structured rejection codes surfaced synchronously by the admission
//! gate. Every variant carries a stable machine-readable `kind` for the
//! API layer; the `Display` impl is the human-readable message.

use thiserror::Error;

/// Why an inbound intent was rejected at admission.
///
/// Rejects have no side effects, with one exception: `QueueFull` is
/// produced after the prepaid debit and replay record have been written,
/// and the gate compensates both before surfacing it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    /// The intent failed structural validation before any check ran.
    #[error("malformed intent: {0}")]
    Malformed(String),

    /// The presented credential does not match any configured API key.
    #[error("invalid API key")]
    BadApiKey,

    /// The client exceeded its fixed-window request budget.
    #[error("rate limit exceeded: more than {limit} requests per minute")]
    RateLimited {
        /// Configured per-minute budget.
        limit: u32,
    },

    /// The `(from, nonce)` pair was already observed inside the window.
    #[error("replay detected: nonce {nonce} already seen for {from}")]
    Replay {
        /// Payer address.
        from: String,
        /// Repeated intent nonce.
        nonce: String,
    },

    /// The intent timestamp falls outside the signature window.
    #[error("timestamp outside the {window_secs}s signature window")]
    StaleTimestamp {
        /// Configured window, seconds.
        window_secs: u64,
    },

    /// The recovered signer does not match `from_address`.
    #[error("signature does not match the payer address")]
    BadSignature,

    /// The amount exceeds the configured per-transaction cap.
    #[error("amount exceeds the per-transaction limit")]
    OverAmountLimit,

    /// The client's prepaid balance cannot cover the reserve.
    #[error("insufficient prepaid balance")]
    InsufficientPrepaid,

    /// The priority queue is at capacity; the client may retry later.
    #[error("queue is full, retry later")]
    QueueFull,
}

impl RejectReason {
    /// Stable machine-readable code for the API layer.
    pub fn kind(&self) -> &'static str {
        match self {
            RejectReason::Malformed(_) => "malformed",
            RejectReason::BadApiKey => "bad_api_key",
            RejectReason::RateLimited { .. } => "rate_limited",
            RejectReason::Replay { .. } => "replay",
            RejectReason::StaleTimestamp { .. } => "stale_timestamp",
            RejectReason::BadSignature => "bad_signature",
            RejectReason::OverAmountLimit => "over_amount_limit",
            RejectReason::InsufficientPrepaid => "insufficient_prepaid",
            RejectReason::QueueFull => "queue_full",
        }
    }

    /// True for the one reject the client may retry verbatim.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RejectReason::QueueFull)
    }
}
