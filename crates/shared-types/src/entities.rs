//! # Core Domain Entities
//!
//! Defines the entities that flow through the relayer pipeline.
//!
//! ## Clusters
//!
//! - **Identity**: `Address`, `TxHash`, `JobId`, `ClientId`
//! - **Inbound**: `PaymentIntent`, `Priority`
//! - **Work items**: `Job`, `JobStatus`, `JobOutcome`, `StatusRecord`
//! - **Wallets**: `WalletState`, `WalletInfo`, `LeaseOutcome`

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use uuid::Uuid;

// Re-export U256 from primitive-types for use across all subsystems
pub use primitive_types::U256;

/// Timestamp in milliseconds since UNIX epoch.
pub type Timestamp = u64;

/// A 65-byte recoverable ECDSA signature (r || s || v).
pub type Signature = [u8; 65];

/// Globally unique job identifier.
pub type JobId = Uuid;

/// Opaque client identifier used for rate limiting and prepaid accounting.
pub type ClientId = String;

// =============================================================================
// IDENTITY
// =============================================================================

/// A 20-byte Ethereum-style address.
///
/// Rendered as `0x`-prefixed lowercase hex; parsing and equality are
/// case-insensitive.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The all-zero address.
    pub const ZERO: Address = Address([0u8; 20]);

    /// Parses a `0x`-prefixed (or bare) hex address, case-insensitive.
    pub fn parse(s: &str) -> Result<Self, AddressParseError> {
        let stripped = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        if stripped.len() != 40 {
            return Err(AddressParseError::Length(stripped.len()));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(stripped, &mut bytes).map_err(|_| AddressParseError::Hex)?;
        Ok(Address(bytes))
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Lowercase hex rendering with `0x` prefix.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl std::str::FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Address parsing failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressParseError {
    /// Wrong number of hex characters (expected 40).
    #[error("address must be 40 hex characters, got {0}")]
    Length(usize),
    /// Non-hex characters present.
    #[error("address contains non-hex characters")]
    Hex,
}

/// A 32-byte transaction hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    /// Lowercase hex rendering with `0x` prefix.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parses a `0x`-prefixed (or bare) 64-character hex hash.
    pub fn parse(s: &str) -> Result<Self, AddressParseError> {
        let stripped = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        if stripped.len() != 64 {
            return Err(AddressParseError::Length(stripped.len()));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(stripped, &mut bytes).map_err(|_| AddressParseError::Hex)?;
        Ok(TxHash(bytes))
    }
}

impl std::fmt::Display for TxHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Debug for TxHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TxHash({})", self.to_hex())
    }
}

impl Serialize for TxHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TxHash::parse(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// INBOUND INTENTS
// =============================================================================

/// Job priority class.
///
/// Classes are strictly ordered: all visible `Urgent` jobs are dispatched
/// before any `High` job, and so on down to `Low`. Within a class the
/// queue is FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Dispatched before everything else.
    Urgent,
    /// Above normal traffic.
    High,
    /// Default class.
    #[default]
    Normal,
    /// Background traffic, dispatched only when everything else is drained.
    Low,
}

impl Priority {
    /// All classes in dispatch order (highest first).
    pub const ALL: [Priority; 4] = [Priority::Urgent, Priority::High, Priority::Normal, Priority::Low];

    /// Stable string form used in kv keys and status records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Urgent => "urgent",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user-signed payment intent, as received from the API layer.
///
/// Immutable once admitted. The signature covers the canonical message
/// `from:to:amount:timestamp` (see [`PaymentIntent::canonical_message`]).
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    /// Payer address; must match the recovered signer.
    pub from_address: Address,
    /// Payee address.
    pub to_address: Address,
    /// Payment amount in the chain's base unit.
    pub amount: U256,
    /// Opaque replay-protection nonce, unique per `from_address` within
    /// the signature window. Distinct from the chain account nonce.
    pub nonce: String,
    /// Client-side signing time, milliseconds since epoch.
    pub timestamp: Timestamp,
    /// Recoverable ECDSA signature over the canonical message.
    #[serde_as(as = "Bytes")]
    pub signature: Signature,
    /// Client identifier for rate limiting and prepaid accounting.
    pub client_id: ClientId,
    /// Credential presented by the submitting client.
    pub api_key: String,
    /// Requested priority class.
    #[serde(default)]
    pub priority: Priority,
}

impl PaymentIntent {
    /// The canonical message the user signed:
    /// `from:to:amount:timestamp` with lowercase hex addresses and the
    /// amount in decimal base units.
    pub fn canonical_message(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.from_address.to_hex(),
            self.to_address.to_hex(),
            self.amount,
            self.timestamp
        )
    }
}

// =============================================================================
// WORK ITEMS
// =============================================================================

/// Lifecycle status of a job.
///
/// ```text
/// queued ──> leased ──> submitted ──> confirmed
///              │            │
///              └── retry ←──┤
///                           └── failed ──> rolled_back
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in the priority queue.
    Queued,
    /// Popped by a worker, holds a wallet lease.
    Leased,
    /// Transaction sent to the chain, awaiting confirmation.
    Submitted,
    /// Terminal: confirmed on chain; the prepaid debit stands.
    Confirmed,
    /// Terminal precursor: permanently failed; rollback pending or denied.
    Failed,
    /// Terminal: failed and the prepaid debit has been compensated.
    RolledBack,
}

impl JobStatus {
    /// Terminal statuses are never overwritten.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Confirmed | JobStatus::Failed | JobStatus::RolledBack)
    }

    /// Stable string form used in status records.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Leased => "leased",
            JobStatus::Submitted => "submitted",
            JobStatus::Confirmed => "confirmed",
            JobStatus::Failed => "failed",
            JobStatus::RolledBack => "rolled_back",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The relayer's internal work item, created from an admitted intent.
///
/// Owned by the queue while `Queued`, by a worker while `Leased` or
/// `Submitted`, and retired by the lifecycle manager on terminal
/// transition. Persisted in the kv store as the crash-resume record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Globally unique identifier, generated at admission.
    pub job_id: JobId,
    /// The admitted intent, verbatim.
    pub intent: PaymentIntent,
    /// Priority class fixed at admission.
    pub priority: Priority,
    /// Admission time, milliseconds since epoch.
    pub created_at: Timestamp,
    /// 0-based delivery attempt; never exceeds `max_attempts`.
    pub attempt: u32,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Earliest time this job may be popped (backoff visibility gate).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<Timestamp>,
    /// Wallet holding the lease while the job is in flight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_wallet: Option<Address>,
    /// Set exactly when status is `Submitted` or `Confirmed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<TxHash>,
    /// Block the transaction was included in, once confirmed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    /// Gas consumed on chain, once confirmed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<u64>,
    /// Most recent failure description, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Job {
    /// Creates a fresh queued job for an admitted intent.
    pub fn new(job_id: JobId, intent: PaymentIntent, now: Timestamp) -> Self {
        let priority = intent.priority;
        Self {
            job_id,
            intent,
            priority,
            created_at: now,
            attempt: 0,
            status: JobStatus::Queued,
            not_before: None,
            assigned_wallet: None,
            tx_hash: None,
            block_number: None,
            gas_used: None,
            last_error: None,
        }
    }

    /// True once the job reached a status that is never overwritten.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// True if the backoff gate allows dispatching at `now`.
    pub fn is_visible(&self, now: Timestamp) -> bool {
        self.not_before.map_or(true, |t| t <= now)
    }
}

/// Result of one lifecycle run for a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The transaction confirmed on chain.
    Confirmed {
        /// Hash of the confirmed transaction.
        tx_hash: TxHash,
        /// Inclusion block.
        block_number: u64,
        /// Gas consumed.
        gas_used: u64,
    },
    /// Transient failure; the scheduler re-enqueues with backoff.
    Retry {
        /// Human-readable failure description.
        reason: String,
        /// The wallet's reserved nonce can no longer be trusted (the
        /// chain reported divergence, or the submission never consumed
        /// it); the pool must drain and re-sync before reuse.
        wallet_divergence: bool,
    },
    /// Permanent failure; rollback has been applied.
    Failed {
        /// Human-readable failure description.
        reason: String,
    },
}

/// Externally visible status record, written on every transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRecord {
    /// The job this record describes.
    pub job_id: JobId,
    /// Status at write time.
    pub status: JobStatus,
    /// Attempt the transition belongs to.
    pub attempt: u32,
    /// Transaction hash, once submitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<TxHash>,
    /// Inclusion block, once confirmed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    /// Gas consumed, once confirmed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<u64>,
    /// Failure description, if the transition carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Write time, milliseconds since epoch.
    pub updated_at: Timestamp,
}

impl StatusRecord {
    /// Builds a record reflecting the job's current state.
    pub fn from_job(job: &Job, now: Timestamp) -> Self {
        Self {
            job_id: job.job_id,
            status: job.status,
            attempt: job.attempt,
            tx_hash: job.tx_hash,
            block_number: job.block_number,
            gas_used: job.gas_used,
            error: job.last_error.clone(),
            updated_at: now,
        }
    }
}

/// Compensating-credit record written at admission for every prepaid
/// debit, keyed by the debiting job. Consumed exactly once on terminal
/// transition: dropped when the job confirms, applied when it fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackPoint {
    /// Client whose ledger was debited.
    pub client_id: ClientId,
    /// Debited amount, base units.
    pub amount: U256,
    /// Debit time, milliseconds since epoch.
    pub created_at: Timestamp,
}

// =============================================================================
// WALLETS
// =============================================================================

/// Wallet availability state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletState {
    /// Available for leasing.
    Idle,
    /// At least one lease outstanding.
    Leased,
    /// No new leases; outstanding work completes, then the nonce re-syncs.
    Draining,
    /// Never selected (below balance threshold or operator action).
    Disabled,
}

/// Outcome reported when a wallet lease is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseOutcome {
    /// The submission confirmed.
    Success {
        /// Gas the confirmed transaction consumed.
        gas_used: u64,
    },
    /// The submission failed (any reason).
    Failure,
}

/// Public wallet snapshot. Never contains key material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletInfo {
    /// Wallet address.
    pub address: Address,
    /// Availability state.
    pub state: WalletState,
    /// Last observed on-chain balance, base units.
    pub balance: U256,
    /// Next chain nonce this wallet will use.
    pub local_nonce: u64,
    /// Number of in-flight jobs holding this wallet.
    pub pending_count: usize,
    /// Exponential moving average of submission success, in `[0, 1]`.
    pub success_rate: f64,
    /// Last lease time, milliseconds since epoch.
    pub last_used: Timestamp,
    /// Lifetime submissions through this wallet.
    pub total_submissions: u64,
    /// Lifetime successful submissions.
    pub successful_submissions: u64,
    /// Lifetime failed submissions.
    pub failed_submissions: u64,
    /// Cumulative gas consumed by confirmed transactions.
    pub total_gas_used: u64,
}
