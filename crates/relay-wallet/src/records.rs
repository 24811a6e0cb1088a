//! Internal wallet records.

use serde::Serialize;
use shared_crypto::RelayerKeyPair;
use shared_types::{Address, JobId, LeaseOutcome, Timestamp, U256, WalletInfo, WalletState};
use std::collections::HashSet;
use std::sync::Arc;

/// EMA weight for success-rate updates.
const SUCCESS_RATE_ALPHA: f64 = 0.1;

/// One wallet's mutable state. Lives behind the pool mutex; key material
/// never leaves the signer handle.
pub(crate) struct WalletRecord {
    pub address: Address,
    pub signer: Arc<RelayerKeyPair>,
    pub state: WalletState,
    pub balance: U256,
    pub local_nonce: u64,
    pub in_flight: HashSet<JobId>,
    pub success_rate: f64,
    pub last_used: Timestamp,
    pub total_submissions: u64,
    pub successful_submissions: u64,
    pub failed_submissions: u64,
    pub total_gas_used: u64,
    /// Set when the balance monitor disabled the wallet, so only the
    /// monitor re-enables it; operator disables stay until an operator
    /// acts.
    pub auto_disabled: bool,
}

impl WalletRecord {
    pub fn new(signer: Arc<RelayerKeyPair>, nonce: u64, balance: U256) -> Self {
        Self {
            address: signer.address(),
            signer,
            state: WalletState::Idle,
            balance,
            local_nonce: nonce,
            in_flight: HashSet::new(),
            success_rate: 1.0,
            last_used: 0,
            total_submissions: 0,
            successful_submissions: 0,
            failed_submissions: 0,
            total_gas_used: 0,
            auto_disabled: false,
        }
    }

    /// Applies a returned lease: updates the in-flight set, counters,
    /// and the success-rate EMA, and settles `leased → idle` when the
    /// last lease comes back.
    pub fn apply_release(&mut self, job_id: &JobId, outcome: LeaseOutcome) {
        self.in_flight.remove(job_id);
        self.total_submissions += 1;

        let success = match outcome {
            LeaseOutcome::Success { gas_used } => {
                self.successful_submissions += 1;
                self.total_gas_used += gas_used;
                1.0
            }
            LeaseOutcome::Failure => {
                self.failed_submissions += 1;
                0.0
            }
        };
        self.success_rate =
            (1.0 - SUCCESS_RATE_ALPHA) * self.success_rate + SUCCESS_RATE_ALPHA * success;

        if self.state == WalletState::Leased && self.in_flight.is_empty() {
            self.state = WalletState::Idle;
        }
    }

    /// True when a draining wallet has no in-flight work left and can
    /// re-sync its nonce.
    pub fn ready_for_resync(&self) -> bool {
        self.state == WalletState::Draining && self.in_flight.is_empty()
    }

    pub fn info(&self) -> WalletInfo {
        WalletInfo {
            address: self.address,
            state: self.state,
            balance: self.balance,
            local_nonce: self.local_nonce,
            pending_count: self.in_flight.len(),
            success_rate: self.success_rate,
            last_used: self.last_used,
            total_submissions: self.total_submissions,
            successful_submissions: self.successful_submissions,
            failed_submissions: self.failed_submissions,
            total_gas_used: self.total_gas_used,
        }
    }
}

/// Aggregate pool counters for the operator surface.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    /// Registered wallets.
    pub total_wallets: usize,
    /// Wallets currently selectable.
    pub idle_wallets: usize,
    /// Wallets holding a lease.
    pub leased_wallets: usize,
    /// Wallets draining for a nonce re-sync.
    pub draining_wallets: usize,
    /// Disabled wallets (balance or operator).
    pub disabled_wallets: usize,
    /// Lifetime submissions across the pool.
    pub total_submissions: u64,
    /// Pool-wide success ratio over lifetime counters.
    pub overall_success_rate: f64,
}
