//! Scriptable in-memory chain adapter.
//!
//! Behaves like a well-funded devnet by default: sends succeed when the
//! transaction nonce matches the account's chain nonce, confirmations
//! arrive immediately, and message recovery runs the real ECDSA path.
//! Tests inject failures by queueing errors per operation.

use crate::adapter::{ChainAdapter, ConfirmationReceipt};
use crate::error::ChainError;
use crate::fees::FeeSuggestion;
use crate::tx::SignedPaymentTx;
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_crypto::{personal_message_hash, recover_signer};
use shared_types::{Address, Signature, TxHash, U256};
use std::collections::{HashMap, HashSet, VecDeque};

struct MockChainState {
    fees: FeeSuggestion,
    nonces: HashMap<Address, u64>,
    balances: HashMap<Address, U256>,
    send_errors: VecDeque<ChainError>,
    confirm_errors: VecDeque<ChainError>,
    recover_override: Option<Address>,
    sent: Vec<SignedPaymentTx>,
    known: HashSet<TxHash>,
    next_block: u64,
    gas_used: u64,
}

/// In-memory [`ChainAdapter`] with per-call failure injection.
pub struct MockChain {
    state: Mutex<MockChainState>,
}

impl MockChain {
    /// Creates a mock chain with 20 gwei / 2 gwei fee suggestions.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockChainState {
                fees: FeeSuggestion {
                    max_fee_per_gas: U256::from(20_000_000_000u64),
                    max_priority_fee_per_gas: U256::from(2_000_000_000u64),
                },
                nonces: HashMap::new(),
                balances: HashMap::new(),
                send_errors: VecDeque::new(),
                confirm_errors: VecDeque::new(),
                recover_override: None,
                sent: Vec::new(),
                known: HashSet::new(),
                next_block: 1,
                gas_used: 21_000,
            }),
        }
    }

    /// Overrides the fee suggestion.
    pub fn set_fees(&self, fees: FeeSuggestion) {
        self.state.lock().fees = fees;
    }

    /// Sets an account balance.
    pub fn set_balance(&self, address: Address, balance: U256) {
        self.state.lock().balances.insert(address, balance);
    }

    /// Sets an account's chain nonce.
    pub fn set_nonce(&self, address: Address, nonce: u64) {
        self.state.lock().nonces.insert(address, nonce);
    }

    /// Queues an error for a future `send_raw` call (FIFO).
    pub fn queue_send_error(&self, error: ChainError) {
        self.state.lock().send_errors.push_back(error);
    }

    /// Queues an error for a future `wait_confirmation` call (FIFO).
    pub fn queue_confirm_error(&self, error: ChainError) {
        self.state.lock().confirm_errors.push_back(error);
    }

    /// Makes `verify_message` return a fixed address instead of running
    /// recovery, so admission tests can skip real signing.
    pub fn force_recovered_signer(&self, address: Address) {
        self.state.lock().recover_override = Some(address);
    }

    /// Every transaction accepted so far, in submission order.
    pub fn sent(&self) -> Vec<SignedPaymentTx> {
        self.state.lock().sent.clone()
    }

    /// Number of accepted submissions.
    pub fn sent_count(&self) -> usize {
        self.state.lock().sent.len()
    }
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainAdapter for MockChain {
    async fn suggest_fees(&self) -> Result<FeeSuggestion, ChainError> {
        Ok(self.state.lock().fees)
    }

    async fn get_nonce(&self, address: Address) -> Result<u64, ChainError> {
        Ok(self.state.lock().nonces.get(&address).copied().unwrap_or(0))
    }

    async fn get_balance(&self, address: Address) -> Result<U256, ChainError> {
        Ok(self.state.lock().balances.get(&address).copied().unwrap_or_else(U256::zero))
    }

    async fn send_raw(&self, tx: &SignedPaymentTx) -> Result<TxHash, ChainError> {
        let mut state = self.state.lock();

        if let Some(error) = state.send_errors.pop_front() {
            return Err(error);
        }

        let hash = tx.hash();
        if state.known.contains(&hash) {
            return Err(ChainError::Duplicate);
        }

        let expected = state.nonces.get(&tx.from).copied().unwrap_or(0);
        if tx.tx.nonce < expected {
            return Err(ChainError::NonceTooLow);
        }
        if tx.tx.nonce > expected {
            return Err(ChainError::NonceTooHigh);
        }

        state.nonces.insert(tx.from, expected + 1);
        state.known.insert(hash);
        state.sent.push(tx.clone());
        Ok(hash)
    }

    async fn wait_confirmation(
        &self,
        _tx_hash: TxHash,
        _min_blocks: u64,
    ) -> Result<ConfirmationReceipt, ChainError> {
        let mut state = self.state.lock();

        if let Some(error) = state.confirm_errors.pop_front() {
            return Err(error);
        }

        let block_number = state.next_block;
        state.next_block += 1;
        Ok(ConfirmationReceipt { block_number, gas_used: state.gas_used })
    }

    async fn verify_message(
        &self,
        message: &[u8],
        signature: &Signature,
    ) -> Result<Address, ChainError> {
        if let Some(address) = self.state.lock().recover_override {
            return Ok(address);
        }
        let digest = personal_message_hash(message);
        recover_signer(&digest, signature).map_err(|_| ChainError::SignatureRejected)
    }
}
