//! # Relay Wallet
//!
//! The pool of relayer-owned signing identities.
//!
//! ## Leasing
//!
//! A worker acquires a [`WalletLease`] for exactly one submission. The
//! lease is a capability: it carries the wallet address, the reserved
//! chain nonce, and the signing function, and nothing else. Leases are
//! returned through [`WalletPool::release`]; a lease dropped without an
//! explicit release is caught by a drop guard and settled as a failure
//! on the pool's next critical section, so a panicking worker can never
//! strand a wallet.
//!
//! ## Selection
//!
//! Idle wallets at or above the balance threshold are ranked by lowest
//! pending work, then highest success rate, then least recent use. That
//! yields round-robin under uniform load, load-balancing under skew, and
//! a preference for proven wallets when some are failing.
//!
//! ## Nonce discipline
//!
//! `local_nonce` starts from the chain's account nonce and increments
//! per lease. When the chain reports divergence the wallet drains: no
//! new leases until in-flight work settles, then the nonce re-syncs from
//! the chain and the wallet returns to service.

mod lease;
mod monitor;
mod pool;
mod records;

pub use lease::WalletLease;
pub use monitor::run_balance_monitor;
pub use pool::{SelectionStrategy, WalletPool};
pub use records::PoolStats;

use shared_types::Address;
use thiserror::Error;

/// Wallet pool operation failures.
#[derive(Debug, Clone, Error)]
pub enum WalletError {
    /// The address is not part of the pool.
    #[error("unknown wallet {0}")]
    UnknownWallet(Address),

    /// The chain adapter failed while initialising or re-syncing.
    #[error("chain error: {0}")]
    Chain(#[from] relay_chain::ChainError),
}
