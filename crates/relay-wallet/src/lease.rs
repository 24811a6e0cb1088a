//! Wallet leases.

use parking_lot::Mutex;
use shared_crypto::{CryptoError, RelayerKeyPair};
use shared_types::{Address, JobId, Signature};
use std::sync::Arc;
use tracing::warn;

/// Returns dropped-without-release leases back to the pool. Drained at
/// the start of every pool critical section.
#[derive(Default)]
pub(crate) struct OrphanBin {
    orphans: Mutex<Vec<(Address, JobId)>>,
}

impl OrphanBin {
    pub fn push(&self, address: Address, job_id: JobId) {
        self.orphans.lock().push((address, job_id));
    }

    pub fn drain(&self) -> Vec<(Address, JobId)> {
        std::mem::take(&mut *self.orphans.lock())
    }
}

/// Exclusive right to use one wallet for one submission.
///
/// Carries exactly what the lifecycle manager needs: the address, the
/// reserved chain nonce, and the signing capability. Return it with
/// [`WalletPool::release`](crate::WalletPool::release); if it is dropped
/// instead (worker panic, task abort), the drop guard reports it as a
/// failed lease so the wallet is never stranded in `leased`.
pub struct WalletLease {
    pub(crate) address: Address,
    pub(crate) nonce: u64,
    pub(crate) job_id: JobId,
    pub(crate) signer: Arc<RelayerKeyPair>,
    pub(crate) bin: Arc<OrphanBin>,
    pub(crate) returned: bool,
}

impl WalletLease {
    /// The leased wallet's address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// The chain nonce reserved for this submission.
    pub fn next_nonce(&self) -> u64 {
        self.nonce
    }

    /// The job this lease was issued to.
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Signs a 32-byte digest with the wallet key.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<Signature, CryptoError> {
        self.signer.sign_digest(digest)
    }

    /// Marks the lease as explicitly returned so the drop guard stays
    /// quiet. Called by the pool.
    pub(crate) fn mark_returned(&mut self) {
        self.returned = true;
    }
}

impl Drop for WalletLease {
    fn drop(&mut self) {
        if !self.returned {
            warn!(
                wallet = %self.address,
                job_id = %self.job_id,
                "wallet lease dropped without release, settling as failure"
            );
            self.bin.push(self.address, self.job_id);
        }
    }
}
