//! Recoverable secp256k1 ECDSA.
//!
//! Two roles, matching the relayer's trust boundary:
//!
//! - [`RelayerKeyPair`] signs outbound chain transactions with
//!   relayer-owned wallet keys (RFC 6979 deterministic nonces).
//! - [`recover_signer`] recovers the author of an inbound intent
//!   signature so the admission gate can compare it against the claimed
//!   payer address.

use crate::hashing::keccak256;
use crate::CryptoError;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use shared_types::{Address, Signature};
use zeroize::Zeroize;

/// A relayer wallet keypair.
///
/// Secret material lives only inside this struct and is zeroized when it
/// is dropped. The struct deliberately has no `Debug` impl.
pub struct RelayerKeyPair {
    signing_key: SigningKey,
}

impl RelayerKeyPair {
    /// Generates a random keypair (tests and tooling).
    pub fn generate() -> Self {
        Self { signing_key: SigningKey::random(&mut rand::thread_rng()) }
    }

    /// Creates a keypair from raw 32-byte secret material.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        let signing_key =
            SigningKey::from_bytes((&bytes).into()).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self { signing_key })
    }

    /// Creates a keypair from a hex-encoded secret (with or without `0x`).
    pub fn from_hex(key: &str) -> Result<Self, CryptoError> {
        let stripped = key.strip_prefix("0x").unwrap_or(key);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(stripped, &mut bytes).map_err(|_| CryptoError::InvalidPrivateKey)?;
        let pair = Self::from_bytes(bytes);
        bytes.zeroize();
        pair
    }

    /// The Ethereum address derived from the public key.
    pub fn address(&self) -> Address {
        address_of(self.signing_key.verifying_key())
    }

    /// Raw secret bytes, for provisioning flows. Handle with care.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes().into()
    }

    /// Signs a 32-byte digest, returning a 65-byte `r || s || v`
    /// signature with `v ∈ {27, 28}`.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<Signature, CryptoError> {
        let (sig, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(digest)
            .map_err(|_| CryptoError::InvalidSignature)?;
        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&sig.to_bytes());
        out[64] = 27 + recovery_id.to_byte();
        Ok(out)
    }
}

impl Drop for RelayerKeyPair {
    fn drop(&mut self) {
        // Zeroize secret key material
        let mut bytes: [u8; 32] = self.signing_key.to_bytes().into();
        bytes.zeroize();
    }
}

/// Recovers the signer address of a 65-byte `r || s || v` signature over
/// a 32-byte digest. Accepts `v ∈ {0, 1, 27, 28}`.
pub fn recover_signer(digest: &[u8; 32], signature: &Signature) -> Result<Address, CryptoError> {
    let v = signature[64];
    let recovery_byte = if v >= 27 { v - 27 } else { v };
    if recovery_byte > 1 {
        return Err(CryptoError::InvalidRecoveryId);
    }
    let recovery_id =
        RecoveryId::from_byte(recovery_byte).ok_or(CryptoError::InvalidRecoveryId)?;

    let sig = EcdsaSignature::from_slice(&signature[..64])
        .map_err(|_| CryptoError::InvalidSignature)?;

    let verifying_key = VerifyingKey::recover_from_prehash(digest, &sig, recovery_id)
        .map_err(|_| CryptoError::RecoveryFailed)?;

    Ok(address_of(&verifying_key))
}

/// Ethereum address: last 20 bytes of `keccak256(uncompressed pubkey)`.
fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    // Skip the 0x04 uncompressed-point tag
    let digest = keccak256(&point.as_bytes()[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest[12..]);
    Address(out)
}
