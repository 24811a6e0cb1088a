//! Keccak-256 hashing.

use sha3::{Digest, Keccak256};

/// Computes the Keccak-256 digest of `data`.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Computes the EIP-191 personal-message digest of `message`:
/// `keccak256("\x19Ethereum Signed Message:\n" || len(message) || message)`.
///
/// This is the digest wallets produce for `personal_sign`, and the one
/// intent signatures are verified against.
pub fn personal_message_hash(message: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(b"\x19Ethereum Signed Message:\n");
    hasher.update(message.len().to_string().as_bytes());
    hasher.update(message);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak256_empty() {
        // Well-known Keccak-256 of the empty string
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_personal_message_prefix_changes_digest() {
        let msg = b"hello";
        assert_ne!(keccak256(msg), personal_message_hash(msg));
    }

    #[test]
    fn test_personal_message_known_vector() {
        // personal_sign digest of "hello" (length prefix "5")
        let digest = personal_message_hash(b"hello");
        assert_eq!(
            hex::encode(digest),
            "50b2c43fd39106bafbba0da34fc430e1f91e3c96ea2acee2bc34119f92b37750"
        );
    }
}
