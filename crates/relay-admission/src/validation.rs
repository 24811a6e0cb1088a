//! Structural intent validation.
//!
//! Cheap shape checks that run before any stateful step. Anything caught
//! here is a `malformed` reject; semantic checks (signature, amount,
//! funds) have their own reject kinds.

use shared_types::{Address, PaymentIntent, RejectReason};

/// Longest accepted intent nonce. Nonces are opaque client strings; the
/// cap only bounds key sizes in the store.
const MAX_NONCE_LEN: usize = 128;

/// Validates the shape of an inbound intent.
pub fn validate_intent(intent: &PaymentIntent) -> Result<(), RejectReason> {
    if intent.from_address == Address::ZERO {
        return Err(RejectReason::Malformed("from_address is the zero address".into()));
    }
    if intent.to_address == Address::ZERO {
        return Err(RejectReason::Malformed("to_address is the zero address".into()));
    }
    if intent.nonce.is_empty() {
        return Err(RejectReason::Malformed("nonce is empty".into()));
    }
    if intent.nonce.len() > MAX_NONCE_LEN {
        return Err(RejectReason::Malformed(format!(
            "nonce exceeds {MAX_NONCE_LEN} characters"
        )));
    }
    if intent.nonce.contains(':') {
        return Err(RejectReason::Malformed("nonce must not contain ':'".into()));
    }
    if intent.client_id.is_empty() {
        return Err(RejectReason::Malformed("client_id is empty".into()));
    }
    Ok(())
}
