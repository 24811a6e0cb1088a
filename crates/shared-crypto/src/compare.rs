//! Constant-time credential comparison.

use subtle::ConstantTimeEq;

/// Compares two strings in constant time with respect to their contents.
///
/// Both inputs are padded to the longer length with different filler
/// bytes, so a length mismatch fails without an early return, and the
/// length check itself also runs through `subtle`.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    let max_len = std::cmp::max(a.len(), b.len());

    let mut a_padded = vec![0u8; max_len];
    let mut b_padded = vec![0xFFu8; max_len];

    a_padded[..a.len()].copy_from_slice(a.as_bytes());
    b_padded[..b.len()].copy_from_slice(b.as_bytes());

    let lengths_equal = a.len().ct_eq(&b.len());
    let contents_equal = a_padded.ct_eq(&b_padded);

    (lengths_equal & contents_equal).into()
}
