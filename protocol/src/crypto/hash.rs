//! # Hashing Utilities
//!
//! SHA-256 is the only digest the chain uses. Block hashes are carried as
//! lowercase hex strings, so most callers want [`sha256_hex`] or
//! [`sha256_hex_multi`] rather than raw bytes.

use sha2::{Digest, Sha256};

/// Length of a hex-encoded SHA-256 digest.
pub const HEX_DIGEST_LEN: usize = 64;

/// Compute the SHA-256 hash of the input data.
///
/// # Example
///
/// ```
/// use pulse_protocol::crypto::sha256;
///
/// let hash = sha256(b"pulse");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Compute SHA-256 and return it hex-encoded.
///
/// ```
/// use pulse_protocol::crypto::sha256_hex;
///
/// assert_eq!(
///     sha256_hex(b""),
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
/// );
/// ```
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Hash several byte slices as if they were concatenated, without building
/// the concatenated buffer.
pub fn sha256_hex_multi(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

/// Returns `true` if `s` looks like a digest produced by this module.
pub fn is_hex_digest(s: &str) -> bool {
    s.len() == HEX_DIGEST_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
