//! # Cryptographic Primitives
//!
//! Thin wrappers around `sha2`. The chain only needs a collision-resistant
//! digest for its integrity links; there are no keys or signatures.

pub mod hash;

pub use hash::{is_hex_digest, sha256, sha256_hex, sha256_hex_multi};
