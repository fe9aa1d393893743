//! # Block Structure
//!
//! A block is one immutable link of the chain: a single heart-rate reading
//! plus the digest that ties it to its predecessor.
//!
//! ## Block Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Block                                      │
//! │  ├── index: u64         (genesis = 0)       │
//! │  ├── timestamp: String  (RFC 3339, UTC)     │
//! │  ├── payload: i64       (BPM sample)        │
//! │  ├── hash: String       (hex SHA-256)       │
//! │  └── prevHash: String   ("" for genesis)    │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Hash Computation
//!
//! The hash covers `index || timestamp || payload || prevHash`, with the
//! integers rendered in decimal. The hash field itself is not part of the
//! preimage.
//!
//! The JSON form keeps the field order above and spells the link field
//! `prevHash`, which is what HTTP and TCP peers read.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{GENESIS_PAYLOAD, GENESIS_PREV_HASH};
use crate::crypto::hash::sha256_hex_multi;

/// One record of the chain.
///
/// Blocks are never mutated after construction; a new reading always
/// produces a new block via [`Block::next`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Position in the chain, starting at 0 for genesis.
    pub index: u64,
    /// Creation time. Informational only, never validated.
    pub timestamp: String,
    /// The reading carried by this block.
    pub payload: i64,
    /// Hex SHA-256 over the other four fields.
    pub hash: String,
    /// Hash of the predecessor. Empty for genesis.
    #[serde(rename = "prevHash")]
    pub prev_hash: String,
}

impl Block {
    /// Construct the genesis block, stamped with the current time.
    pub fn genesis() -> Self {
        Self::genesis_at(now_timestamp())
    }

    /// Construct the genesis block with an explicit timestamp.
    pub fn genesis_at(timestamp: impl Into<String>) -> Self {
        Self::from_parts(0, timestamp.into(), GENESIS_PAYLOAD, GENESIS_PREV_HASH.to_string())
    }

    /// Build the candidate that extends `parent` with `payload`.
    ///
    /// The new block gets `parent.index + 1`, a fresh timestamp, and links
    /// to `parent.hash`. Its own hash is computed last.
    pub fn next(parent: &Block, payload: i64) -> Self {
        Self::next_at(parent, payload, now_timestamp())
    }

    /// Same as [`Block::next`] with a caller-supplied timestamp.
    pub fn next_at(parent: &Block, payload: i64, timestamp: impl Into<String>) -> Self {
        Self::from_parts(
            parent.index + 1,
            timestamp.into(),
            payload,
            parent.hash.clone(),
        )
    }

    fn from_parts(index: u64, timestamp: String, payload: i64, prev_hash: String) -> Self {
        let hash = calculate_hash(index, &timestamp, payload, &prev_hash);
        Block {
            index,
            timestamp,
            payload,
            hash,
            prev_hash,
        }
    }

    /// Recompute the digest from the content fields.
    pub fn compute_hash(&self) -> String {
        calculate_hash(self.index, &self.timestamp, self.payload, &self.prev_hash)
    }

    /// Whether the stored hash agrees with the content.
    pub fn hash_matches(&self) -> bool {
        self.compute_hash() == self.hash
    }

    /// Whether this block has the genesis shape (index 0, empty link).
    pub fn is_genesis(&self) -> bool {
        self.index == 0 && self.prev_hash == GENESIS_PREV_HASH
    }
}

/// Compute the integrity digest of a block from its four content fields.
///
/// Pure and total: the same inputs always give the same 64-character hex
/// string.
pub fn calculate_hash(index: u64, timestamp: &str, payload: i64, prev_hash: &str) -> String {
    let index = index.to_string();
    let payload = payload.to_string();
    sha256_hex_multi(&[
        index.as_bytes(),
        timestamp.as_bytes(),
        payload.as_bytes(),
        prev_hash.as_bytes(),
    ])
}

/// Current UTC time in the format blocks carry.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
