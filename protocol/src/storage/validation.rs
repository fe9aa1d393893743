//! Block and chain validation.
//!
//! A candidate extends a predecessor when three checks pass, in this
//! order: index continuity, hash link, digest consistency. The first
//! failing check is reported; later ones are not evaluated.

use thiserror::Error;
use tracing::debug;

use super::block::Block;

/// Why a candidate does not extend its predecessor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// `candidate.index != predecessor.index + 1`.
    #[error("index mismatch: expected {expected}, got {got}")]
    IndexMismatch {
        /// The index the candidate should have had.
        expected: u64,
        /// The index it carries.
        got: u64,
    },

    /// `candidate.prev_hash != predecessor.hash`.
    #[error("block {index} does not link to its predecessor")]
    PrevHashMismatch {
        /// Index of the offending block.
        index: u64,
    },

    /// Stored hash disagrees with the recomputed digest.
    #[error("block {index} hash mismatch: stored={stored}, computed={computed}")]
    HashMismatch {
        /// Index of the offending block.
        index: u64,
        /// Hash carried by the block.
        stored: String,
        /// Hash recomputed from its content.
        computed: String,
    },
}

/// Why a whole chain is not valid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainValidationError {
    #[error("chain is empty")]
    Empty,

    #[error("first block is not a genesis block (index {index})")]
    BadGenesis { index: u64 },

    #[error("invalid link at position {position}: {source}")]
    Link {
        position: usize,
        #[source]
        source: ValidationError,
    },
}

/// Check that `candidate` legally extends `predecessor`.
pub fn check_block(candidate: &Block, predecessor: &Block) -> Result<(), ValidationError> {
    let expected = predecessor.index + 1;
    if candidate.index != expected {
        return Err(ValidationError::IndexMismatch {
            expected,
            got: candidate.index,
        });
    }

    if candidate.prev_hash != predecessor.hash {
        return Err(ValidationError::PrevHashMismatch {
            index: candidate.index,
        });
    }

    let computed = candidate.compute_hash();
    if computed != candidate.hash {
        return Err(ValidationError::HashMismatch {
            index: candidate.index,
            stored: candidate.hash.clone(),
            computed,
        });
    }

    Ok(())
}

/// Boolean form of [`check_block`]. Never panics, never mutates.
pub fn is_block_valid(candidate: &Block, predecessor: &Block) -> bool {
    match check_block(candidate, predecessor) {
        Ok(()) => true,
        Err(e) => {
            debug!(index = candidate.index, error = %e, "candidate failed validation");
            false
        }
    }
}

/// Check a whole chain: genesis shape, then every consecutive pair.
pub fn check_chain(chain: &[Block]) -> Result<(), ChainValidationError> {
    let genesis = chain.first().ok_or(ChainValidationError::Empty)?;
    if !genesis.is_genesis() {
        return Err(ChainValidationError::BadGenesis {
            index: genesis.index,
        });
    }

    for (position, pair) in chain.windows(2).enumerate() {
        check_block(&pair[1], &pair[0]).map_err(|source| ChainValidationError::Link {
            position: position + 1,
            source,
        })?;
    }

    Ok(())
}

/// Boolean form of [`check_chain`].
pub fn is_chain_valid(chain: &[Block]) -> bool {
    check_chain(chain).is_ok()
}
