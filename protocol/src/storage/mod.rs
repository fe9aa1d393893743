//! # Storage Module
//!
//! The in-memory chain: block structure, validation rules, and the shared
//! store that every producer commits into.
//!
//! ## Architecture
//!
//! ```text
//! block.rs       — Block structure, genesis, hash computation
//! validation.rs  — candidate-vs-predecessor and whole-chain checks
//! chain.rs       — ChainStore, snapshots, replacement policy
//! ```
//!
//! Nothing here touches the disk. The chain lives for as long as the
//! process does.

pub mod block;
pub mod chain;
pub mod validation;

pub use block::{calculate_hash, Block};
pub use chain::{ChainSnapshot, ChainStore, ReplaceOutcome, ReplacePolicy};
pub use validation::{
    check_block, check_chain, is_block_valid, is_chain_valid, ChainValidationError,
    ValidationError,
};
