//! # Chain Store
//!
//! The single authoritative chain of the process and its replacement
//! policy.
//!
//! ## Concurrency
//!
//! The chain is held as an immutable [`ChainSnapshot`] behind a
//! `parking_lot::RwLock`. Readers clone the `Arc` under the read lock and
//! work on their copy with no lock held. Replacement takes the write lock,
//! compares lengths, and swaps the pointer in one critical section. Two
//! producers that built on the same head therefore cannot both win: the
//! second one sees a chain of equal length and is discarded.
//!
//! ## Fork choice
//!
//! [`ReplacePolicy::LongestChain`] accepts any strictly longer candidate
//! without looking at its content. Every candidate produced in this process
//! extends a real snapshot, and only one chain of each length is ever
//! accepted, so the length check alone keeps links intact here. A caller
//! that hands in chains from elsewhere should opt into
//! [`ReplacePolicy::LongestValidChain`].

use std::ops::Deref;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};

use super::block::Block;
use super::validation::check_chain;

// ---------------------------------------------------------------------------
// ChainSnapshot
// ---------------------------------------------------------------------------

/// Immutable, shared view of the chain at one instant.
///
/// Cloning is a reference-count bump. A snapshot is never empty: it always
/// contains at least the genesis block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainSnapshot(Arc<[Block]>);

impl ChainSnapshot {
    /// The last block.
    pub fn head(&self) -> &Block {
        // Non-empty by construction.
        &self.0[self.0.len() - 1]
    }

    /// Copy the blocks and append `block`, producing a candidate chain.
    pub fn extended_with(&self, block: Block) -> Vec<Block> {
        let mut blocks = Vec::with_capacity(self.0.len() + 1);
        blocks.extend_from_slice(&self.0);
        blocks.push(block);
        blocks
    }
}

impl Deref for ChainSnapshot {
    type Target = [Block];

    fn deref(&self) -> &[Block] {
        &self.0
    }
}

impl Serialize for ChainSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.as_ref().serialize(serializer)
    }
}

// ---------------------------------------------------------------------------
// ReplacePolicy
// ---------------------------------------------------------------------------

/// Rule deciding whether a candidate chain replaces the current one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReplacePolicy {
    /// Accept iff the candidate is strictly longer. Content is not checked.
    #[default]
    LongestChain,
    /// Accept iff the candidate is strictly longer and every link in it is
    /// valid.
    LongestValidChain,
}

/// Result of [`ChainStore::replace`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// The candidate is now the authoritative chain.
    Accepted(ChainSnapshot),
    /// The candidate was not long enough. `current_len` is the length it
    /// lost against.
    TooShort { current_len: usize },
    /// Strict policy only: the candidate failed whole-chain validation.
    Invalid,
}

// ---------------------------------------------------------------------------
// ChainStore
// ---------------------------------------------------------------------------

/// Owner of the authoritative chain. Share it behind an `Arc`.
#[derive(Debug)]
pub struct ChainStore {
    chain: RwLock<ChainSnapshot>,
    policy: ReplacePolicy,
}

impl ChainStore {
    /// Create a store whose chain is just `genesis`.
    pub fn new(genesis: Block) -> Self {
        Self {
            chain: RwLock::new(ChainSnapshot(Arc::from(vec![genesis]))),
            policy: ReplacePolicy::default(),
        }
    }

    /// Create a store with a freshly stamped genesis block.
    pub fn with_genesis() -> Self {
        let genesis = Block::genesis();
        info!(hash = %genesis.hash, timestamp = %genesis.timestamp, "genesis block created");
        debug!("{:#?}", genesis);
        Self::new(genesis)
    }

    /// Set the replacement policy.
    pub fn with_policy(mut self, policy: ReplacePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> ReplacePolicy {
        self.policy
    }

    /// A consistent view of the whole chain.
    pub fn snapshot(&self) -> ChainSnapshot {
        self.chain.read().clone()
    }

    /// Clone of the current head block.
    pub fn head(&self) -> Block {
        self.chain.read().head().clone()
    }

    /// Number of blocks in the current chain (at least 1).
    pub fn len(&self) -> usize {
        self.chain.read().len()
    }

    /// Always `false`; a store holds at least genesis.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Replace the chain with `candidate` if the policy allows it.
    pub fn replace(&self, candidate: Vec<Block>) -> ReplaceOutcome {
        // Content checks need no lock: the candidate is ours.
        if self.policy == ReplacePolicy::LongestValidChain {
            if let Err(e) = check_chain(&candidate) {
                warn!(len = candidate.len(), error = %e, "rejecting invalid candidate chain");
                return ReplaceOutcome::Invalid;
            }
        }

        let mut current = self.chain.write();
        if candidate.len() <= current.len() {
            let current_len = current.len();
            drop(current);
            debug!(
                candidate_len = candidate.len(),
                current_len, "candidate chain not longer than current, discarded"
            );
            return ReplaceOutcome::TooShort { current_len };
        }

        let accepted = ChainSnapshot(Arc::from(candidate));
        *current = accepted.clone();
        drop(current);

        info!(
            len = accepted.len(),
            head = %accepted.head().hash,
            "chain replaced"
        );
        ReplaceOutcome::Accepted(accepted)
    }

    /// Boolean form of [`ChainStore::replace`].
    pub fn try_replace(&self, candidate: Vec<Block>) -> bool {
        matches!(self.replace(candidate), ReplaceOutcome::Accepted(_))
    }
}

impl Default for ChainStore {
    fn default() -> Self {
        Self::with_genesis()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::validation::is_chain_valid;

    const TS: &str = "2026-01-01T00:00:00Z";

    fn store() -> ChainStore {
        ChainStore::new(Block::genesis_at(TS))
    }

    fn extend(store: &ChainStore, payload: i64) -> Vec<Block> {
        let snap = store.snapshot();
        let next = Block::next_at(snap.head(), payload, TS);
        snap.extended_with(next)
    }

    #[test]
    fn new_store_holds_only_genesis() {
        let store = store();
        assert_eq!(store.len(), 1);
        assert!(!store.is_empty());
        assert!(store.head().is_genesis());
        assert_eq!(store.policy(), ReplacePolicy::LongestChain);
    }

    #[test]
    fn accepts_strictly_longer_chain() {
        let store = store();
        let candidate = extend(&store, 60);
        assert!(store.try_replace(candidate.clone()));
        assert_eq!(store.len(), 2);
        assert_eq!(store.head(), candidate[1]);
    }

    #[test]
    fn rejects_equal_length_chain() {
        let store = store();
        let a = extend(&store, 60);
        let b = extend(&store, 61);
        assert!(store.try_replace(a.clone()));
        assert_eq!(store.replace(b), ReplaceOutcome::TooShort { current_len: 2 });
        assert_eq!(store.head(), a[1]);
    }

    #[test]
    fn rejects_shorter_chain() {
        let store = store();
        let two = extend(&store, 60);
        store.try_replace(two.clone());
        let three = extend(&store, 61);
        store.try_replace(three);

        assert!(!store.try_replace(two));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn rejects_empty_candidate() {
        let store = store();
        assert!(!store.try_replace(Vec::new()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn rejection_ignores_content_validity() {
        // A perfectly valid but equal-length chain still loses.
        let store = store();
        store.try_replace(extend(&store, 60));
        let rival = {
            let genesis = store.snapshot()[0].clone();
            let b1 = Block::next_at(&genesis, 99, TS);
            vec![genesis, b1]
        };
        assert!(is_chain_valid(&rival));
        assert!(!store.try_replace(rival));
    }

    #[test]
    fn default_policy_accepts_longer_chain_with_broken_link() {
        // Known weakness of length-only fork choice: history is not
        // re-validated.
        let store = store();
        let mut candidate = extend(&store, 60);
        candidate[1].prev_hash = "not-the-genesis-hash".into();
        assert!(!is_chain_valid(&candidate));

        assert!(store.try_replace(candidate));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn strict_policy_rejects_longer_invalid_chain() {
        let store = store().with_policy(ReplacePolicy::LongestValidChain);
        let mut candidate = extend(&store, 60);
        candidate[1].payload = 0;

        assert_eq!(store.replace(candidate), ReplaceOutcome::Invalid);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn strict_policy_accepts_longer_valid_chain() {
        let store = store().with_policy(ReplacePolicy::LongestValidChain);
        assert!(store.try_replace(extend(&store, 60)));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn snapshots_are_isolated_from_later_commits() {
        let store = store();
        let before = store.snapshot();
        store.try_replace(extend(&store, 60));
        assert_eq!(before.len(), 1);
        assert_eq!(store.snapshot().len(), 2);
    }

    #[test]
    fn accepted_outcome_carries_new_chain() {
        let store = store();
        let candidate = extend(&store, 60);
        match store.replace(candidate.clone()) {
            ReplaceOutcome::Accepted(snap) => assert_eq!(&*snap, candidate.as_slice()),
            other => panic!("expected acceptance, got {:?}", other),
        }
    }

    #[test]
    fn snapshot_serializes_as_array() {
        let store = store();
        let json = serde_json::to_value(store.snapshot()).unwrap();
        let arr = json.as_array().expect("array");
        assert_eq!(arr.len(), 1);
        assert_eq!(arr[0]["prevHash"], "");
        assert_eq!(arr[0]["index"], 0);
    }
}
