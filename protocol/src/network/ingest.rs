//! # Ingest Pipeline
//!
//! Turns one reading from a producer into a commit attempt on the shared
//! chain.
//!
//! ## Pipeline Stages
//!
//! ```text
//! 1. PARSE     — raw text → i64 (submit_raw only)
//! 2. SNAPSHOT  — take a consistent view of the chain
//! 3. BUILD     — candidate block on top of the snapshot's head
//! 4. VALIDATE  — candidate against that same head
//! 5. COMMIT    — ChainStore::replace(snapshot + candidate)
//! 6. NOTIFY    — publish the committed chain to observers
//! ```
//!
//! A candidate that loses the replacement race is dropped, not rebuilt on
//! the new head. The producer still gets back the block it built, with
//! [`SubmitOutcome::Discarded`], and the reading does not appear in the
//! chain.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::INPUT_PREVIEW_CHARS;
use crate::storage::block::Block;
use crate::storage::chain::{ChainSnapshot, ChainStore, ReplaceOutcome};
use crate::storage::validation::{check_block, ValidationError};

use super::broadcast::BroadcastNotifier;

// ---------------------------------------------------------------------------
// Errors & Outcomes
// ---------------------------------------------------------------------------

/// Errors surfaced to the producer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    /// The raw input is not an integer reading. No block was built.
    #[error("invalid input {input:?} ({len} bytes): {reason}")]
    InvalidInput {
        /// Leading part of what the producer sent, at most
        /// [`INPUT_PREVIEW_CHARS`] characters.
        input: String,
        /// Full length of the input in bytes.
        len: usize,
        /// Why it was refused.
        reason: String,
    },
}

/// What happened to a candidate after it was built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The candidate is now the head. `length` is the new chain length.
    Committed { length: usize },
    /// Valid, but another commit got there first. `length` is the chain
    /// length it lost against.
    Discarded { length: usize },
    /// Failed validation against the head it was built on.
    Rejected(ValidationError),
}

/// The block a producer built, and its fate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub block: Block,
    pub outcome: SubmitOutcome,
}

impl Submission {
    pub fn is_committed(&self) -> bool {
        matches!(self.outcome, SubmitOutcome::Committed { .. })
    }
}

/// A built but not yet committed block, together with the snapshot it
/// was built on.
#[derive(Debug, Clone)]
pub struct Candidate {
    base: ChainSnapshot,
    block: Block,
}

impl Candidate {
    pub fn block(&self) -> &Block {
        &self.block
    }

    /// The chain this candidate extends.
    pub fn base(&self) -> &ChainSnapshot {
        &self.base
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a producer's raw reading. Whitespace anywhere in the input is
/// ignored, so `" 7 2 "` reads as `72`.
pub fn parse_payload(raw: &str) -> Result<i64, IngestError> {
    let cleaned: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return Err(invalid_input(raw, "empty input"));
    }
    cleaned
        .parse::<i64>()
        .map_err(|e| invalid_input(raw, e.to_string()))
}

fn invalid_input(raw: &str, reason: impl Into<String>) -> IngestError {
    IngestError::InvalidInput {
        input: raw.chars().take(INPUT_PREVIEW_CHARS).collect(),
        len: raw.len(),
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// IngestPipeline
// ---------------------------------------------------------------------------

/// Per-producer entry point into the chain. Cheap to clone; every clone
/// talks to the same store and notifier.
#[derive(Clone, Debug)]
pub struct IngestPipeline {
    store: Arc<ChainStore>,
    notifier: BroadcastNotifier,
}

impl IngestPipeline {
    pub fn new(store: Arc<ChainStore>, notifier: BroadcastNotifier) -> Self {
        Self { store, notifier }
    }

    /// Pipeline over `store` with a default notifier.
    pub fn with_store(store: Arc<ChainStore>) -> Self {
        let notifier = BroadcastNotifier::new(Arc::clone(&store));
        Self::new(store, notifier)
    }

    pub fn store(&self) -> &Arc<ChainStore> {
        &self.store
    }

    pub fn notifier(&self) -> &BroadcastNotifier {
        &self.notifier
    }

    /// Full current chain, for reads and broadcasts.
    pub fn snapshot(&self) -> ChainSnapshot {
        self.store.snapshot()
    }

    /// Parse `raw` and submit it.
    pub fn submit_raw(&self, raw: &str) -> Result<Submission, IngestError> {
        let payload = parse_payload(raw).map_err(|e| {
            warn!(error = %e, "rejected raw input");
            e
        })?;
        Ok(self.submit(payload))
    }

    /// Build a candidate for `payload` on the current head and try to
    /// commit it.
    pub fn submit(&self, payload: i64) -> Submission {
        self.commit(self.prepare(payload))
    }

    /// Stages 2–3: snapshot and build.
    pub fn prepare(&self, payload: i64) -> Candidate {
        let base = self.store.snapshot();
        let block = Block::next(base.head(), payload);
        debug!(index = block.index, payload, "candidate built");
        Candidate { base, block }
    }

    /// Stages 4–6: validate, replace, notify.
    pub fn commit(&self, candidate: Candidate) -> Submission {
        let Candidate { base, block } = candidate;

        if let Err(e) = check_block(&block, base.head()) {
            warn!(index = block.index, error = %e, "candidate failed validation, dropped");
            return Submission {
                block,
                outcome: SubmitOutcome::Rejected(e),
            };
        }

        let outcome = match self.store.replace(base.extended_with(block.clone())) {
            ReplaceOutcome::Accepted(chain) => {
                let length = chain.len();
                info!(
                    index = block.index,
                    payload = block.payload,
                    hash = %block.hash,
                    length,
                    "block committed"
                );
                debug!("{:#?}", &*chain);
                self.notifier.publish(chain);
                SubmitOutcome::Committed { length }
            }
            ReplaceOutcome::TooShort { current_len } => {
                debug!(
                    index = block.index,
                    current_len, "candidate lost the replacement race, discarded"
                );
                SubmitOutcome::Discarded {
                    length: current_len,
                }
            }
            ReplaceOutcome::Invalid => SubmitOutcome::Discarded {
                length: self.store.len(),
            },
        };

        Submission { block, outcome }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::validation::is_chain_valid;

    fn pipeline() -> IngestPipeline {
        IngestPipeline::with_store(Arc::new(ChainStore::new(Block::genesis_at(
            "2026-01-01T00:00:00Z",
        ))))
    }

    // -- Parsing ------------------------------------------------------------

    #[test]
    fn parses_plain_integer() {
        assert_eq!(parse_payload("60"), Ok(60));
        assert_eq!(parse_payload("-3"), Ok(-3));
    }

    #[test]
    fn strips_whitespace() {
        assert_eq!(parse_payload(" 7 2 "), Ok(72));
        assert_eq!(parse_payload("\t80\r"), Ok(80));
    }

    #[test]
    fn refuses_non_numeric() {
        assert!(matches!(
            parse_payload("abc"),
            Err(IngestError::InvalidInput { ref input, .. }) if input == "abc"
        ));
        assert!(parse_payload("6O").is_err());
        assert!(parse_payload("1.5").is_err());
    }

    #[test]
    fn long_input_is_truncated_in_error() {
        let raw = "x".repeat(1 << 20);
        match parse_payload(&raw) {
            Err(IngestError::InvalidInput { input, len, .. }) => {
                assert_eq!(input.chars().count(), INPUT_PREVIEW_CHARS);
                assert_eq!(len, raw.len());
            }
            other => panic!("expected InvalidInput, got {:?}", other),
        }
        let err = parse_payload(&raw).unwrap_err();
        assert!(err.to_string().len() < 256);
    }

    #[test]
    fn refuses_empty() {
        assert!(parse_payload("").is_err());
        assert!(parse_payload("   ").is_err());
    }

    #[test]
    fn refuses_overflow() {
        assert!(parse_payload("99999999999999999999").is_err());
    }

    // -- Submit -------------------------------------------------------------

    #[test]
    fn submit_commits_on_head() {
        let pipeline = pipeline();
        let genesis = pipeline.store().head();

        let sub = pipeline.submit(60);
        assert!(sub.is_committed());
        assert_eq!(sub.outcome, SubmitOutcome::Committed { length: 2 });
        assert_eq!(sub.block.index, 1);
        assert_eq!(sub.block.prev_hash, genesis.hash);
        assert_eq!(pipeline.store().head(), sub.block);
    }

    #[test]
    fn submit_raw_rejects_garbage_without_touching_chain() {
        let pipeline = pipeline();
        assert!(pipeline.submit_raw("abc").is_err());
        assert_eq!(pipeline.store().len(), 1);
    }

    #[test]
    fn sequential_submits_build_valid_chain() {
        let pipeline = pipeline();
        for bpm in [60, 61, 62, 63] {
            assert!(pipeline.submit(bpm).is_committed());
        }
        let chain = pipeline.snapshot();
        assert_eq!(chain.len(), 5);
        assert!(is_chain_valid(&chain));
    }

    #[test]
    fn race_loser_is_discarded_not_retried() {
        let pipeline = pipeline();
        let a = pipeline.prepare(70);
        let b = pipeline.prepare(80);
        assert_eq!(a.base(), b.base());

        let first = pipeline.commit(a);
        let second = pipeline.commit(b);

        assert!(first.is_committed());
        assert_eq!(second.outcome, SubmitOutcome::Discarded { length: 2 });
        // The loser still gets its block back.
        assert_eq!(second.block.payload, 80);
        assert_eq!(pipeline.store().len(), 2);
        assert_eq!(pipeline.store().head().payload, 70);
    }

    #[test]
    fn tampered_candidate_is_rejected() {
        let pipeline = pipeline();
        let mut candidate = pipeline.prepare(70);
        candidate.block.payload = 71;

        let sub = pipeline.commit(candidate);
        assert!(matches!(
            sub.outcome,
            SubmitOutcome::Rejected(ValidationError::HashMismatch { .. })
        ));
        assert_eq!(pipeline.store().len(), 1);
    }

    #[tokio::test]
    async fn commit_is_published() {
        let pipeline = pipeline();
        let mut observer = pipeline.notifier().subscribe();

        let sub = pipeline.submit(65);
        let note = observer.next().await.expect("notification");
        assert_eq!(note.chain().head(), &sub.block);
    }

    #[tokio::test]
    async fn discarded_candidate_is_not_published() {
        let pipeline = pipeline();
        let a = pipeline.prepare(70);
        let b = pipeline.prepare(80);
        pipeline.commit(a);

        let mut observer = pipeline.notifier().subscribe();
        pipeline.commit(b);
        pipeline.submit(90);

        // The first thing the observer sees is the 90 commit, not the loser.
        let note = observer.next().await.expect("notification");
        assert_eq!(note.chain().head().payload, 90);
    }
}
