// Copyright (c) 2026 Pulse Chain Contributors. MIT License.
// See LICENSE for details.

//! # Pulse Protocol — Core Library
//!
//! A single, shared, hash-linked chain of heart-rate readings that many
//! producers extend at once.
//!
//! Each producer reads the current head, builds the next block on top of
//! it, checks that the block links correctly, and offers "current chain +
//! my block" to the store. The store keeps whichever chain is longest. When
//! two producers build on the same head, the first commit wins and the
//! other candidate is dropped.
//!
//! ## Architecture
//!
//! - **crypto** — SHA-256 helpers.
//! - **storage** — Block, validation rules, and the `ChainStore`.
//! - **network** — the ingest pipeline and the broadcast fan-out.
//! - **config** — defaults and constants.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use pulse_protocol::network::IngestPipeline;
//! use pulse_protocol::storage::ChainStore;
//!
//! let pipeline = IngestPipeline::with_store(Arc::new(ChainStore::with_genesis()));
//! let submission = pipeline.submit_raw("60").unwrap();
//! assert!(submission.is_committed());
//! assert_eq!(pipeline.snapshot().len(), 2);
//! ```

pub mod config;
pub mod crypto;
pub mod network;
pub mod storage;

pub use network::{BroadcastNotifier, IngestError, IngestPipeline, Submission, SubmitOutcome};
pub use storage::{Block, ChainSnapshot, ChainStore, ReplacePolicy};
