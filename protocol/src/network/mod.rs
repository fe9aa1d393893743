//! # Network Module
//!
//! The producer-facing side of the core: the ingest pipeline every
//! transport calls into, and the broadcast fan-out that tells connected
//! peers about the chain.
//!
//! ```text
//! ingest.rs     — parse → build → validate → commit
//! broadcast.rs  — commit and periodic notifications to observers
//! ```
//!
//! Transports themselves (HTTP, TCP) live in the node binary.

pub mod broadcast;
pub mod ingest;

pub use broadcast::{BroadcastNotifier, Notification, Observer};
pub use ingest::{parse_payload, Candidate, IngestError, IngestPipeline, Submission, SubmitOutcome};
