//! # Protocol Configuration & Constants
//!
//! Every tunable number of the chain core lives here. The node binary
//! exposes most of them as CLI flags; these are the defaults it falls back
//! to when nothing is specified.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Version string reported by the node and the `version` subcommand.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Genesis
// ---------------------------------------------------------------------------

/// Payload carried by the genesis block.
pub const GENESIS_PAYLOAD: i64 = 0;

/// Predecessor hash of the genesis block. Genesis has no predecessor, so
/// the link field is the empty string.
pub const GENESIS_PREV_HASH: &str = "";

// ---------------------------------------------------------------------------
// Broadcast
// ---------------------------------------------------------------------------

/// How often every observer is re-sent the current chain, whether or not a
/// commit happened in between. Keeps idle TCP peers informed.
pub const BROADCAST_INTERVAL: Duration = Duration::from_secs(30);

/// Same interval in whole seconds, for CLI defaults.
pub const BROADCAST_INTERVAL_SECS: u64 = 30;

/// Capacity of the commit notification channel. An observer that falls
/// more than this many commits behind skips ahead to the latest one.
pub const NOTIFY_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Transports
// ---------------------------------------------------------------------------

/// Default HTTP listen port.
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default TCP line-protocol listen port.
pub const DEFAULT_TCP_PORT: u16 = 9000;

/// Default Prometheus metrics port.
pub const DEFAULT_METRICS_PORT: u16 = 9742;

/// Per-request HTTP timeout.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Prompt written to TCP peers on connect and after every submitted line.
pub const TCP_PROMPT: &str = "Enter a new BPM:";

/// Longest line a TCP peer may send, newline excluded. A longer line gets
/// an error reply and the connection is closed.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// How much of a refused input is kept in the error, in characters.
pub const INPUT_PREVIEW_CHARS: usize = 32;
