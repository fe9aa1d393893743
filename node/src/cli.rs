//! # CLI Interface
//!
//! Command-line arguments for `pulse-node`, via `clap` derive. Every flag
//! also reads from an environment variable, so a `.env`-style deployment
//! only has to export `ADDR` and `PORT`.

use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use pulse_protocol::config::{
    BROADCAST_INTERVAL_SECS, DEFAULT_HTTP_PORT, DEFAULT_METRICS_PORT, DEFAULT_TCP_PORT,
};
use pulse_protocol::storage::ReplacePolicy;

use crate::logging::LogFormat;

/// Pulse Chain node.
///
/// Keeps one in-memory chain of heart-rate readings and lets any number of
/// HTTP clients and TCP peers extend it concurrently.
#[derive(Parser, Debug)]
#[command(
    name = "pulse-node",
    about = "Pulse Chain node",
    version,
    propagate_version = true
)]
pub struct PulseNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve both the HTTP API and the TCP line protocol.
    Serve(ServeArgs),
    /// Serve only the HTTP API.
    Http(HttpArgs),
    /// Serve only the TCP line protocol.
    Tcp(TcpArgs),
    /// Print version information and exit.
    Version,
}

/// Flags shared by every serving subcommand.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Interface to bind listeners on.
    #[arg(long, env = "PULSE_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "PULSE_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Do not start the metrics endpoint.
    #[arg(long)]
    pub no_metrics: bool,

    /// Seconds between periodic chain broadcasts to connected peers.
    #[arg(
        long,
        env = "PULSE_BROADCAST_INTERVAL_SECS",
        default_value_t = BROADCAST_INTERVAL_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub broadcast_interval_secs: u64,

    /// Re-validate every block of a candidate chain before replacing.
    ///
    /// Off by default: only length decides.
    #[arg(long, env = "PULSE_STRICT_REPLACE")]
    pub strict_replace: bool,

    /// Log output format.
    #[arg(long, value_enum, env = "PULSE_LOG_FORMAT", default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl CommonArgs {
    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_secs(self.broadcast_interval_secs)
    }

    pub fn replace_policy(&self) -> ReplacePolicy {
        if self.strict_replace {
            ReplacePolicy::LongestValidChain
        } else {
            ReplacePolicy::LongestChain
        }
    }
}

/// Arguments for the `serve` subcommand.
#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// HTTP API port.
    #[arg(long, env = "ADDR", default_value_t = DEFAULT_HTTP_PORT)]
    pub http_port: u16,

    /// TCP line-protocol port.
    #[arg(long, env = "PORT", default_value_t = DEFAULT_TCP_PORT)]
    pub tcp_port: u16,
}

/// Arguments for the `http` subcommand.
#[derive(Args, Debug)]
pub struct HttpArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// HTTP API port.
    #[arg(long, env = "ADDR", default_value_t = DEFAULT_HTTP_PORT)]
    pub http_port: u16,
}

/// Arguments for the `tcp` subcommand.
#[derive(Args, Debug)]
pub struct TcpArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// TCP line-protocol port.
    #[arg(long, env = "PORT", default_value_t = DEFAULT_TCP_PORT)]
    pub tcp_port: u16,
}
