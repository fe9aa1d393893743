// Copyright (c) 2026 Pulse Chain Contributors. MIT License.
// See LICENSE for details.

//! # Pulse Chain Node
//!
//! Entry point for the `pulse-node` binary. Parses CLI arguments, initializes
//! logging and metrics, builds the shared chain, and serves it over HTTP
//! and/or the TCP line protocol.
//!
//! The binary supports four subcommands:
//!
//! - `serve`   — HTTP API and TCP protocol on one chain
//! - `http`    — HTTP API only
//! - `tcp`     — TCP protocol only
//! - `version` — print build version information

mod api;
mod cli;
mod logging;
mod metrics;
mod tcp;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinSet;

use pulse_protocol::config::{NOTIFY_CHANNEL_CAPACITY, PROTOCOL_VERSION};
use pulse_protocol::network::{BroadcastNotifier, IngestPipeline};
use pulse_protocol::storage::ChainStore;

use cli::{CommonArgs, Commands, PulseNodeCli};
use metrics::{MetricsState, NodeMetrics};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = PulseNodeCli::parse();

    match cli.command {
        Commands::Serve(args) => run(args.common, Some(args.http_port), Some(args.tcp_port)).await,
        Commands::Http(args) => run(args.common, Some(args.http_port), None).await,
        Commands::Tcp(args) => run(args.common, None, Some(args.tcp_port)).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Builds the chain and runs the requested front-ends until one of them
/// fails or a shutdown signal arrives.
async fn run(common: CommonArgs, http_port: Option<u16>, tcp_port: Option<u16>) -> Result<()> {
    logging::init_logging(logging::DEFAULT_FILTER, common.log_format);

    let policy = common.replace_policy();
    let interval = common.broadcast_interval();
    tracing::info!(
        http_port,
        tcp_port,
        metrics_port = (!common.no_metrics).then_some(common.metrics_port),
        ?policy,
        interval_secs = interval.as_secs(),
        "starting pulse-node"
    );

    // --- Chain ---
    let store = Arc::new(ChainStore::with_genesis().with_policy(policy));
    let notifier =
        BroadcastNotifier::with_settings(Arc::clone(&store), NOTIFY_CHANNEL_CAPACITY, interval);
    let pipeline = IngestPipeline::new(Arc::clone(&store), notifier);

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new());
    node_metrics.refresh(&store);

    let mut servers = JoinSet::new();

    // --- HTTP API ---
    if let Some(port) = http_port {
        let app_state = api::AppState {
            version: format!("{} (protocol {})", env!("CARGO_PKG_VERSION"), PROTOCOL_VERSION),
            pipeline: pipeline.clone(),
            metrics: Arc::clone(&node_metrics),
        };
        let router = api::create_router(app_state);
        let addr = format!("{}:{}", common.bind, port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind HTTP listener on {}", addr))?;
        tracing::info!("HTTP API listening on {}", addr);
        servers.spawn(async move {
            axum::serve(listener, router)
                .await
                .context("HTTP server error")
        });
    }

    // --- TCP protocol ---
    if let Some(port) = tcp_port {
        let addr = format!("{}:{}", common.bind, port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind TCP listener on {}", addr))?;
        tracing::info!("TCP server listening on {}", addr);
        servers.spawn(tcp::serve(
            listener,
            pipeline.clone(),
            Arc::clone(&node_metrics),
        ));
    }

    // --- Metrics server ---
    if !common.no_metrics {
        let metrics_router = axum::Router::new()
            .route("/metrics", axum::routing::get(metrics::metrics_handler))
            .with_state(MetricsState {
                metrics: Arc::clone(&node_metrics),
                store: Arc::clone(&store),
            });
        let addr = format!("{}:{}", common.bind, common.metrics_port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind metrics listener on {}", addr))?;
        tracing::info!("Metrics server listening on {}", addr);
        servers.spawn(async move {
            axum::serve(listener, metrics_router)
                .await
                .context("metrics server error")
        });
    }

    // --- Serve ---
    let result = tokio::select! {
        Some(joined) = servers.join_next() => match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                tracing::error!("{:#}", e);
                Err(e)
            }
            Err(e) => Err(anyhow::Error::new(e).context("server task panicked")),
        },
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, closing listeners");
            Ok(())
        }
    };

    servers.abort_all();
    tracing::info!(length = store.len(), "pulse-node stopped");
    result
}

/// Prints version information to stdout.
fn print_version() {
    println!("pulse-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol   {}", PROTOCOL_VERSION);
    println!("rustc      {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
