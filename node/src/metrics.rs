//! # Prometheus Metrics
//!
//! Operational metrics for the node, scraped at `/metrics` on the metrics
//! port. Everything is registered in a dedicated [`prometheus::Registry`]
//! with the `pulse` prefix.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use pulse_protocol::network::{Submission, SubmitOutcome};
use pulse_protocol::storage::ChainStore;
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Candidates that became the new head.
    pub blocks_committed_total: IntCounter,
    /// Valid candidates that lost the replacement race.
    pub candidates_discarded_total: IntCounter,
    /// Candidates that failed validation.
    pub candidates_rejected_total: IntCounter,
    /// Inputs that could not be parsed as a reading.
    pub invalid_inputs_total: IntCounter,
    /// Length of the authoritative chain, read from the store on scrape.
    pub chain_length: IntGauge,
    /// Open TCP and WebSocket observers.
    pub connected_observers: IntGauge,
    /// Time spent in the ingest pipeline per submission.
    pub submit_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("pulse".into()), None)
            .expect("failed to create prometheus registry");

        let blocks_committed_total = IntCounter::new(
            "blocks_committed_total",
            "Total number of candidate blocks committed to the chain",
        )
        .expect("metric creation");
        registry
            .register(Box::new(blocks_committed_total.clone()))
            .expect("metric registration");

        let candidates_discarded_total = IntCounter::new(
            "candidates_discarded_total",
            "Valid candidates discarded because a longer chain was committed first",
        )
        .expect("metric creation");
        registry
            .register(Box::new(candidates_discarded_total.clone()))
            .expect("metric registration");

        let candidates_rejected_total = IntCounter::new(
            "candidates_rejected_total",
            "Candidates that failed validation against their head",
        )
        .expect("metric creation");
        registry
            .register(Box::new(candidates_rejected_total.clone()))
            .expect("metric registration");

        let invalid_inputs_total = IntCounter::new(
            "invalid_inputs_total",
            "Raw inputs that were not a valid integer reading",
        )
        .expect("metric creation");
        registry
            .register(Box::new(invalid_inputs_total.clone()))
            .expect("metric registration");

        let chain_length = IntGauge::new("chain_length", "Number of blocks in the current chain")
            .expect("metric creation");
        registry
            .register(Box::new(chain_length.clone()))
            .expect("metric registration");

        let connected_observers = IntGauge::new(
            "connected_observers",
            "Number of connections currently receiving chain broadcasts",
        )
        .expect("metric creation");
        registry
            .register(Box::new(connected_observers.clone()))
            .expect("metric registration");

        let submit_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "submit_latency_seconds",
                "Time from snapshot to commit decision in seconds",
            )
            .buckets(vec![
                0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1,
            ]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(submit_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            blocks_committed_total,
            candidates_discarded_total,
            candidates_rejected_total,
            invalid_inputs_total,
            chain_length,
            connected_observers,
            submit_latency_seconds,
        }
    }

    /// Record the outcome of one submission.
    pub fn record_submission(&self, submission: &Submission, elapsed: Duration) {
        self.submit_latency_seconds.observe(elapsed.as_secs_f64());
        match &submission.outcome {
            SubmitOutcome::Committed { .. } => self.blocks_committed_total.inc(),
            SubmitOutcome::Discarded { .. } => self.candidates_discarded_total.inc(),
            SubmitOutcome::Rejected(_) => self.candidates_rejected_total.inc(),
        }
    }

    /// Copy point-in-time values from the store into their gauges.
    ///
    /// Submissions finish in any order, so the chain length is taken from
    /// the store here rather than from each outcome.
    pub fn refresh(&self, store: &ChainStore) {
        self.chain_length.set(store.len() as i64);
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics state passed to axum handlers and connection tasks.
pub type SharedMetrics = Arc<NodeMetrics>;

/// State of the `/metrics` router.
#[derive(Clone)]
pub struct MetricsState {
    pub metrics: SharedMetrics,
    pub store: Arc<ChainStore>,
}

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(state): axum::extract::State<MetricsState>,
) -> impl IntoResponse {
    state.metrics.refresh(&state.store);
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_protocol::storage::{Block, ValidationError};

    fn submission(outcome: SubmitOutcome) -> Submission {
        Submission {
            block: Block::genesis_at("2026-01-01T00:00:00Z"),
            outcome,
        }
    }

    #[test]
    fn counters_follow_outcomes() {
        let metrics = NodeMetrics::new();
        let tick = Duration::from_micros(20);

        metrics.record_submission(&submission(SubmitOutcome::Committed { length: 2 }), tick);
        metrics.record_submission(&submission(SubmitOutcome::Discarded { length: 2 }), tick);
        metrics.record_submission(
            &submission(SubmitOutcome::Rejected(ValidationError::PrevHashMismatch {
                index: 1,
            })),
            tick,
        );

        assert_eq!(metrics.blocks_committed_total.get(), 1);
        assert_eq!(metrics.candidates_discarded_total.get(), 1);
        assert_eq!(metrics.candidates_rejected_total.get(), 1);
        // Outcomes never move the length gauge.
        assert_eq!(metrics.chain_length.get(), 0);
        assert_eq!(metrics.submit_latency_seconds.get_sample_count(), 3);
    }

    #[test]
    fn chain_length_follows_store_not_outcome_order() {
        let metrics = NodeMetrics::new();
        let store = ChainStore::new(Block::genesis_at("2026-01-01T00:00:00Z"));
        for payload in [60, 61] {
            let snap = store.snapshot();
            store.try_replace(snap.extended_with(Block::next(snap.head(), payload)));
        }

        // Outcomes reported late and out of order.
        let tick = Duration::from_micros(5);
        metrics.record_submission(&submission(SubmitOutcome::Committed { length: 3 }), tick);
        metrics.record_submission(&submission(SubmitOutcome::Committed { length: 2 }), tick);

        metrics.refresh(&store);
        assert_eq!(metrics.chain_length.get(), 3);
    }

    #[tokio::test]
    async fn handler_reports_current_chain_length() {
        use axum::body::Body;
        use axum::http::Request;
        use http_body_util::BodyExt;
        use tower::ServiceExt;

        let metrics = Arc::new(NodeMetrics::new());
        let store = Arc::new(ChainStore::with_genesis());
        let router = axum::Router::new()
            .route("/metrics", axum::routing::get(metrics_handler))
            .with_state(MetricsState {
                metrics: Arc::clone(&metrics),
                store,
            });

        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("pulse_chain_length 1"));
    }

    #[test]
    fn encode_uses_pulse_prefix() {
        let metrics = NodeMetrics::new();
        metrics.invalid_inputs_total.inc();
        let text = metrics.encode().unwrap();
        assert!(text.contains("pulse_invalid_inputs_total 1"));
        assert!(text.contains("pulse_chain_length"));
    }
}
