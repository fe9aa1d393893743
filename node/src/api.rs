//! # REST + WebSocket API
//!
//! The HTTP front-end over the ingest pipeline. All handlers share one
//! [`AppState`] through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path             | Description                               |
//! |--------|------------------|-------------------------------------------|
//! | GET    | `/`              | Full chain, pretty-printed JSON           |
//! | POST   | `/`              | Submit a reading: `{"payload": 72}`       |
//! | GET    | `/health`        | Liveness probe                            |
//! | GET    | `/status`        | Chain length, head hash, observer count   |
//! | GET    | `/blocks/:index` | One block by index                        |
//! | GET    | `/ws`            | WebSocket push of chain notifications     |
//!
//! `POST /` answers `201 Created` with the block that was built, whether or
//! not it ended up in the chain; the outcome goes to the logs and metrics.
//! The body is decoded as JSON whatever its `Content-Type`. A body that is
//! not `{"payload": <integer>}` gets `400 Bad Request` and leaves the chain
//! untouched. The older `{"BPM": <integer>}` spelling is accepted too.

use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use pulse_protocol::config::HTTP_REQUEST_TIMEOUT;
use pulse_protocol::network::{IngestPipeline, SubmitOutcome};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone; the pipeline and metrics are reference-counted.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// Entry point into the shared chain.
    pub pipeline: IngestPipeline,
    /// Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all routes, CORS, timeouts and
/// request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", get(get_chain_handler).post(write_block_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/blocks/:index", get(block_by_index_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TimeoutLayer::new(HTTP_REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Body of `POST /`.
#[derive(Debug, Serialize, Deserialize)]
pub struct WriteRequest {
    #[serde(alias = "BPM")]
    pub payload: i64,
}

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    /// Number of blocks in the chain.
    pub chain_length: u64,
    /// Hash of the head block.
    pub head_hash: String,
    /// Connections currently receiving broadcasts.
    pub observers: u64,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// Generic error body returned on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /` — the whole chain, indented.
async fn get_chain_handler(State(state): State<AppState>) -> Response {
    let snapshot = state.pipeline.snapshot();
    match serde_json::to_string_pretty(&snapshot) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode chain: {}", e),
        ),
    }
}

/// `POST /` — submit one reading.
async fn write_block_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Response {
    let request = match serde_json::from_slice::<WriteRequest>(&body) {
        Ok(request) => request,
        Err(e) => {
            state.metrics.invalid_inputs_total.inc();
            warn!(error = %e, bytes = body.len(), "rejected write request");
            return error_response(StatusCode::BAD_REQUEST, format!("invalid body: {}", e));
        }
    };

    let started = Instant::now();
    let submission = state.pipeline.submit(request.payload);
    state
        .metrics
        .record_submission(&submission, started.elapsed());

    match &submission.outcome {
        SubmitOutcome::Committed { length } => {
            debug!(index = submission.block.index, length, "http write committed");
        }
        SubmitOutcome::Discarded { length } => {
            debug!(index = submission.block.index, length, "http write lost the race");
        }
        SubmitOutcome::Rejected(e) => {
            warn!(index = submission.block.index, error = %e, "http write failed validation");
        }
    }

    (StatusCode::CREATED, Json(submission.block)).into_response()
}

/// `GET /health` — returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — chain summary.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.pipeline.snapshot();
    Json(StatusResponse {
        version: state.version.clone(),
        chain_length: snapshot.len() as u64,
        head_hash: snapshot.head().hash.clone(),
        observers: state.pipeline.notifier().observer_count() as u64,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `GET /blocks/:index` — one block, or 404 past the head.
async fn block_by_index_handler(
    Path(index): Path<u64>,
    State(state): State<AppState>,
) -> Response {
    let snapshot = state.pipeline.snapshot();
    let block = usize::try_from(index).ok().and_then(|i| snapshot.get(i));
    match block {
        Some(block) => (StatusCode::OK, Json(block.clone())).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("Block not found at index {}", index),
        ),
    }
}

/// `GET /ws` — WebSocket upgrade for chain notifications.
///
/// Clients receive one JSON [`Notification`] per commit and per periodic
/// tick. Client messages are ignored.
///
/// [`Notification`]: pulse_protocol::network::Notification
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Drives a single WebSocket connection until the client disconnects or
/// the notifier goes away.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut observer = state.pipeline.notifier().subscribe();
    state.metrics.connected_observers.inc();

    loop {
        tokio::select! {
            note = observer.next() => {
                let Some(note) = note else { break };
                let payload = match serde_json::to_string(&note) {
                    Ok(s) => s,
                    Err(e) => {
                        warn!("failed to serialize ws notification: {}", e);
                        continue;
                    }
                };
                if socket.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }

    state.metrics.connected_observers.dec();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
