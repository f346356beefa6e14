//! HTTP API over a [`Coordinator`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/state` | Sync status snapshot |
//! | `POST` | `/search` | `{query, n_results?}` → ranked chunks |
//! | `POST` | `/sync` | `{batch_size?}` → run one batch now |
//! | `GET`  | `/messages/{id}` | Fetch one message from the mailbox |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `sync_in_progress` (409),
//! `mailbox_unavailable` (502), `embedding_failed` (502), `timeout` (504),
//! `internal` (500).
//!
//! # Background sync
//!
//! When `[sync].background` is set, [`run_server`] also runs
//! [`Coordinator::sync_batch`] every `interval_secs`. Ticks that find a sync
//! already running are skipped.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use mailsift_core::models::{SearchResult, SyncSummary};

use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::error::SyncError;

#[derive(Clone)]
struct AppState {
    coordinator: Arc<Coordinator>,
    default_top_k: usize,
    default_batch_size: usize,
}

/// Build the coordinator, start background sync, and serve until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let coordinator = Arc::new(Coordinator::from_config(config).await?);
    if !coordinator.initialize().await {
        warn!("Mailbox not reachable at startup; sync will retry in the background");
    }

    if config.sync.background {
        spawn_background_sync(
            coordinator.clone(),
            Duration::from_secs(config.sync.interval_secs),
            config.sync.batch_size,
        );
    }

    let app = router(
        coordinator,
        config.retrieval.default_top_k,
        config.sync.batch_size,
    );

    println!("mailsift listening on http://{}", config.server.bind);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Routes with permissive CORS, ready to be served.
pub fn router(coordinator: Arc<Coordinator>, default_top_k: usize, default_batch_size: usize) -> Router {
    let state = AppState {
        coordinator,
        default_top_k,
        default_batch_size,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/state", get(handle_state))
        .route("/search", post(handle_search))
        .route("/sync", post(handle_sync))
        .route("/messages/{*id}", get(handle_message))
        .layer(cors)
        .with_state(state)
}

/// Run `sync_batch` every `interval`, starting immediately.
pub fn spawn_background_sync(
    coordinator: Arc<Coordinator>,
    interval: Duration,
    batch_size: usize,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match coordinator.sync_batch(batch_size).await {
                Ok(processed) if !processed.is_empty() => {
                    info!(messages = processed.len(), "Background sync indexed messages");
                }
                Ok(_) => debug!("Background sync found nothing new"),
                Err(e) if e.is_busy() => debug!("Background sync skipped; sync already running"),
                // Already logged and recorded in the sync state.
                Err(_) => {}
            }
        }
    })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn app_error(status: StatusCode, code: &str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code: code.to_string(),
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    app_error(StatusCode::BAD_REQUEST, "bad_request", message)
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        let message = err.to_string();
        match err {
            SyncError::AlreadySyncing => app_error(StatusCode::CONFLICT, "sync_in_progress", message),
            SyncError::Fetch { .. } => app_error(StatusCode::NOT_FOUND, "not_found", message),
            SyncError::Connectivity(_) => {
                app_error(StatusCode::BAD_GATEWAY, "mailbox_unavailable", message)
            }
            SyncError::Timeout { .. } => app_error(StatusCode::GATEWAY_TIMEOUT, "timeout", message),
            SyncError::Embedding(_) => {
                app_error(StatusCode::BAD_GATEWAY, "embedding_failed", message)
            }
            SyncError::Index(_) | SyncError::State(_) => {
                app_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
            }
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /state ============

#[derive(Serialize)]
struct StateResponse {
    #[serde(flatten)]
    summary: SyncSummary,
    indexed_chunks: usize,
}

async fn handle_state(State(state): State<AppState>) -> Result<Json<StateResponse>, AppError> {
    let summary = state.coordinator.status().summary();
    let indexed_chunks = state.coordinator.indexed_chunks().await?;
    Ok(Json(StateResponse {
        summary,
        indexed_chunks,
    }))
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    n_results: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let top_k = req.n_results.unwrap_or(state.default_top_k);
    if top_k == 0 {
        return Err(bad_request("n_results must be >= 1"));
    }

    let results = state.coordinator.search(&req.query, top_k).await?;
    Ok(Json(SearchResponse { results }))
}

// ============ POST /sync ============

#[derive(Deserialize, Default)]
struct SyncRequest {
    #[serde(default)]
    batch_size: Option<usize>,
}

#[derive(Serialize)]
struct SyncResponse {
    indexed: Vec<String>,
    chunks: usize,
    status: SyncSummary,
}

async fn handle_sync(
    State(state): State<AppState>,
    body: Option<Json<SyncRequest>>,
) -> Result<Json<SyncResponse>, AppError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let batch_size = req.batch_size.unwrap_or(state.default_batch_size);
    if batch_size == 0 {
        return Err(bad_request("batch_size must be >= 1"));
    }

    let processed = state.coordinator.sync_batch(batch_size).await?;
    Ok(Json(SyncResponse {
        chunks: processed.iter().map(|p| p.chunks.len()).sum(),
        indexed: processed.into_iter().map(|p| p.message_id).collect(),
        status: state.coordinator.status().summary(),
    }))
}

// ============ GET /messages/{id} ============

#[derive(Serialize)]
struct MessageResponse {
    id: String,
    subject: String,
    sender: String,
    recipient: String,
    date: String,
    body: String,
}

async fn handle_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let message = state.coordinator.fetch_message(&id).await?;
    Ok(Json(MessageResponse {
        id: message.id,
        subject: message.subject,
        sender: message.sender,
        recipient: message.recipient,
        date: message.date,
        body: message.body,
    }))
}
