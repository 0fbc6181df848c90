//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/`, `/health` | Health check (returns version) |
//! | `POST` | `/upload` | Multipart upload into the upload directory, then sync of `sync.root` |
//! | `POST` | `/sync` | Sync the configured root, or `{"directory": ...}` |
//! | `POST` | `/ask` | `{"query": ...}` → grounded answer with sources |
//! | `POST` | `/search` | `{"query": ..., "k": ...}` → ranked chunks |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `internal` (500).
//!
//! Sync and upload requests are serialized behind one lock; queries run
//! concurrently with them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use crate::answer::{self, Answer};
use crate::completion::{self, ChatModel};
use crate::config::Config;
use crate::error::Error;
use crate::models::ScoredChunk;
use crate::scanner::ScanOptions;
use crate::sync::{SyncEngine, SyncReport};

/// Largest accepted upload request body.
const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    engine: Arc<SyncEngine>,
    chat: Arc<dyn ChatModel>,
    /// Held for the duration of every sync, including the one after an upload.
    sync_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(config: Config, engine: SyncEngine, chat: Arc<dyn ChatModel>) -> Self {
        Self {
            config: Arc::new(config),
            engine: Arc::new(engine),
            chat,
            sync_lock: Arc::new(Mutex::new(())),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_health))
        .route("/health", get(handle_health))
        .route("/upload", post(handle_upload))
        .route("/sync", post(handle_sync))
        .route("/ask", post(handle_ask))
        .route("/search", post(handle_search))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind`. Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let engine = SyncEngine::from_config(config).await?;
    let chat = completion::create_chat_model(&config.chat)?;
    let state = AppState::new(config.clone(), engine, chat);

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    println!("ragsync server listening on http://{}", bind_addr);
    tracing::info!(bind = %bind_addr, "server started");

    axum::serve(listener, router(state)).await?;
    Ok(())
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

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidInput(message) => bad_request(message),
            other => {
                tracing::error!(error = %other, "request failed");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal",
                    message: other.to_string(),
                }
            }
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /sync ============

#[derive(Debug, Default, Deserialize)]
pub struct SyncRequest {
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

/// The body is optional; an empty body syncs `sync.root`.
pub async fn handle_sync(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SyncReport>, AppError> {
    let req: SyncRequest = if body.iter().all(u8::is_ascii_whitespace) {
        SyncRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| bad_request(format!("invalid sync request: {}", e)))?
    };
    let directory = req
        .directory
        .unwrap_or_else(|| state.config.sync.root.clone());

    let _guard = state.sync_lock.lock().await;
    let outcome = state.engine.sync(&directory).await?;
    Ok(Json(outcome.report))
}

// ============ POST /upload ============

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub saved: Vec<String>,
    pub report: SyncReport,
}

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        if !matches!(field.name(), Some("file") | Some("files")) {
            continue;
        }
        let file_name = field
            .file_name()
            .and_then(|n| Path::new(n).file_name())
            .map(|n| n.to_string_lossy().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| bad_request("uploaded file has no name"))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed to read upload: {}", e)))?;
        files.push((file_name, bytes));
    }

    Ok(Json(store_uploads(&state, files).await?))
}

/// Saves uploaded files into the upload directory and syncs `sync.root`.
///
/// Every file is checked against the scanner's extension set before any of
/// them is written, so a rejected request leaves the directory untouched.
async fn store_uploads(
    state: &AppState,
    files: Vec<(String, Bytes)>,
) -> Result<UploadResponse, AppError> {
    if files.is_empty() {
        return Err(bad_request("no file parts named 'file' or 'files'"));
    }
    let scan = &state.engine.options().scan;
    for (name, _) in &files {
        let supported = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| scan.accepts_extension(ext));
        if !supported {
            return Err(bad_request(format!(
                "unsupported file type: {} (accepted: {})",
                name,
                accepted_extensions(scan)
            )));
        }
    }

    let upload_dir = state.config.upload_dir();
    let _guard = state.sync_lock.lock().await;
    tokio::fs::create_dir_all(upload_dir)
        .await
        .map_err(|e| AppError::from(Error::io(upload_dir, e)))?;

    let mut saved = Vec::with_capacity(files.len());
    for (name, bytes) in files {
        let dest = upload_dir.join(&name);
        tokio::fs::write(&dest, &bytes)
            .await
            .map_err(|e| AppError::from(Error::io(&dest, e)))?;
        tracing::info!(file = %dest.display(), bytes = bytes.len(), "upload saved");
        saved.push(name);
    }

    let outcome = state.engine.sync(&state.config.sync.root).await?;
    Ok(UploadResponse {
        saved,
        report: outcome.report,
    })
}

fn accepted_extensions(scan: &ScanOptions) -> String {
    let mut extensions: Vec<&str> = scan.extensions.iter().map(String::as_str).collect();
    extensions.sort_unstable();
    extensions.join(", ")
}

// ============ POST /ask ============

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub query: String,
    #[serde(default)]
    pub k: Option<usize>,
}

pub async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<Answer>, AppError> {
    let k = req.k.unwrap_or(state.config.retrieval.k).max(1);
    let answer = answer::answer_question(
        state.engine.index().as_ref(),
        state.chat.as_ref(),
        &req.query,
        k,
    )
    .await?;
    Ok(Json(answer))
}

// ============ POST /search ============

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<ScoredChunk>,
}

pub async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let k = req.k.unwrap_or(state.config.retrieval.k).max(1);
    let results = state
        .engine
        .index()
        .similarity_search(req.query.trim(), k)
        .await?;
    Ok(Json(SearchResponse { results }))
}
