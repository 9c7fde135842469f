//! JSON HTTP API over the [`Pipeline`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Liveness check (returns version) |
//! | `GET`  | `/status` | Active document, chunk count, model |
//! | `POST` | `/documents` | Index a file: `{"path": "...", "type": "pdf"}` |
//! | `POST` | `/ask` | Answer a question: `{"question": "...", "k": 4}` |
//! | `POST` | `/reset` | Drop the active document |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "no_document", "message": "no document has been indexed yet; upload a document first" } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `no_document` | 409 |
//! | `document_failed` | 422 |
//! | `backend_unavailable` | 503 |
//! | `bad_request` | 400 |
//! | `internal` | 500 |
//!
//! # Uploads
//!
//! `POST /documents` only indexes files that resolve (after following
//! symlinks and `..`) to a path inside `[server].upload_dir`. Relative paths
//! are taken relative to that directory. Anything else is a 400.
//!
//! # CORS
//!
//! Only `/health` and `/status` carry CORS headers. The routes that index a
//! file, return document text, or drop the index are same-origin only, so a
//! foreign page cannot get a JSON `POST` past the browser preflight.

use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{ErrorCategory, QaError};
use crate::models::{Document, DocumentType, IndexReport, RetrievedChunk, SessionStatus};
use crate::pipeline::Pipeline;

#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
    upload_dir: Arc<PathBuf>,
}

/// Build the pipeline from `config` and serve until the process is stopped.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pipeline = Arc::new(Pipeline::from_config(config).await?);
    tokio::fs::create_dir_all(&config.server.upload_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create upload directory: {}",
                config.server.upload_dir.display()
            )
        })?;
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!("docask server listening on http://{}", config.server.bind);
    println!("docask server listening on http://{}", config.server.bind);
    axum::serve(listener, router(pipeline, &config.server.upload_dir)).await?;
    Ok(())
}

/// The application router. Uploads are confined to `upload_dir`.
pub fn router(pipeline: Arc<Pipeline>, upload_dir: &Path) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    let read_only = Router::new()
        .route("/health", get(handle_health))
        .route("/status", get(handle_status))
        .layer(cors);

    Router::new()
        .route("/documents", post(handle_upload))
        .route("/ask", post(handle_ask))
        .route("/reset", post(handle_reset))
        .merge(read_only)
        .with_state(AppState {
            pipeline,
            upload_dir: Arc::new(upload_dir.to_path_buf()),
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

#[derive(Debug)]
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

impl AppError {
    fn bad_request(message: String) -> Self {
        AppError {
            status: StatusCode::BAD_REQUEST,
            code: ErrorCategory::BadRequest.code().to_string(),
            message,
        }
    }
}

impl From<QaError> for AppError {
    fn from(err: QaError) -> Self {
        let category = err.category();
        let status = match category {
            ErrorCategory::NoDocument => StatusCode::CONFLICT,
            ErrorCategory::DocumentFailed => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCategory::BackendUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCategory::BadRequest => StatusCode::BAD_REQUEST,
            ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if category == ErrorCategory::Internal {
            warn!(error = %err, "internal error");
        }
        AppError {
            status,
            code: category.code().to_string(),
            message: err.to_string(),
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

// ============ GET /status ============

async fn handle_status(State(state): State<AppState>) -> Json<SessionStatus> {
    Json(state.pipeline.status().await)
}

// ============ POST /documents ============

#[derive(Deserialize)]
struct UploadRequest {
    path: PathBuf,
    #[serde(rename = "type")]
    doc_type: Option<String>,
}

async fn handle_upload(
    State(state): State<AppState>,
    Json(req): Json<UploadRequest>,
) -> Result<Json<IndexReport>, AppError> {
    let path = confine(&state.upload_dir, &req.path).await?;
    let doc_type = DocumentType::resolve(&path, req.doc_type.as_deref())?;
    let document = Document::from_path(path, doc_type);
    let report = state.pipeline.rebuild(&document).await?;
    Ok(Json(report))
}

/// Resolve `requested` against `upload_dir` and reject anything that lands
/// outside it.
async fn confine(upload_dir: &Path, requested: &Path) -> Result<PathBuf, AppError> {
    let root = tokio::fs::canonicalize(upload_dir).await.map_err(|e| {
        warn!(dir = %upload_dir.display(), error = %e, "upload directory unavailable");
        AppError::bad_request(format!(
            "upload directory {} is not available",
            upload_dir.display()
        ))
    })?;
    let outside = || {
        AppError::bad_request(format!(
            "{} is not a file inside the upload directory",
            requested.display()
        ))
    };
    let resolved = tokio::fs::canonicalize(root.join(requested))
        .await
        .map_err(|_| outside())?;
    if !resolved.starts_with(&root) {
        warn!(path = %requested.display(), "rejected upload outside upload directory");
        return Err(outside());
    }
    Ok(resolved)
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
    k: Option<usize>,
}

#[derive(Serialize)]
struct AskResponse {
    answer: String,
    sources: Vec<RetrievedChunk>,
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    let answer = state
        .pipeline
        .answer_question_with_k(&req.question, req.k)
        .await?;
    Ok(Json(AskResponse {
        answer: answer.text,
        sources: answer.sources,
    }))
}

// ============ POST /reset ============

async fn handle_reset(State(state): State<AppState>) -> Result<Json<SessionStatus>, AppError> {
    state.pipeline.reset().await?;
    Ok(Json(state.pipeline.status().await))
}
