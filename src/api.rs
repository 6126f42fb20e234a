//! HTTP surface for the PDF question-answering service.
//!
//! - `POST /api/upload-pdf` – Multipart upload (field `file`). Stores the PDF, fingerprints its
//!   contents, and ingests it unless an index already exists. Returns `{file_hash, filename}`.
//! - `POST /api/ask-question` – JSON `{question, file_hash}`; returns `{answer, file_hash}`.
//! - `GET /api/metrics` – Ingestion and query counters.
//! - `GET /`, `GET /api/` – Liveness probes.
//!
//! Failures are rendered as `{"detail": "<message>"}` with a status derived from the error kind.

use crate::metrics::MetricsSnapshot;
use crate::processing::{DocumentApi, ServiceError};
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Title reported by the probe endpoints.
pub const API_TITLE: &str = "PDF Question Answering API";

/// Allowance for multipart boundaries and part headers on top of the file size limit.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared handler state: the document service and the per-file size limit.
struct AppState<S> {
    service: Arc<S>,
    max_upload_bytes: usize,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            max_upload_bytes: self.max_upload_bytes,
        }
    }
}

/// Build the HTTP router exposing the upload and question endpoints.
pub fn create_router<S>(service: Arc<S>, max_upload_bytes: usize) -> Router
where
    S: DocumentApi + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/api", get(root))
        .route("/api/", get(root))
        .route(
            "/api/upload-pdf",
            post(upload_pdf::<S>).layer(DefaultBodyLimit::max(
                max_upload_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES),
            )),
        )
        .route("/api/ask-question", post(ask_question::<S>))
        .route("/api/metrics", get(get_metrics::<S>))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState {
            service,
            max_upload_bytes,
        })
}

/// Response body for the probe endpoints.
#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

async fn root() -> Json<MessageResponse> {
    Json(MessageResponse { message: API_TITLE })
}

/// Success response for `POST /api/upload-pdf`.
#[derive(Serialize)]
struct UploadResponse {
    /// SHA-256 fingerprint of the uploaded bytes.
    file_hash: String,
    /// Name the file was stored under.
    filename: String,
}

/// Accept a PDF upload and make sure it is indexed.
///
/// Only the `file` field is read; other fields are ignored. A file larger than the configured
/// limit is rejected with `413`, whether the transport or the size check catches it.
async fn upload_pdf<S>(
    State(state): State<AppState<S>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError>
where
    S: DocumentApi,
{
    let mut multipart = multipart?;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let contents = field.bytes().await?;
        tracing::debug!(filename = %filename, bytes = contents.len(), "Received upload");
        if contents.len() > state.max_upload_bytes {
            tracing::warn!(
                filename = %filename,
                bytes = contents.len(),
                limit = state.max_upload_bytes,
                "Upload exceeds size limit"
            );
            return Err(AppError {
                status: StatusCode::PAYLOAD_TOO_LARGE,
                detail: format!(
                    "File too large. The limit is {} bytes.",
                    state.max_upload_bytes
                ),
            });
        }

        let outcome = state.service.upload_document(&filename, &contents).await?;
        tracing::info!(
            filename = %outcome.filename,
            fingerprint = %outcome.fingerprint,
            cache_hit = outcome.cache_hit,
            "Upload request completed"
        );
        return Ok(Json(UploadResponse {
            file_hash: outcome.fingerprint.to_string(),
            filename: outcome.filename,
        }));
    }

    Err(ServiceError::InvalidInput("No file provided".to_string()).into())
}

/// Request body for `POST /api/ask-question`.
#[derive(Deserialize)]
struct AskRequest {
    question: String,
    file_hash: String,
}

/// Success response for `POST /api/ask-question`.
#[derive(Serialize)]
struct AskResponse {
    answer: String,
    file_hash: String,
}

/// Answer a question against a previously uploaded document.
async fn ask_question<S>(
    State(state): State<AppState<S>>,
    request: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, AppError>
where
    S: DocumentApi,
{
    let Json(AskRequest {
        question,
        file_hash,
    }) = request?;
    let outcome = state.service.answer_question(&question, &file_hash).await?;
    Ok(Json(AskResponse {
        answer: outcome.answer,
        file_hash: outcome.fingerprint.to_string(),
    }))
}

/// Return the service counters.
async fn get_metrics<S>(State(state): State<AppState<S>>) -> Json<MetricsSnapshot>
where
    S: DocumentApi,
{
    Json(state.service.metrics_snapshot())
}

/// Error body rendered for every failed request.
#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

struct AppError {
    status: StatusCode,
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(inner: ServiceError) -> Self {
        let status = match &inner {
            ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Permission(_) => StatusCode::FORBIDDEN,
            ServiceError::Processing(_)
            | ServiceError::Answering(_)
            | ServiceError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %inner, "Request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %inner, "Request rejected");
        }
        Self {
            status,
            detail: inner.to_string(),
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(inner: MultipartError) -> Self {
        let status = inner.status();
        tracing::warn!(status = status.as_u16(), error = %inner, "Multipart upload rejected");
        Self {
            status,
            detail: inner.body_text(),
        }
    }
}

impl From<MultipartRejection> for AppError {
    fn from(inner: MultipartRejection) -> Self {
        tracing::warn!(error = %inner, "Upload request is not multipart");
        Self {
            status: inner.status(),
            detail: inner.body_text(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(inner: JsonRejection) -> Self {
        tracing::warn!(error = %inner, "Malformed question request");
        Self {
            status: inner.status(),
            detail: inner.body_text(),
        }
    }
}
