//! HTTP surface for the document backend.
//!
//! This module exposes a compact Axum router:
//!
//! - `GET /`, `GET /health` – Liveness plus whether the vector index is connected.
//! - `POST /api/chat` – Answer `{ "query": .. }` from indexed documents. Always 200; outages
//!   produce a fixed answer without `context`.
//! - `POST /api/upload` – Multipart upload (`file` field). Stores, summarizes, and indexes.
//! - `GET /api/documents` – Stored documents with summaries and optional presigned links.
//! - `GET /api/download/:filename` – Raw bytes as an attachment.
//!
//! Only object storage failures produce error statuses; every other dependency degrades.

use crate::config::Config;
use crate::index::IndexState;
use crate::pipeline::{DocumentEntry, PipelineApi, PipelineError, UploadOutcome};
use crate::storage::StorageError;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State, multipart::MultipartError},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Service name reported by the health endpoints.
pub const SERVICE_NAME: &str = "pbs-rag";

/// Transport-level settings applied around the routes.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    /// Origins allowed by CORS; empty allows any origin.
    pub cors_allowed_origins: Vec<String>,
    /// Largest accepted request body, in bytes.
    pub max_upload_bytes: usize,
}

impl RouterOptions {
    /// Take router settings from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            cors_allowed_origins: config.cors_allowed_origins.clone(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    fn cors_layer(&self) -> CorsLayer {
        let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
        if self.cors_allowed_origins.is_empty() {
            return layer.allow_origin(Any);
        }
        let origins: Vec<HeaderValue> = self
            .cors_allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

/// Build the HTTP router over a shared pipeline.
pub fn create_router<S>(service: Arc<S>, options: RouterOptions) -> Router
where
    S: PipelineApi + 'static,
{
    Router::new()
        .route("/", get(health::<S>))
        .route("/health", get(health::<S>))
        .route("/api/chat", post(chat::<S>))
        .route("/api/upload", post(upload_document::<S>))
        .route("/api/documents", get(list_documents::<S>))
        .route("/api/download/:filename", get(download_document::<S>))
        .layer(DefaultBodyLimit::max(options.max_upload_bytes))
        .layer(options.cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    index_ready: bool,
}

async fn health<S>(State(service): State<Arc<S>>) -> Json<HealthResponse>
where
    S: PipelineApi,
{
    Json(HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
        index_ready: service.index_state() == IndexState::Ready,
    })
}

/// Request body for `POST /api/chat`.
#[derive(Deserialize)]
struct ChatRequest {
    query: String,
}

/// Response body for `POST /api/chat`.
#[derive(Serialize)]
struct ChatResponse {
    answer: String,
    /// Passages the answer was grounded on; omitted on fallback answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<String>,
}

async fn chat<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<ChatRequest>,
) -> Json<ChatResponse>
where
    S: PipelineApi,
{
    let answer = service.chat(&request.query).await;
    tracing::info!(grounded = answer.context.is_some(), "Chat request completed");
    Json(ChatResponse {
        answer: answer.answer,
        context: answer.context,
    })
}

/// Response body for `POST /api/upload`.
#[derive(Serialize)]
struct UploadResponse {
    message: &'static str,
    filename: String,
    summary: String,
}

impl From<UploadOutcome> for UploadResponse {
    fn from(outcome: UploadOutcome) -> Self {
        Self {
            message: outcome.message(),
            filename: outcome.filename,
            summary: outcome.summary,
        }
    }
}

/// Store the `file` part of a multipart body and run it through the upload pipeline.
async fn upload_document<S>(
    State(service): State<Arc<S>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError>
where
    S: PipelineApi,
{
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = match field.file_name() {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => return Err(AppError::BadRequest("file part has no filename")),
        };
        let bytes = field.bytes().await?;
        let outcome = service.upload(&filename, bytes.to_vec()).await?;
        tracing::info!(
            filename = %outcome.filename,
            status = ?outcome.status,
            "Upload request completed"
        );
        return Ok(Json(outcome.into()));
    }
    Err(AppError::BadRequest("missing multipart field `file`"))
}

/// One entry of `GET /api/documents`.
#[derive(Serialize)]
struct DocumentResponse {
    id: usize,
    title: String,
    filename: String,
    date: String,
    summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
}

impl From<DocumentEntry> for DocumentResponse {
    fn from(entry: DocumentEntry) -> Self {
        Self {
            id: entry.id,
            title: entry.title,
            filename: entry.filename,
            date: entry.date,
            summary: entry.summary,
            url: entry.url,
        }
    }
}

async fn list_documents<S>(
    State(service): State<Arc<S>>,
) -> Result<Json<Vec<DocumentResponse>>, AppError>
where
    S: PipelineApi,
{
    let documents = service.list_documents().await?;
    Ok(Json(documents.into_iter().map(Into::into).collect()))
}

async fn download_document<S>(
    State(service): State<Arc<S>>,
    Path(filename): Path<String>,
) -> Result<Response, AppError>
where
    S: PipelineApi,
{
    let download = service.download(&filename).await?;
    let disposition = content_disposition(&download.filename);
    Ok((
        [
            (header::CONTENT_TYPE, download.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        download.bytes,
    )
        .into_response())
}

/// `attachment` disposition with an ASCII fallback name and an RFC 5987 UTF-8 name.
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            ch if ch.is_ascii_graphic() || ch == ' ' => ch,
            _ => '_',
        })
        .collect();
    if filename.is_ascii() && fallback == filename {
        return format!("attachment; filename=\"{fallback}\"");
    }
    let encoded = urlencoding::encode(filename);
    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

enum AppError {
    Pipeline(PipelineError),
    Multipart(MultipartError),
    BadRequest(&'static str),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::Pipeline(PipelineError::Storage(StorageError::NotFound(key))) => {
                (StatusCode::NOT_FOUND, format!("Document not found: {key}")).into_response()
            }
            Self::Pipeline(error) => {
                tracing::error!(error = %error, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response()
            }
            Self::Multipart(error) => error.into_response(),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(inner: PipelineError) -> Self {
        Self::Pipeline(inner)
    }
}

impl From<MultipartError> for AppError {
    fn from(inner: MultipartError) -> Self {
        Self::Multipart(inner)
    }
}
