//! HTTP surface for docsift.
//!
//! This module exposes an Axum router over the document pipeline:
//!
//! - `POST /sessions` – Start a session and return its id.
//! - `DELETE /sessions/:id` – Forget a session.
//! - `GET /sessions/:id/documents` – List document names held by the session.
//! - `POST /sessions/:id/documents` – Multipart upload; files are saved, extracted, and stored.
//! - `POST /sessions/:id/reset` – Clear the session's documents.
//! - `POST /sessions/:id/query` – Answer a question once per session document.
//! - `POST /sessions/:id/themes` – Identify themes across the session's documents.
//! - `POST /embeddings` – Store `{source_key: text}` documents directly.
//! - `POST /query` – Answer a question over the whole store with citations.
//! - `GET /metrics`, `GET /health`, `GET /commands` – Diagnostics and discovery.
//!
//! The HTTP surface shares the same pipeline with the MCP server, so behavior is identical
//! across interfaces.

use crate::engine::{Answer, EngineError, ThemeRecord};
use crate::metrics::MetricsSnapshot;
use crate::pipeline::{DocumentAnswer, HealthSnapshot, IngestOutcome, PipelineApi, PipelineError};
use crate::store::{StoreError, UpsertSummary};
use crate::upload::{UploadError, UploadedFile};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Build the HTTP router exposing the pipeline.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: PipelineApi + 'static,
{
    Router::new()
        .route("/sessions", post(create_session::<S>))
        .route("/sessions/:id", axum::routing::delete(remove_session::<S>))
        .route(
            "/sessions/:id/documents",
            get(list_documents::<S>).post(upload_documents::<S>),
        )
        .route("/sessions/:id/reset", post(reset_session::<S>))
        .route("/sessions/:id/query", post(query_session::<S>))
        .route("/sessions/:id/themes", post(session_themes::<S>))
        .route("/embeddings", post(store_embeddings::<S>))
        .route("/query", post(answer_query::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/health", get(get_health::<S>))
        .route("/commands", get(get_commands))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(service)
}

/// Response body for `POST /sessions`.
#[derive(Serialize, Deserialize)]
struct SessionResponse {
    session_id: String,
}

async fn create_session<S>(State(service): State<Arc<S>>) -> (StatusCode, Json<SessionResponse>)
where
    S: PipelineApi,
{
    let session_id = service.create_session().await;
    tracing::info!(session_id = %session_id, "Session created via HTTP");
    (StatusCode::CREATED, Json(SessionResponse { session_id }))
}

async fn remove_session<S>(
    State(service): State<Arc<S>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError>
where
    S: PipelineApi,
{
    service.remove_session(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reset_session<S>(
    State(service): State<Arc<S>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError>
where
    S: PipelineApi,
{
    service.reset_session(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Response body for `GET /sessions/:id/documents`.
#[derive(Serialize)]
struct DocumentsResponse {
    documents: Vec<String>,
}

async fn list_documents<S>(
    State(service): State<Arc<S>>,
    Path(id): Path<String>,
) -> Result<Json<DocumentsResponse>, AppError>
where
    S: PipelineApi,
{
    let documents = service.session_documents(&id).await?;
    Ok(Json(DocumentsResponse { documents }))
}

/// Accept multipart file fields, save them, and ingest them into the session.
///
/// Fields without a file name are ignored.
async fn upload_documents<S>(
    State(service): State<Arc<S>>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<IngestOutcome>, AppError>
where
    S: PipelineApi,
{
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| AppError::bad_request(error.to_string()))?
    {
        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|error| AppError::bad_request(error.to_string()))?;
        files.push(UploadedFile::new(name, bytes.to_vec()));
    }

    if files.is_empty() {
        return Err(AppError::bad_request("no files in upload"));
    }

    let outcome = service.ingest_uploads(&id, files).await?;
    tracing::info!(
        session_id = %id,
        processed = outcome.processed.len(),
        inserted = outcome.inserted,
        skipped = outcome.skipped,
        "Upload request completed"
    );
    Ok(Json(outcome))
}

/// Request body carrying a question.
#[derive(Deserialize)]
struct QueryRequest {
    query: String,
}

/// Response body for `POST /sessions/:id/query`.
#[derive(Serialize)]
struct DocumentAnswersResponse {
    answers: Vec<DocumentAnswer>,
}

async fn query_session<S>(
    State(service): State<Arc<S>>,
    Path(id): Path<String>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<DocumentAnswersResponse>, AppError>
where
    S: PipelineApi,
{
    let answers = service.answer_per_document(&id, &request.query).await?;
    Ok(Json(DocumentAnswersResponse { answers }))
}

/// Response body for `POST /sessions/:id/themes`.
#[derive(Serialize)]
struct ThemesResponse {
    themes: Vec<ThemeRecord>,
}

async fn session_themes<S>(
    State(service): State<Arc<S>>,
    Path(id): Path<String>,
) -> Result<Json<ThemesResponse>, AppError>
where
    S: PipelineApi,
{
    let themes = service.identify_themes(&id).await?;
    Ok(Json(ThemesResponse { themes }))
}

/// Request body for `POST /embeddings`.
#[derive(Deserialize)]
struct EmbeddingsRequest {
    documents: BTreeMap<String, String>,
}

async fn store_embeddings<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<EmbeddingsRequest>,
) -> Result<Json<UpsertSummary>, AppError>
where
    S: PipelineApi,
{
    let summary = service
        .store_embeddings(request.documents.into_iter().collect())
        .await?;
    Ok(Json(summary))
}

async fn answer_query<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<Answer>, AppError>
where
    S: PipelineApi,
{
    let answer = service.answer_query(&request.query).await?;
    Ok(Json(answer))
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: PipelineApi,
{
    Json(service.metrics_snapshot())
}

async fn get_health<S>(State(service): State<Arc<S>>) -> (StatusCode, Json<HealthSnapshot>)
where
    S: PipelineApi,
{
    let health = service.health().await;
    let status = if health.store_reachable {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health))
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery by hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "create_session",
                method: "POST",
                path: "/sessions",
                description: "Start a session. Response returns { \"session_id\": string }.",
                request_example: None,
            },
            CommandDescriptor {
                name: "upload_documents",
                method: "POST",
                path: "/sessions/:id/documents",
                description: "Multipart upload of PDF, image, DOCX, or text files; extracts text and stores embeddings for unseen documents.",
                request_example: None,
            },
            CommandDescriptor {
                name: "list_documents",
                method: "GET",
                path: "/sessions/:id/documents",
                description: "List document names held by the session.",
                request_example: None,
            },
            CommandDescriptor {
                name: "query_session",
                method: "POST",
                path: "/sessions/:id/query",
                description: "Answer a question separately for each session document.",
                request_example: Some(json!({ "query": "What are the penalties?" })),
            },
            CommandDescriptor {
                name: "identify_themes",
                method: "POST",
                path: "/sessions/:id/themes",
                description: "Identify recurring themes across the session's documents.",
                request_example: None,
            },
            CommandDescriptor {
                name: "store_embeddings",
                method: "POST",
                path: "/embeddings",
                description: "Store documents keyed by source name; known names are skipped.",
                request_example: Some(json!({
                    "documents": { "a.txt": "Contract penalty is $500." }
                })),
            },
            CommandDescriptor {
                name: "query",
                method: "POST",
                path: "/query",
                description: "Answer a question from the most similar stored documents, with citations.",
                request_example: Some(json!({ "query": "What is the penalty?" })),
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return ingestion and query counters.",
                request_example: None,
            },
            CommandDescriptor {
                name: "health",
                method: "GET",
                path: "/health",
                description: "Report store reachability and configured models.",
                request_example: None,
            },
        ],
    })
}

struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(inner: PipelineError) -> Self {
        let status = match &inner {
            PipelineError::UnknownSession(_) => StatusCode::NOT_FOUND,
            PipelineError::Upload(UploadError::InvalidName(_)) => StatusCode::BAD_REQUEST,
            PipelineError::Upload(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PipelineError::Store(StoreError::InvalidLimit)
            | PipelineError::Engine(EngineError::EmptyQuery)
            | PipelineError::Engine(EngineError::Store(StoreError::InvalidLimit)) => {
                StatusCode::BAD_REQUEST
            }
            PipelineError::Store(_) | PipelineError::Engine(EngineError::Store(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            PipelineError::Engine(EngineError::SynthesisFailed(_)) => StatusCode::BAD_GATEWAY,
        };
        if status.is_server_error() {
            tracing::error!(error = %inner, status = %status, "Request failed");
        }
        Self {
            status,
            message: inner.to_string(),
        }
    }
}
