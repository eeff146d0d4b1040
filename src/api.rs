//! HTTP surface for docbrief.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `GET /` – Welcome message confirming the service is up.
//! - `POST /simplify` – Multipart upload (field `file`) of a `.pptx` or `.pdf` document. Runs the
//!   full pipeline and answers with the summary as a `.docx` attachment named
//!   `{stem}_summary.docx`.
//! - `POST /parse` – Same upload shape; returns the extracted slide/page texts as JSON without
//!   calling the generator.
//! - `GET /metrics` – Observe summarization counters.
//!
//! Every failure answers with `{"error": message}`: `400` for problems with the upload itself,
//! `500` for everything else.

use crate::extract::{DocumentFormat, ExtractedUnit};
use crate::metrics::MetricsSnapshot;
use crate::pipeline::{PipelineApi, PipelineError, Upload};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

const FILE_FIELD: &str = "file";

/// Build the HTTP router exposing the summarization API surface.
///
/// `max_upload_bytes` bounds the request body of the upload routes.
pub fn create_router<S>(service: Arc<S>, max_upload_bytes: usize) -> Router
where
    S: PipelineApi + 'static,
{
    Router::new()
        .route("/", get(welcome))
        .route("/simplify", post(simplify_document::<S>))
        .route("/parse", post(parse_document::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(service)
}

async fn welcome() -> Json<serde_json::Value> {
    Json(json!({ "message": "Welcome to the docbrief API!" }))
}

/// Summarize an uploaded document and return it as a `.docx` download.
async fn simplify_document<S>(
    State(service): State<Arc<S>>,
    multipart: Multipart,
) -> Result<Response, AppError>
where
    S: PipelineApi,
{
    let upload = read_upload(multipart).await?;
    let artifact = service.simplify(upload).await?;
    let file_name = artifact.file_name();
    tracing::info!(
        file_name,
        bytes = artifact.bytes.len(),
        "Simplify request completed"
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, artifact.mime_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        artifact.bytes,
    )
        .into_response())
}

/// Response body for `POST /parse`.
#[derive(Serialize)]
struct ParseResponse {
    format: DocumentFormat,
    unit_count: usize,
    units: Vec<ExtractedUnit>,
}

/// Extract the text units of an uploaded document.
async fn parse_document<S>(
    State(service): State<Arc<S>>,
    multipart: Multipart,
) -> Result<Json<ParseResponse>, AppError>
where
    S: PipelineApi,
{
    let upload = read_upload(multipart).await?;
    let document = service.extract(upload).await?;
    tracing::info!(
        format = %document.format,
        units = document.unit_count(),
        "Parse request completed"
    );
    Ok(Json(ParseResponse {
        format: document.format,
        unit_count: document.unit_count(),
        units: document.units,
    }))
}

/// Pull the `file` part out of the multipart body and check its declared format.
async fn read_upload(mut multipart: Multipart) -> Result<Upload, AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().trim().to_string();
        if file_name.is_empty() {
            return Err(AppError::BadRequest("No file selected for uploading".into()));
        }
        // Reject unknown extensions before reading the body or staging anything.
        DocumentFormat::from_file_name(&file_name).map_err(PipelineError::from)?;
        let bytes = field.bytes().await?.to_vec();
        return Ok(Upload { file_name, bytes });
    }

    Err(AppError::BadRequest("No file part in the request".into()))
}

/// Return the current summarization counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: PipelineApi,
{
    Json(service.metrics_snapshot())
}

enum AppError {
    BadRequest(String),
    Multipart(MultipartError),
    Pipeline(PipelineError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::Multipart(err) => (err.status(), err.body_text()),
            Self::Pipeline(err) if err.is_user_error() => {
                (StatusCode::BAD_REQUEST, err.to_string())
            }
            Self::Pipeline(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        };
        (status, Json(json!({ "error": message }))).into_response()
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
