use std::time::Duration;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use opentelemetry::trace::TraceContextExt;
use serde_json::json;
use thiserror::Error;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Failures raised inside the extraction pipeline.
///
/// Whether a variant is fatal depends on where it is raised: an
/// `ElementTimeout` during authentication aborts the run, the same
/// variant during a per-row probe only disqualifies that row.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Timed out after {timeout:?} waiting for {selector}")]
    ElementTimeout { selector: String, timeout: Duration },

    #[error("Download timed out after {0:?}")]
    DownloadTimeout(Duration),

    #[error("No matching report found in listing")]
    ListingExhausted,

    #[error("Documentation fetch failed: {0}")]
    DocumentationFetch(String),

    #[error("Detail fetch failed: {0}")]
    DetailFetch(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Document error: {0}")]
    Document(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Authentication(_) => "authentication",
            PipelineError::ElementTimeout { .. } => "element_timeout",
            PipelineError::DownloadTimeout(_) => "download_timeout",
            PipelineError::ListingExhausted => "listing_exhausted",
            PipelineError::DocumentationFetch(_) => "documentation_fetch",
            PipelineError::DetailFetch(_) => "detail_fetch",
            PipelineError::Browser(_) => "browser",
            PipelineError::Document(_) => "document",
            PipelineError::Configuration(_) => "configuration",
            PipelineError::Cancelled => "cancelled",
            PipelineError::Io(_) => "io",
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn get_trace_id() -> Option<String> {
    let span = Span::current();
    let context = span.context();
    let span_ref = context.span();
    let span_context = span_ref.span_context();

    if span_context.is_valid() {
        Some(span_context.trace_id().to_string())
    } else {
        None
    }
}

impl AppError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Timeout(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Pipeline(e) => {
                tracing::error!(error = %e, error.kind = e.kind(), "Pipeline error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = self.status_and_message();

        let body = if let Some(trace_id) = get_trace_id() {
            json!({
                "error": error_message,
                "status": status.as_u16(),
                "trace_id": trace_id,
            })
        } else {
            json!({
                "error": error_message,
                "status": status.as_u16(),
            })
        };

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
