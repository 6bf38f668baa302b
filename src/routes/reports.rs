use axum::{Json, extract::State};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::jobs::RunHandle;
use crate::pipeline::ReportRequest;

/// Runs a report and answers with the document id, or `Processing` when the
/// run produced none.
#[tracing::instrument(name = "create report", skip_all, fields(report.website, run.id))]
pub async fn create_report(
    State(state): State<AppState>,
    Json(request): Json<ReportRequest>,
) -> AppResult<String> {
    let span = tracing::Span::current();
    span.record("report.website", request.website.as_str());
    request.validate().map_err(AppError::Validation)?;

    let RunHandle {
        id,
        cancel,
        mut join,
    } = state.runner.spawn(request);
    span.record("run.id", tracing::field::display(id));

    match tokio::time::timeout(state.config.request_timeout(), &mut join).await {
        Ok(Ok(document_id)) => {
            tracing::info!(document.id = %document_id, "report request finished");
            Ok(document_id)
        }
        Ok(Err(e)) => Err(AppError::Internal(format!("report run {id} aborted: {e}"))),
        Err(_) => {
            // Without cancellation the run keeps going in the background.
            if state.config.cancel_on_timeout {
                cancel.cancel();
            }
            tracing::error!(
                cancelled = state.config.cancel_on_timeout,
                "report request timed out"
            );
            Err(AppError::Timeout(
                "Request timed out. Please try again later.".into(),
            ))
        }
    }
}
