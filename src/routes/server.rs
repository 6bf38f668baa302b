use axum::extract::State;

use crate::AppState;

const STOPPED_MESSAGE: &str = "All active browser sessions have been stopped.";

/// Cancels every report run and closes every browser session still open.
#[tracing::instrument(name = "stop sessions", skip_all)]
pub async fn stop_sessions(State(state): State<AppState>) -> &'static str {
    let runs = state.runner.cancel_all();
    let sessions = state.registry.close_all().await;
    tracing::info!(runs, sessions, "stopped all report activity");
    state.notifier.notify(STOPPED_MESSAGE);
    STOPPED_MESSAGE
}
