pub mod health;
pub mod reports;
pub mod server;
pub mod status;

use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", post(reports::create_report))
        .route("/api/reports", post(reports::create_report))
        .route("/api/health", get(health::health))
        .route("/api/server/stop-sessions", post(server::stop_sessions))
        .route("/ws/status", get(status::status_socket))
        .with_state(state)
}
