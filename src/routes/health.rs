use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "report-weaver",
        "version": env!("CARGO_PKG_VERSION"),
        "active_sessions": state.registry.len(),
    }))
}
