use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::app::AppState;

/// GET /health: liveness probe, returns daemon metadata.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "port": state.config.server.port,
        "tabs": state.tabs.count(),
        "ws_clients": state.ws_clients.len(),
    }))
}
