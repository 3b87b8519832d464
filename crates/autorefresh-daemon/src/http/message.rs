use std::sync::Arc;

use autorefresh_scheduler::ControlResponse;
use axum::{extract::State, Json};
use serde_json::Value;

use super::ApiResult;
use crate::app::AppState;

/// POST /message: run one control message (`addTimer`, `refreshOnce`, ...).
///
/// Malformed or unknown messages still get a `200` with `success: false`.
pub async fn message_handler(
    State(state): State<Arc<AppState>>,
    Json(value): Json<Value>,
) -> ApiResult<ControlResponse> {
    Ok(Json(state.runtime.message(value).await?))
}
