use std::sync::Arc;

use autorefresh_core::TabId;
use autorefresh_scheduler::TabInfo;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::{ApiError, ApiResult};
use crate::app::AppState;

/// GET /tabs
pub async fn list_tabs(State(state): State<Arc<AppState>>) -> Json<Vec<TabInfo>> {
    Json(state.tabs.list())
}

/// POST /tabs: register or replace a refreshable page.
pub async fn open_tab(
    State(state): State<Arc<AppState>>,
    Json(tab): Json<TabInfo>,
) -> (StatusCode, Json<TabInfo>) {
    state.tabs.open(tab.clone());
    (StatusCode::CREATED, Json(tab))
}

/// DELETE /tabs/{id}: the timer notices on its next firing and removes itself.
pub async fn close_tab(
    State(state): State<Arc<AppState>>,
    Path(id): Path<TabId>,
) -> ApiResult<TabInfo> {
    state
        .tabs
        .close(id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no tab with id {id}")))
}
