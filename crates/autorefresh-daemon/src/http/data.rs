use std::sync::Arc;

use autorefresh_core::{AppSettings, NotificationSettings, RefreshRecord, Timer, TimerStats};
use autorefresh_store::ExportData;
use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::ApiResult;
use crate::app::AppState;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Newest N records; absent or 0 returns everything.
    pub limit: Option<usize>,
}

/// GET /timers
pub async fn list_timers(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Timer>> {
    Ok(Json(state.store.get_timers()?))
}

/// GET /stats
pub async fn get_stats(State(state): State<Arc<AppState>>) -> ApiResult<TimerStats> {
    Ok(Json(state.store.get_stats()?))
}

/// POST /stats/reset
pub async fn reset_stats(State(state): State<Arc<AppState>>) -> ApiResult<Value> {
    state.runtime.reset_stats().await?;
    Ok(Json(json!({ "success": true })))
}

/// GET /history?limit=N: newest first.
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Vec<RefreshRecord>> {
    Ok(Json(state.store.get_refresh_history(query.limit)?))
}

/// DELETE /history
pub async fn clear_history(State(state): State<Arc<AppState>>) -> ApiResult<Value> {
    state.runtime.clear_history().await?;
    Ok(Json(json!({ "success": true })))
}

/// GET /export: full backup document.
pub async fn export_data(State(state): State<Arc<AppState>>) -> ApiResult<ExportData> {
    Ok(Json(state.store.export_all_data()?))
}

pub async fn get_notification_settings(
    State(state): State<Arc<AppState>>,
) -> ApiResult<NotificationSettings> {
    Ok(Json(state.store.get_notification_settings()?))
}

pub async fn put_notification_settings(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<NotificationSettings>,
) -> ApiResult<NotificationSettings> {
    state.store.save_notification_settings(&settings)?;
    Ok(Json(settings))
}

pub async fn get_app_settings(State(state): State<Arc<AppState>>) -> ApiResult<AppSettings> {
    Ok(Json(state.store.get_app_settings()?))
}

pub async fn put_app_settings(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<AppSettings>,
) -> ApiResult<AppSettings> {
    state.store.save_app_settings(&settings)?;
    Ok(Json(settings))
}
