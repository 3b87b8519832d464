use std::sync::Arc;

use autorefresh_core::config::AutoRefreshConfig;
use autorefresh_store::TimerStore;
use axum::{
    routing::{delete, get, post},
    Router,
};
use dashmap::DashMap;

use crate::{runtime::RuntimeHandle, tabs::HttpTabHost, ws::EventBroadcaster};

/// Central shared state, passed as `Arc<AppState>` to all Axum handlers.
pub struct AppState {
    pub config: AutoRefreshConfig,
    /// Read side of the durable state. Writes to timers, stats and history
    /// go through `runtime`.
    pub store: Arc<TimerStore>,
    pub runtime: RuntimeHandle,
    pub tabs: Arc<HttpTabHost>,
    pub broadcaster: Arc<EventBroadcaster>,
    /// Open `/events` connections: conn_id -> connected at (epoch ms).
    pub ws_clients: DashMap<String, i64>,
}

impl AppState {
    pub fn new(
        config: AutoRefreshConfig,
        store: Arc<TimerStore>,
        runtime: RuntimeHandle,
        tabs: Arc<HttpTabHost>,
        broadcaster: Arc<EventBroadcaster>,
    ) -> Self {
        Self {
            config,
            store,
            runtime,
            tabs,
            broadcaster,
            ws_clients: DashMap::new(),
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    use crate::http::{data, health, message, tabs};

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/events", get(crate::ws::events_handler))
        .route("/message", post(message::message_handler))
        .route("/timers", get(data::list_timers))
        .route("/stats", get(data::get_stats))
        .route("/stats/reset", post(data::reset_stats))
        .route(
            "/history",
            get(data::get_history).delete(data::clear_history),
        )
        .route("/export", get(data::export_data))
        .route(
            "/settings/notifications",
            get(data::get_notification_settings).put(data::put_notification_settings),
        )
        .route(
            "/settings/app",
            get(data::get_app_settings).put(data::put_app_settings),
        )
        .route("/tabs", get(tabs::list_tabs).post(tabs::open_tab))
        .route("/tabs/{id}", delete(tabs::close_tab))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
