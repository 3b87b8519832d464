pub mod data;
pub mod health;
pub mod message;
pub mod tabs;

use autorefresh_store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::runtime::RuntimeError;

/// Error body of every JSON endpoint: `{ "error": "..." }`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("{0}")]
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Store(_) | ApiError::Runtime(RuntimeError::Store(_)) => {
                error!(error = %self, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Runtime(RuntimeError::Closed) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;
