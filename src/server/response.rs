use std::sync::Arc;

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;

use crate::error::{Error, ErrorKind};
use crate::server::AppState;
use crate::service::StudyService;

/// Standard API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    #[must_use]
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }
}

/// API error that converts to a proper HTTP response
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let (status, message) = match err.kind() {
            ErrorKind::Validation => (StatusCode::BAD_REQUEST, err.to_string()),
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, err.to_string()),
            ErrorKind::Conflict => (StatusCode::CONFLICT, err.to_string()),
            ErrorKind::Unauthorized => (StatusCode::UNAUTHORIZED, err.to_string()),
            ErrorKind::StorageUnavailable => {
                tracing::warn!("Storage unavailable: {err}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "storage temporarily unavailable".to_string(),
                )
            }
            ErrorKind::CorruptState | ErrorKind::Config => {
                tracing::error!("{err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "stored data is unreadable; operator attention required".to_string(),
                )
            }
            ErrorKind::Internal => {
                tracing::error!("Internal error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };
        Self { status, message }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "data": null, "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

/// Runs a service call on the blocking thread pool.
///
/// Storage operations take file locks and SQLite transactions that may
/// wait, which must never stall the async workers.
pub async fn blocking<T, F>(state: &Arc<AppState>, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&StudyService) -> crate::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || f(&state.service))
        .await
        .map_err(|e| {
            tracing::error!("Blocking task failed: {e}");
            ApiError::internal("Internal server error")
        })?
        .map_err(ApiError::from)
}
