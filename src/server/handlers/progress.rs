use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::UpdateProgressRequest;
use crate::server::response::{ApiError, ApiResponse, blocking};
use crate::types::TopicStatus;

pub async fn get_syllabus(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::success(state.service.syllabus().clone()))
}

pub async fn get_progress(
    RequireUser(auth): RequireUser,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let view = blocking(&state, move |service| service.progress(&auth)).await?;
    Ok(Json(ApiResponse::success(view)))
}

pub async fn update_progress(
    RequireUser(auth): RequireUser,
    State(state): State<Arc<AppState>>,
    Path(topic_id): Path<String>,
    payload: Result<Json<UpdateProgressRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let status: TopicStatus = req.status.parse()?;

    blocking(&state, move |service| {
        service.update_topic_status(&auth, &topic_id, status)
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}
