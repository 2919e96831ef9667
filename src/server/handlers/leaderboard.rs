use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
    response::IntoResponse,
};
use serde_json::Value;

use crate::auth::RequireUser;
use crate::error::Error;
use crate::server::AppState;
use crate::server::dto::{LeaderboardParams, SubmitScoreRequest};
use crate::server::response::{ApiError, ApiResponse, blocking};

pub async fn list_leaderboard(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LeaderboardParams>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = parse_limit(params.limit.as_deref())?;
    let entries = blocking(&state, move |service| service.leaderboard(limit)).await?;
    Ok(Json(ApiResponse::success(entries)))
}

pub async fn my_entry(
    RequireUser(auth): RequireUser,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = blocking(&state, move |service| service.my_entry(&auth)).await?;
    Ok(Json(ApiResponse::success(entry)))
}

pub async fn submit_score(
    RequireUser(auth): RequireUser,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SubmitScoreRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let score = parse_score(&req.score)?;

    let outcome = blocking(&state, move |service| service.submit_score(&auth, score)).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

fn parse_limit(raw: Option<&str>) -> Result<Option<usize>, Error> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match raw.trim().parse::<usize>() {
        Ok(limit) if limit > 0 => Ok(Some(limit)),
        _ => Err(Error::Validation(format!(
            "limit must be a positive integer, got '{raw}'"
        ))),
    }
}

/// Accepts a JSON integer or a string holding one.
fn parse_score(value: &Value) -> Result<i64, Error> {
    let score = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    match score {
        Some(score) if score >= 0 => Ok(score),
        _ => Err(Error::Validation(format!(
            "score must be a non-negative integer, got {value}"
        ))),
    }
}
