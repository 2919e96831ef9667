use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::{MaybeUser, RequireUser};
use crate::server::AppState;
use crate::server::dto::{
    LoginRequest, LoginResponse, RegisterRequest, SessionStatusResponse, UserResponse,
};
use crate::server::response::{ApiError, ApiResponse, blocking};
use crate::service::Registration;

pub async fn register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let registration = Registration {
        username: req.username,
        email: req.email,
        password: req.password,
        confirm_password: req.confirm_password,
    };

    let user = blocking(&state, move |service| service.register(registration)).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(UserResponse::from(user))),
    ))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;

    let (token, session) = blocking(&state, move |service| {
        service.login(&req.login_identifier, &req.password)
    })
    .await?;

    Ok(Json(ApiResponse::success(LoginResponse {
        token,
        username: session.username,
        expires_at: session.expires_at,
    })))
}

pub async fn logout(
    RequireUser(auth): RequireUser,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(&state, move |service| service.logout(&auth)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn session_status(MaybeUser(auth): MaybeUser) -> impl IntoResponse {
    Json(ApiResponse::success(SessionStatusResponse {
        logged_in: auth.is_some(),
        username: auth.map(|auth| auth.user.username),
    }))
}
