use std::sync::Arc;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{HeaderValue, StatusCode, header::AUTHORIZATION, header::WWW_AUTHENTICATE, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::{AuthContext, extract_bearer_token};
use crate::error::{Error, ErrorKind};
use crate::server::AppState;

/// Extractor that requires a valid session.
pub struct RequireUser(pub AuthContext);

/// Extractor that resolves a session when one is presented.
/// An invalid or expired token is treated the same as no token.
pub struct MaybeUser(pub Option<AuthContext>);

#[derive(Debug)]
pub enum AuthError {
    MissingAuth,
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    Unavailable,
    InternalError,
}

impl From<Error> for AuthError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidTokenFormat => AuthError::InvalidToken,
            Error::TokenExpired => AuthError::TokenExpired,
            err => match err.kind() {
                ErrorKind::Unauthorized => AuthError::InvalidToken,
                ErrorKind::StorageUnavailable => AuthError::Unavailable,
                _ => {
                    tracing::error!("Session validation failed: {err}");
                    AuthError::InternalError
                }
            },
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidScheme => (StatusCode::UNAUTHORIZED, "Invalid authorization scheme"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid session"),
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "Session expired"),
            AuthError::Unavailable => (StatusCode::SERVICE_UNAVAILABLE, "Storage unavailable"),
            AuthError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = json!({ "data": null, "error": message });
        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer realm=\"studytrack\""),
            );
        }

        response
    }
}

impl FromRequestParts<Arc<AppState>> for RequireUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let raw_token = bearer_token(parts)?.ok_or(AuthError::MissingAuth)?;
        let context = resolve_session(state, raw_token).await?;
        Ok(RequireUser(context))
    }
}

impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(raw_token) = bearer_token(parts).ok().flatten() else {
            return Ok(MaybeUser(None));
        };

        match resolve_session(state, raw_token).await {
            Ok(context) => Ok(MaybeUser(Some(context))),
            Err(AuthError::InvalidToken | AuthError::TokenExpired) => Ok(MaybeUser(None)),
            Err(e) => Err(e),
        }
    }
}

fn bearer_token(parts: &Parts) -> Result<Option<String>, AuthError> {
    let auth_header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    extract_bearer_token(auth_header).map_err(|_| AuthError::InvalidScheme)
}

/// Session lookups hit storage and Argon2, so they run off the async runtime.
async fn resolve_session(state: &Arc<AppState>, raw_token: String) -> Result<AuthContext, AuthError> {
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || state.service.authenticate(&raw_token))
        .await
        .map_err(|e| {
            tracing::error!("Session validation task failed: {e}");
            AuthError::InternalError
        })?
        .map_err(AuthError::from)
}
