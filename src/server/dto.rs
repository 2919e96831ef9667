use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{User, Username};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub login_identifier: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub username: Username,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub username: Username,
    pub email: String,
    pub registered_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            username: user.username,
            email: user.email,
            registered_at: user.registered_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionStatusResponse {
    pub logged_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<Username>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProgressRequest {
    pub status: String,
}

/// `score` stays untyped so a non-integer is reported as a validation error
/// rather than a body-shape rejection.
#[derive(Debug, Deserialize)]
pub struct SubmitScoreRequest {
    pub score: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
pub struct LeaderboardParams {
    #[serde(default)]
    pub limit: Option<String>,
}
