mod auth;
mod leaderboard;
mod progress;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::server::AppState;

pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Accounts
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/session", get(auth::session_status))
        // Syllabus and progress
        .route("/syllabus", get(progress::get_syllabus))
        .route("/progress", get(progress::get_progress))
        .route("/progress/{topic_id}", put(progress::update_progress))
        // Leaderboard
        .route("/leaderboard", get(leaderboard::list_leaderboard))
        .route("/leaderboard/me", get(leaderboard::my_entry))
        .route("/leaderboard/scores", post(leaderboard::submit_score))
}
