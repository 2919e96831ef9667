use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{Router, routing::get};

use super::handlers::api_router;
use crate::config::ServerConfig;
use crate::service::StudyService;
use crate::store::Store;
use crate::syllabus::Syllabus;

pub struct AppState {
    pub service: StudyService,
    pub config: ServerConfig,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, syllabus: Arc<Syllabus>, config: ServerConfig) -> Self {
        Self {
            service: StudyService::new(store, syllabus, &config),
            config,
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_router())
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
