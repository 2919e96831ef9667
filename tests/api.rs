//! HTTP API tests driving the router in-process.

mod common;

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use studytrack::config::{Backend, ServerConfig};
use studytrack::server::{AppState, create_router};
use tower::ServiceExt;

use common::{TestStore, sample_syllabus};

struct TestApp {
    router: Router,
    store: TestStore,
}

impl TestApp {
    fn new(backend: Backend) -> Self {
        let store = TestStore::new(backend);
        let config = ServerConfig {
            data_dir: store.temp_dir.path().to_path_buf(),
            backend,
            leaderboard_limit: 50,
            ..Default::default()
        };
        let state = Arc::new(AppState::new(
            Arc::clone(&store.store),
            Arc::new(sample_syllabus()),
            config,
        ));

        Self {
            router: create_router(state),
            store,
        }
    }

    async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("read body")
            .to_bytes();

        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }

    async fn register(&self, username: &str) -> StatusCode {
        let (status, _) = self
            .request(
                "POST",
                "/api/v1/auth/register",
                None,
                Some(json!({
                    "username": username,
                    "email": format!("{}@example.com", username.to_lowercase()),
                    "password": "hunter22",
                    "confirm_password": "hunter22",
                })),
            )
            .await;
        status
    }

    async fn login(&self, identifier: &str) -> String {
        let (status, body) = self
            .request(
                "POST",
                "/api/v1/auth/login",
                None,
                Some(json!({"login_identifier": identifier, "password": "hunter22"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["data"]["token"].as_str().expect("token").to_string()
    }

    async fn signed_up(&self, username: &str) -> String {
        assert_eq!(self.register(username).await, StatusCode::CREATED);
        self.login(username).await
    }
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new(Backend::File);
    let (status, body) = app.request("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".to_string()));
}

#[tokio::test]
async fn test_registration_and_login() {
    let app = TestApp::new(Backend::File);

    assert_eq!(app.register("alice").await, StatusCode::CREATED);
    assert_eq!(app.register("ALICE").await, StatusCode::CONFLICT);

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/auth/register",
            None,
            Some(json!({
                "username": "bob",
                "email": "bob@example.com",
                "password": "hunter22",
                "confirm_password": "hunter23",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("do not match"));

    let (status, _) = app
        .request(
            "POST",
            "/api/v1/auth/login",
            None,
            Some(json!({"login_identifier": "alice", "password": "wrong-password"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Email works as a login identifier too.
    let token = app.login("Alice@Example.com").await;
    let (status, body) = app
        .request("GET", "/api/v1/auth/session", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({"logged_in": true, "username": "alice"}));
}

#[tokio::test]
async fn test_session_status_without_valid_token() {
    let app = TestApp::new(Backend::File);

    let (status, body) = app.request("GET", "/api/v1/auth/session", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({"logged_in": false}));

    let (status, body) = app
        .request(
            "GET",
            "/api/v1/auth/session",
            Some("studytrack_00000000_00000000000000000000000000000000"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["logged_in"], false);
}

#[tokio::test]
async fn test_logout_ends_session() {
    let app = TestApp::new(Backend::Sqlite);
    let token = app.signed_up("carol").await;

    let (status, _) = app
        .request("POST", "/api/v1/auth/logout", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .request("GET", "/api/v1/progress", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_routes_require_auth() {
    let app = TestApp::new(Backend::File);

    for (method, uri, body) in [
        ("GET", "/api/v1/progress", None),
        ("PUT", "/api/v1/progress/t1", Some(json!({"status": "mastered"}))),
        ("GET", "/api/v1/leaderboard/me", None),
        ("POST", "/api/v1/leaderboard/scores", Some(json!({"score": 5}))),
        ("POST", "/api/v1/auth/logout", None),
    ] {
        let (status, body) = app.request(method, uri, None, body).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
        assert_eq!(body["data"], Value::Null);
    }
}

#[tokio::test]
async fn test_syllabus_is_public() {
    let app = TestApp::new(Backend::File);
    let (status, body) = app.request("GET", "/api/v1/syllabus", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["subjects"][0]["units"][0]["topics"][1]["sub_topics"][0]["id"], "t3");
}

#[tokio::test]
async fn test_progress_updates_feed_leaderboard() {
    for backend in common::BACKENDS {
        let app = TestApp::new(backend);
        let token = app.signed_up("dave").await;

        for (topic, status) in [("t1", "mastered"), ("t2", "reviewing")] {
            let (code, _) = app
                .request(
                    "PUT",
                    &format!("/api/v1/progress/{topic}"),
                    Some(&token),
                    Some(json!({ "status": status })),
                )
                .await;
            assert_eq!(code, StatusCode::NO_CONTENT, "{backend}");
        }

        let (status, body) = app.request("GET", "/api/v1/progress", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total_score"], 12, "{backend}");
        assert_eq!(body["data"]["max_score"], 30);
        assert_eq!(body["data"]["status_counts"]["not_started"], 1);
        assert_eq!(body["data"]["topics"]["t1"]["status"], "mastered");
        assert!(body["data"]["topics"]["t1"]["completed_at"].is_string());

        // Regressing a topic lowers the total but not the ledger.
        app.request(
            "PUT",
            "/api/v1/progress/t1",
            Some(&token),
            Some(json!({"status": "not_started"})),
        )
        .await;

        let (_, body) = app.request("GET", "/api/v1/progress", Some(&token), None).await;
        assert_eq!(body["data"]["total_score"], 2, "{backend}");

        let (status, body) = app
            .request("GET", "/api/v1/leaderboard/me", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!({"username": "dave", "score": 12, "rank": 1}));
    }
}

#[tokio::test]
async fn test_progress_validation() {
    let app = TestApp::new(Backend::File);
    let token = app.signed_up("erin").await;

    let (status, body) = app
        .request(
            "PUT",
            "/api/v1/progress/nope",
            Some(&token),
            Some(json!({"status": "mastered"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("unknown topic"));

    let (status, _) = app
        .request(
            "PUT",
            "/api/v1/progress/t1",
            Some(&token),
            Some(json!({"status": "expert"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .request("PUT", "/api/v1/progress/t1", Some(&token), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_score_submission_uses_session_identity() {
    let app = TestApp::new(Backend::Sqlite);
    let token = app.signed_up("fred").await;

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/leaderboard/scores",
            Some(&token),
            Some(json!({"score": 30, "username": "mallory"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({"applied": true, "stored_score": 30}));

    let (_, body) = app
        .request(
            "POST",
            "/api/v1/leaderboard/scores",
            Some(&token),
            Some(json!({"score": "20"})),
        )
        .await;
    assert_eq!(body["data"], json!({"applied": false, "stored_score": 30}));

    let (_, body) = app.request("GET", "/api/v1/leaderboard", None, None).await;
    assert_eq!(body["data"], json!([{"username": "fred", "score": 30, "rank": 1}]));
}

#[tokio::test]
async fn test_invalid_scores_are_rejected() {
    let app = TestApp::new(Backend::File);
    let token = app.signed_up("gina").await;

    for score in [json!(-5), json!("lots"), json!(2.5), json!(null)] {
        let (status, _) = app
            .request(
                "POST",
                "/api/v1/leaderboard/scores",
                Some(&token),
                Some(json!({ "score": score })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "accepted {score}");
    }

    let (status, _) = app
        .request("GET", "/api/v1/leaderboard/me", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_leaderboard_limit() {
    let app = TestApp::new(Backend::File);
    for (user, score) in [("hana", 5), ("ivan", 9), ("jack", 9)] {
        app.store
            .store
            .upsert_if_higher(&common::name(user), score)
            .unwrap();
    }

    let (status, body) = app
        .request("GET", "/api/v1/leaderboard?limit=2", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"],
        json!([
            {"username": "ivan", "score": 9, "rank": 1},
            {"username": "jack", "score": 9, "rank": 1},
        ])
    );

    let (status, _) = app
        .request("GET", "/api/v1/leaderboard?limit=zero", None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_corrupt_ledger_is_server_error() {
    let app = TestApp::new(Backend::File);
    std::fs::write(
        app.store.temp_dir.path().join("leaderboard.json"),
        r#"[{"username": "kate", "score": 10, "rank": 1}]"#,
    )
    .unwrap();

    let (status, body) = app.request("GET", "/api/v1/leaderboard", None, None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["data"], Value::Null);
    assert!(body["error"].is_string());
}
