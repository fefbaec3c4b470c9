use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use auth_cell::router::auth_routes;
use auth_cell::AuthCellState;
use shared_database::Database;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestFixtures, TestUser};

struct TestApp {
    config: TestConfig,
    db: Arc<Database>,
}

impl TestApp {
    fn new() -> Self {
        Self {
            config: TestConfig::default(),
            db: Arc::new(Database::open_in_memory().unwrap()),
        }
    }

    fn router(&self) -> Router {
        let state = AuthCellState::new(self.config.to_arc(), Arc::clone(&self.db));
        auth_routes(Arc::new(state))
    }

    fn bearer(&self, user: &TestUser) -> String {
        JwtTestUtils::bearer(user, &self.config.jwt_secret)
    }
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn validate_returns_token_claims() {
    let app = TestApp::new();
    let user = TestUser::patient("patient@example.com");

    let (status, body) = send(
        app.router(),
        Request::post("/validate")
            .header("Authorization", app.bearer(&user))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["user_id"], user.id.as_str());
    assert_eq!(body["email"], "patient@example.com");
}

#[tokio::test]
async fn validate_rejects_missing_and_malformed_headers() {
    let app = TestApp::new();

    let (status, body) = send(
        app.router(),
        Request::post("/validate").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Missing authorization header");

    let (status, body) = send(
        app.router(),
        Request::post("/validate")
            .header("Authorization", "Token abc")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid authorization header format");
}

#[tokio::test]
async fn verify_reports_false_for_expired_token() {
    let app = TestApp::new();
    let token = JwtTestUtils::create_expired_token(&TestUser::default(), &app.config.jwt_secret);

    let (status, body) = send(
        app.router(),
        Request::post("/verify")
            .header("Authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "valid": false }));
}

#[tokio::test]
async fn sync_creates_directory_entry_then_me_reads_it() {
    let app = TestApp::new();
    let user = TestUser::doctor("doc@example.com").with_name("Dr. Grey");

    let (status, body) = send(
        app.router(),
        Request::post("/sync")
            .header("Authorization", app.bearer(&user))
            .header("Content-Type", "application/json")
            .body(Body::from(json!({ "phone": "+1-555-0100" }).to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], "doctor");
    assert_eq!(body["user"]["full_name"], "Dr. Grey");
    assert_eq!(body["user"]["phone"], "+1-555-0100");

    let (status, body) = send(
        app.router(),
        Request::get("/me")
            .header("Authorization", app.bearer(&user))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "doc@example.com");
}

#[tokio::test]
async fn sync_does_not_escalate_existing_role() {
    let app = TestApp::new();
    let stored = TestUser::patient("p@example.com");
    TestFixtures::seed_user(&app.db, &stored).await.unwrap();

    let mut escalated = stored.clone();
    escalated.role = "admin".to_string();

    let (status, body) = send(
        app.router(),
        Request::post("/sync")
            .header("Authorization", app.bearer(&escalated))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], "patient");
}

#[tokio::test]
async fn me_is_not_found_before_sync() {
    let app = TestApp::new();
    let user = TestUser::patient("ghost@example.com");

    let (status, body) = send(
        app.router(),
        Request::get("/me")
            .header("Authorization", app.bearer(&user))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "User not found");
}
