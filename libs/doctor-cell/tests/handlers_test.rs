use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use auth_cell::AuthorizationGuard;
use doctor_cell::router::doctor_routes;
use doctor_cell::{DoctorCellState, DoctorService};
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
        let state = DoctorCellState {
            config: self.config.to_arc(),
            doctors: Arc::new(DoctorService::new(Arc::clone(&self.db))),
            guard: Arc::new(AuthorizationGuard::new(Arc::clone(&self.db))),
        };
        doctor_routes(Arc::new(state))
    }

    async fn call(&self, method: &str, uri: &str, user: &TestUser, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("Authorization", JwtTestUtils::bearer(user, &self.config.jwt_secret));
        let request = match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }
}

#[tokio::test]
async fn profile_submission_creates_unapproved_doctor_and_promotes_role() {
    let app = TestApp::new();
    let user = TestUser::patient("future.doc@example.com").with_name("Dr. Future");
    TestFixtures::seed_user(&app.db, &user).await.unwrap();

    let (status, body) = app
        .call(
            "POST",
            "/profile",
            &user,
            Some(json!({
                "specialization": "Cardiology",
                "qualification": "MD",
                "experience_years": 5,
                "consultation_fee": 120.0
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["doctor"]["is_approved"], false);
    assert_eq!(body["doctor"]["full_name"], "Dr. Future");
    assert_eq!(
        body["message"],
        "Doctor profile created successfully. Awaiting admin approval."
    );

    // The role change is visible to the next doctor-only call.
    let (status, body) = app.call("GET", "/profile/me", &user, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["doctor"]["specialization"], "Cardiology");
}

#[tokio::test]
async fn second_submission_updates_without_touching_approval() {
    let app = TestApp::new();
    let user = TestUser::doctor("doc@example.com");
    TestFixtures::seed_doctor(&app.db, &user, true).await.unwrap();

    let (status, body) = app
        .call(
            "POST",
            "/profile",
            &user,
            Some(json!({ "specialization": "Neurology", "bio": "Brains" })),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Doctor profile updated successfully");
    assert_eq!(body["doctor"]["specialization"], "Neurology");
    assert_eq!(body["doctor"]["is_approved"], true);
}

#[tokio::test]
async fn profile_requires_specialization() {
    let app = TestApp::new();
    let user = TestUser::patient("p@example.com");
    TestFixtures::seed_user(&app.db, &user).await.unwrap();

    let (status, body) = app.call("POST", "/profile", &user, Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Specialization is required");
}

#[tokio::test]
async fn admin_approval_toggle_controls_public_visibility() {
    let app = TestApp::new();
    let admin = TestUser::admin("admin@example.com");
    let doctor_user = TestUser::doctor("pending@example.com");
    TestFixtures::seed_user(&app.db, &admin).await.unwrap();
    let doctor_id = TestFixtures::seed_doctor(&app.db, &doctor_user, false).await.unwrap();

    let (status, _) = app.call("GET", &format!("/{}", doctor_id), &admin, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .call(
            "PUT",
            &format!("/{}/approve", doctor_id),
            &admin,
            Some(json!({ "is_approved": true })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Doctor approved successfully");

    let (status, body) = app.call("GET", &format!("/{}", doctor_id), &admin, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["doctor"]["email"], "pending@example.com");
}

#[tokio::test]
async fn approval_is_admin_only() {
    let app = TestApp::new();
    let doctor_user = TestUser::doctor("self.approver@example.com");
    let doctor_id = TestFixtures::seed_doctor(&app.db, &doctor_user, false).await.unwrap();

    let (status, _) = app
        .call(
            "PUT",
            &format!("/{}/approve", doctor_id),
            &doctor_user,
            Some(json!({ "is_approved": true })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_creates_pre_approved_doctor_once() {
    let app = TestApp::new();
    let admin = TestUser::admin("admin@example.com");
    let target = TestUser::patient("new.doc@example.com");
    TestFixtures::seed_user(&app.db, &admin).await.unwrap();
    TestFixtures::seed_user(&app.db, &target).await.unwrap();

    let request = json!({ "email": "new.doc@example.com", "specialization": "Pediatrics" });

    let (status, body) = app.call("POST", "/", &admin, Some(request.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["doctor"]["is_approved"], true);

    let (status, _) = app.call("POST", "/", &admin, Some(request)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .call(
            "POST",
            "/",
            &admin,
            Some(json!({ "email": "nobody@example.com", "specialization": "Pediatrics" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn listing_filters_by_specialization_and_approval() {
    let app = TestApp::new();
    let viewer = TestUser::patient("viewer@example.com");
    TestFixtures::seed_user(&app.db, &viewer).await.unwrap();
    TestFixtures::seed_doctor(&app.db, &TestUser::doctor("a@example.com"), true).await.unwrap();
    TestFixtures::seed_doctor(&app.db, &TestUser::doctor("b@example.com"), false).await.unwrap();

    let (status, body) = app.call("GET", "/", &viewer, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["doctors"].as_array().unwrap().len(), 2);

    let (_, body) = app.call("GET", "/?approved_only=true", &viewer, None).await;
    assert_eq!(body["doctors"].as_array().unwrap().len(), 1);

    let (_, body) = app.call("GET", "/?specialization=general", &viewer, None).await;
    assert_eq!(body["doctors"].as_array().unwrap().len(), 2);

    let (_, body) = app.call("GET", "/?specialization=ortho", &viewer, None).await;
    assert!(body["doctors"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn stats_count_slots_for_own_profile() {
    let app = TestApp::new();
    let doctor_user = TestUser::doctor("stats@example.com");
    let doctor_id = TestFixtures::seed_doctor(&app.db, &doctor_user, true).await.unwrap();
    let start = TestFixtures::slot_start_in(72, 30);
    TestFixtures::seed_slot(&app.db, doctor_id, start, 30, 2).await.unwrap();

    let (status, body) = app.call("GET", "/stats/me", &doctor_user, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["slots"]["total_slots"], 1);
    assert_eq!(body["slots"]["available_slots"], 1);
    assert_eq!(body["appointments"]["total_appointments"], 0);

    let patient = TestUser::patient("not.a.doctor@example.com");
    TestFixtures::seed_user(&app.db, &patient).await.unwrap();
    let (status, _) = app.call("GET", "/stats/me", &patient, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
