use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use rusqlite::params;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{Database, DatabaseError};
use shared_models::auth::{AuthenticatedPrincipal, Role, User};

use crate::time::local_now;

pub struct TestConfig {
    pub jwt_secret: String,
    pub database_url: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            database_url: ":memory:".to_string(),
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            database_url: self.database_url.clone(),
            jwt_secret: self.jwt_secret.clone(),
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
    pub full_name: Option<String>,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "patient".to_string(),
            full_name: None,
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
            full_name: None,
        }
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, "doctor")
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn with_name(mut self, full_name: &str) -> Self {
        self.full_name = Some(full_name.to_string());
        self
    }

    pub fn uuid(&self) -> Uuid {
        Uuid::parse_str(&self.id).unwrap_or_default()
    }

    /// The principal the authorization guard would resolve for this user once seeded.
    pub fn to_principal(&self) -> AuthenticatedPrincipal {
        AuthenticatedPrincipal {
            id: self.uuid(),
            role: self.role.parse().unwrap_or(Role::Patient),
            email: self.email.clone(),
            full_name: self.full_name.clone(),
        }
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            full_name: self.full_name.clone(),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "full_name": user.full_name,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }

    pub fn bearer(user: &TestUser, secret: &str) -> String {
        format!("Bearer {}", Self::create_test_token(user, secret, None))
    }
}

/// Direct store seeding for tests that need rows the HTTP surface would take
/// several calls to build.
pub struct TestFixtures;

impl TestFixtures {
    pub async fn seed_user(db: &Database, user: &TestUser) -> Result<Uuid, DatabaseError> {
        let user = user.clone();
        db.transaction(move |tx| {
            tx.execute(
                "INSERT OR IGNORE INTO users (id, email, full_name, role, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![user.id, user.email, user.full_name, user.role, Utc::now()],
            )?;
            Ok(user.uuid())
        })
        .await
    }

    /// Seeds the user as well when it is not there yet. Returns the doctor id.
    pub async fn seed_doctor(
        db: &Database,
        user: &TestUser,
        approved: bool,
    ) -> Result<Uuid, DatabaseError> {
        Self::seed_user(db, user).await?;

        let doctor_id = Uuid::new_v4();
        let user_id = user.id.clone();
        db.transaction(move |tx| {
            tx.execute(
                "INSERT INTO doctors (id, user_id, specialization, qualification, experience_years,
                     consultation_fee, is_approved, created_at, updated_at)
                 VALUES (?1, ?2, 'General Practice', 'MBBS', 8, 150.0, ?3, ?4, ?4)",
                params![doctor_id.to_string(), user_id, approved, Utc::now()],
            )?;
            Ok(doctor_id)
        })
        .await
    }

    pub async fn seed_slot(
        db: &Database,
        doctor_id: Uuid,
        starts_at: NaiveDateTime,
        duration_minutes: i64,
        max_bookings: i32,
    ) -> Result<Uuid, DatabaseError> {
        let slot_id = Uuid::new_v4();
        let end_time = starts_at.time() + Duration::minutes(duration_minutes);

        db.transaction(move |tx| {
            tx.execute(
                "INSERT INTO slots (id, doctor_id, slot_date, start_time, end_time, max_bookings,
                     current_bookings, is_available, version, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 1, 0, ?7, ?7)",
                params![
                    slot_id.to_string(),
                    doctor_id.to_string(),
                    starts_at.date(),
                    starts_at.time(),
                    end_time,
                    max_bookings,
                    Utc::now()
                ],
            )?;
            Ok(slot_id)
        })
        .await
    }

    /// A start instant `hours` from now, on a whole minute, moved back just
    /// enough that a `duration_minutes` slot still ends on the same day.
    pub fn slot_start_in(hours: i64, duration_minutes: i64) -> NaiveDateTime {
        let target = local_now() + Duration::hours(hours);
        let target = target
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(target);

        let latest_start = NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(NaiveTime::MIN)
            - Duration::minutes(duration_minutes);
        if target.time() > latest_start {
            target.date().and_time(latest_start)
        } else {
            target
        }
    }
}
