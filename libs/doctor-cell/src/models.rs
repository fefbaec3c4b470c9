use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use auth_cell::AuthorizationGuard;
use shared_config::AppConfig;
use shared_database::{Database, DatabaseError};
use shared_models::error::AppError;

use crate::services::DoctorService;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Doctor {
    pub id: Uuid,
    pub user_id: Uuid,
    pub specialization: String,
    pub qualification: Option<String>,
    pub experience_years: i32,
    pub consultation_fee: f64,
    pub bio: Option<String>,
    pub is_approved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Doctor row joined with the owning user's contact details.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoctorProfile {
    #[serde(flatten)]
    pub doctor: Doctor,
    pub full_name: Option<String>,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DoctorProfileRequest {
    pub specialization: Option<String>,
    pub qualification: Option<String>,
    pub experience_years: Option<i32>,
    pub consultation_fee: Option<f64>,
    pub bio: Option<String>,
}

/// Admin onboarding of a user that already exists in the directory.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDoctorRequest {
    pub email: String,
    #[serde(flatten)]
    pub profile: DoctorProfileRequest,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApproveDoctorRequest {
    pub is_approved: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DoctorSearchFilters {
    pub specialization: Option<String>,
    pub approved_only: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppointmentCounts {
    pub pending_appointments: i64,
    pub approved_appointments: i64,
    pub completed_appointments: i64,
    pub cancelled_appointments: i64,
    pub total_appointments: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SlotCounts {
    pub available_slots: i64,
    pub total_slots: i64,
    pub total_bookings: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoctorStats {
    pub appointments: AppointmentCounts,
    pub slots: SlotCounts,
}

#[derive(Error, Debug)]
pub enum DoctorError {
    #[error("Doctor not found")]
    NotFound,

    #[error("Doctor profile not found")]
    ProfileNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Doctor profile already exists for this user")]
    AlreadyExists,

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for DoctorError {
    fn from(err: rusqlite::Error) -> Self {
        DoctorError::Database(err.into())
    }
}

impl From<DoctorError> for AppError {
    fn from(err: DoctorError) -> Self {
        match err {
            DoctorError::NotFound
            | DoctorError::ProfileNotFound
            | DoctorError::UserNotFound => AppError::NotFound(err.to_string()),
            DoctorError::AlreadyExists => AppError::Conflict(err.to_string()),
            DoctorError::Validation(msg) => AppError::ValidationError(msg),
            DoctorError::Database(db) => db.into(),
        }
    }
}

pub struct DoctorCellState {
    pub config: Arc<AppConfig>,
    pub doctors: Arc<DoctorService>,
    pub guard: Arc<AuthorizationGuard>,
}

impl DoctorCellState {
    pub fn new(config: Arc<AppConfig>, db: Arc<Database>) -> Self {
        Self {
            config,
            doctors: Arc::new(DoctorService::new(db.clone())),
            guard: Arc::new(AuthorizationGuard::new(db)),
        }
    }
}
