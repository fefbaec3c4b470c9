use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use auth_cell::AuthorizationGuard;
use doctor_cell::DoctorError;
use shared_config::AppConfig;
use shared_database::{Database, DatabaseError};
use shared_models::error::AppError;

use crate::services::SlotService;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Slot {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub slot_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub max_bookings: i32,
    pub current_bookings: i32,
    pub is_available: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Slot {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.slot_date.and_time(self.start_time)
    }

    pub fn is_full(&self) -> bool {
        self.current_bookings >= self.max_bookings
    }
}

/// A slot read under the transaction's write lock, joined with its doctor.
#[derive(Debug, Clone)]
pub struct LockedSlot {
    pub slot: Slot,
    pub doctor_user_id: Uuid,
    pub doctor_name: String,
    pub doctor_email: String,
    pub specialization: String,
    pub doctor_approved: bool,
}

/// Row of the patient-facing availability listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableSlot {
    #[serde(flatten)]
    pub slot: Slot,
    pub doctor_name: String,
    pub specialization: String,
    pub qualification: Option<String>,
    pub consultation_fee: f64,
}

/// Row of a doctor's own slot listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorSlot {
    #[serde(flatten)]
    pub slot: Slot,
    pub total_appointments: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateSlotRequest {
    pub slot_date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub max_bookings: Option<i32>,
}

/// Validated form of [`CreateSlotRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewSlot {
    pub slot_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub max_bookings: i32,
}

impl CreateSlotRequest {
    pub fn validate(&self) -> Result<NewSlot, SlotError> {
        let (Some(date), Some(start), Some(end)) = (
            non_blank(&self.slot_date),
            non_blank(&self.start_time),
            non_blank(&self.end_time),
        ) else {
            return Err(SlotError::Validation("Date and time are required".to_string()));
        };

        let slot_date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|_| SlotError::Validation(format!("Invalid slot_date: {}", date)))?;
        let start_time = parse_time("start_time", start)?;
        let end_time = parse_time("end_time", end)?;

        if start_time >= end_time {
            return Err(SlotError::Validation(
                "start_time must be before end_time".to_string(),
            ));
        }

        let max_bookings = self.max_bookings.unwrap_or(1);
        if max_bookings < 1 {
            return Err(SlotError::Validation(
                "max_bookings must be at least 1".to_string(),
            ));
        }

        Ok(NewSlot {
            slot_date,
            start_time,
            end_time,
            max_bookings,
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Accepts `HH:MM` or `HH:MM:SS`.
pub fn parse_time(field: &str, raw: &str) -> Result<NaiveTime, SlotError> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|_| SlotError::Validation(format!("Invalid {}: {}", field, raw)))
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct UpdateSlotRequest {
    pub is_available: Option<bool>,
    pub max_bookings: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AvailableSlotsQuery {
    pub doctor_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub specialization: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DoctorSlotsQuery {
    pub date: Option<NaiveDate>,
    pub status: Option<String>,
}

#[derive(Error, Debug)]
pub enum SlotError {
    #[error("Slot not found")]
    NotFound,

    #[error("Slot not found or unauthorized")]
    NotOwned,

    #[error("Doctor profile not found")]
    DoctorProfileNotFound,

    #[error("Doctor profile not approved yet")]
    DoctorNotApproved,

    #[error("Slot conflicts with existing time slot")]
    Overlap,

    #[error("Slot is no longer available")]
    Unavailable,

    #[error("Cannot book past slots")]
    InPast,

    #[error("Slot was just booked by someone else. Please try again.")]
    ConcurrencyConflict,

    #[error("Cannot delete slot with active bookings")]
    ActiveBookings,

    #[error("max_bookings cannot be lower than current bookings ({current})")]
    CapacityBelowBookings { current: i32 },

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Doctor(#[from] DoctorError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for SlotError {
    fn from(err: rusqlite::Error) -> Self {
        SlotError::Database(err.into())
    }
}

impl From<SlotError> for AppError {
    fn from(err: SlotError) -> Self {
        match err {
            SlotError::NotFound | SlotError::NotOwned | SlotError::DoctorProfileNotFound => {
                AppError::NotFound(err.to_string())
            }
            SlotError::DoctorNotApproved => AppError::Forbidden(err.to_string()),
            SlotError::Overlap
            | SlotError::Unavailable
            | SlotError::ConcurrencyConflict
            | SlotError::CapacityBelowBookings { .. } => AppError::Conflict(err.to_string()),
            SlotError::InPast | SlotError::ActiveBookings => AppError::BadRequest(err.to_string()),
            SlotError::Validation(msg) => AppError::ValidationError(msg),
            SlotError::Doctor(doctor) => doctor.into(),
            SlotError::Database(db) => db.into(),
        }
    }
}

pub struct SlotCellState {
    pub config: Arc<AppConfig>,
    pub slots: Arc<SlotService>,
    pub guard: Arc<AuthorizationGuard>,
}

impl SlotCellState {
    pub fn new(config: Arc<AppConfig>, db: Arc<Database>) -> Self {
        Self {
            config,
            slots: Arc::new(SlotService::new(db.clone())),
            guard: Arc::new(AuthorizationGuard::new(db)),
        }
    }
}
