// libs/appointment-cell/src/models.rs
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use auth_cell::AuthorizationGuard;
use doctor_cell::DoctorError;
use notification_cell::NotificationDispatcher;
use shared_config::AppConfig;
use shared_database::{Database, DatabaseError};
use shared_models::error::AppError;
use slot_cell::SlotError;

use crate::services::AppointmentService;

// ==============================================================================
// STATUS AND HISTORY ENUMS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Approved,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Approved => "approved",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AppointmentStatus::Pending),
            "approved" => Ok(AppointmentStatus::Approved),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            "completed" => Ok(AppointmentStatus::Completed),
            other => Err(format!("Unknown appointment status: {}", other)),
        }
    }
}

impl ToSql for AppointmentStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for AppointmentStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// Label of one row in the history ledger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HistoryAction {
    Created,
    Approved,
    Cancelled,
    Rescheduled,
    Completed,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Created => "created",
            HistoryAction::Approved => "approved",
            HistoryAction::Cancelled => "cancelled",
            HistoryAction::Rescheduled => "rescheduled",
            HistoryAction::Completed => "completed",
        }
    }
}

impl FromStr for HistoryAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(HistoryAction::Created),
            "approved" => Ok(HistoryAction::Approved),
            "cancelled" => Ok(HistoryAction::Cancelled),
            "rescheduled" => Ok(HistoryAction::Rescheduled),
            "completed" => Ok(HistoryAction::Completed),
            other => Err(format!("Unknown history action: {}", other)),
        }
    }
}

impl ToSql for HistoryAction {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for HistoryAction {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

// ==============================================================================
// RECORDS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub slot_id: Option<Uuid>,
    pub appointment_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub reason: Option<String>,
    pub status: AppointmentStatus,
    pub admin_notes: Option<String>,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.appointment_date.and_time(self.start_time)
    }
}

/// Listing row: the appointment plus the names a dashboard shows next to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentSummary {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub patient_name: String,
    pub patient_email: String,
    pub doctor_name: String,
    pub specialization: String,
    pub consultation_fee: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub appointment_id: Uuid,
    pub action: HistoryAction,
    pub old_status: Option<AppointmentStatus>,
    pub new_status: AppointmentStatus,
    pub changed_by: Option<Uuid>,
    pub changed_by_name: Option<String>,
    pub change_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ==============================================================================
// REQUESTS
// ==============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookAppointmentRequest {
    pub slot_id: Option<String>,
    pub reason: Option<String>,
}

impl BookAppointmentRequest {
    pub fn slot_id(&self) -> Result<Uuid, AppointmentError> {
        required_id(&self.slot_id, "Slot ID is required", "Invalid slot ID")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApproveAppointmentRequest {
    pub admin_notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelAppointmentRequest {
    pub cancellation_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub new_slot_id: Option<String>,
}

impl RescheduleAppointmentRequest {
    pub fn new_slot_id(&self) -> Result<Uuid, AppointmentError> {
        required_id(&self.new_slot_id, "New slot ID is required", "Invalid new slot ID")
    }
}

fn required_id(raw: &Option<String>, missing: &str, invalid: &str) -> Result<Uuid, AppointmentError> {
    let raw = raw
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppointmentError::Validation(missing.to_string()))?;
    Uuid::parse_str(raw).map_err(|_| AppointmentError::Validation(invalid.to_string()))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentListQuery {
    pub status: Option<AppointmentStatus>,
    pub date: Option<NaiveDate>,
}

// ==============================================================================
// POLICY
// ==============================================================================

/// Time windows that gate patient-driven changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppointmentPolicy {
    pub cancellation_cutoff_hours: i64,
    pub reschedule_cutoff_hours: i64,
}

impl Default for AppointmentPolicy {
    fn default() -> Self {
        Self {
            cancellation_cutoff_hours: 24,
            reschedule_cutoff_hours: 48,
        }
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Appointment not found or unauthorized")]
    NotFoundOrUnauthorized,

    #[error("Doctor profile not found")]
    DoctorProfileNotFound,

    #[error("You already have an appointment in this slot")]
    DuplicateBooking,

    #[error("Appointment already cancelled")]
    AlreadyCancelled,

    #[error("Cannot {action} appointment with status: {status}")]
    InvalidTransition {
        action: &'static str,
        status: AppointmentStatus,
    },

    #[error("Cannot cancel appointment within {hours} hours. Please contact support.")]
    CancellationWindow { hours: i64 },

    #[error("Cannot reschedule appointment within {hours} hours")]
    RescheduleWindow { hours: i64 },

    #[error("New slot not found")]
    NewSlotNotFound,

    #[error("New slot is not available")]
    NewSlotUnavailable,

    #[error("Cannot reschedule to a past slot")]
    NewSlotInPast,

    #[error("Appointment is already booked in this slot")]
    SameSlot,

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Slot(#[from] SlotError),

    #[error(transparent)]
    Doctor(#[from] DoctorError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for AppointmentError {
    fn from(err: rusqlite::Error) -> Self {
        AppointmentError::Database(err.into())
    }
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound
            | AppointmentError::NotFoundOrUnauthorized
            | AppointmentError::DoctorProfileNotFound
            | AppointmentError::NewSlotNotFound => AppError::NotFound(err.to_string()),
            AppointmentError::DuplicateBooking | AppointmentError::NewSlotUnavailable => {
                AppError::Conflict(err.to_string())
            }
            AppointmentError::AlreadyCancelled
            | AppointmentError::InvalidTransition { .. }
            | AppointmentError::CancellationWindow { .. }
            | AppointmentError::RescheduleWindow { .. }
            | AppointmentError::NewSlotInPast
            | AppointmentError::SameSlot => AppError::BadRequest(err.to_string()),
            AppointmentError::Validation(msg) => AppError::ValidationError(msg),
            AppointmentError::Slot(slot) => slot.into(),
            AppointmentError::Doctor(doctor) => doctor.into(),
            AppointmentError::Database(db) => db.into(),
        }
    }
}

// ==============================================================================
// CELL STATE
// ==============================================================================

pub struct AppointmentCellState {
    pub config: Arc<AppConfig>,
    pub appointments: Arc<AppointmentService>,
    pub guard: Arc<AuthorizationGuard>,
}

impl AppointmentCellState {
    pub fn new(config: Arc<AppConfig>, db: Arc<Database>, dispatcher: NotificationDispatcher) -> Self {
        Self {
            config,
            appointments: Arc::new(AppointmentService::new(
                db.clone(),
                dispatcher,
                AppointmentPolicy::default(),
            )),
            guard: Arc::new(AuthorizationGuard::new(db)),
        }
    }
}
