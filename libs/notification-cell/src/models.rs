use std::fmt;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_config::AppConfig;

/// Snapshot of an appointment taken after its transaction committed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentDetails {
    pub appointment_id: Uuid,
    pub patient_name: String,
    pub patient_email: String,
    pub doctor_name: String,
    pub doctor_email: String,
    pub specialization: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    AppointmentBooked(AppointmentDetails),
    AppointmentApproved(AppointmentDetails),
    AppointmentCancelled {
        details: AppointmentDetails,
        cancellation_reason: Option<String>,
    },
}

impl NotificationEvent {
    pub fn appointment_id(&self) -> Uuid {
        match self {
            NotificationEvent::AppointmentBooked(details)
            | NotificationEvent::AppointmentApproved(details)
            | NotificationEvent::AppointmentCancelled { details, .. } => details.appointment_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            NotificationEvent::AppointmentBooked(_) => "appointment_booked",
            NotificationEvent::AppointmentApproved(_) => "appointment_approved",
            NotificationEvent::AppointmentCancelled { .. } => "appointment_cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Sent,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Sent => "sent",
            OutboxStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboxEntry {
    pub id: Uuid,
    pub message: EmailMessage,
    pub status: OutboxStatus,
    pub attempt_count: u32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sent: usize,
    pub retrying: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    pub max_attempts: u32,
    pub batch_size: usize,
    pub delivery_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            max_attempts: 3,
            batch_size: 10,
            delivery_timeout: Duration::from_secs(15),
        }
    }
}

impl WorkerConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.notification_poll_interval_secs.max(1)),
            max_attempts: config.notification_max_attempts.max(1),
            ..Self::default()
        }
    }
}
