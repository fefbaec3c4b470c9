//! Row access for the `appointments` table.

use chrono::{NaiveDate, NaiveTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use notification_cell::AppointmentDetails;
use shared_database::{opt_uuid_column, uuid_column};

use crate::models::{
    Appointment, AppointmentError, AppointmentListQuery, AppointmentStatus, AppointmentSummary,
};

const APPOINTMENT_COLUMNS: &str = "a.id, a.patient_id, a.doctor_id, a.slot_id, a.appointment_date, \
     a.start_time, a.end_time, a.reason, a.status, a.admin_notes, a.approved_by, a.approved_at, \
     a.cancellation_reason, a.cancelled_at, a.created_at, a.updated_at";

fn map_appointment(row: &Row<'_>) -> rusqlite::Result<Appointment> {
    Ok(Appointment {
        id: uuid_column(row, "id")?,
        patient_id: uuid_column(row, "patient_id")?,
        doctor_id: uuid_column(row, "doctor_id")?,
        slot_id: opt_uuid_column(row, "slot_id")?,
        appointment_date: row.get("appointment_date")?,
        start_time: row.get("start_time")?,
        end_time: row.get("end_time")?,
        reason: row.get("reason")?,
        status: row.get("status")?,
        admin_notes: row.get("admin_notes")?,
        approved_by: opt_uuid_column(row, "approved_by")?,
        approved_at: row.get("approved_at")?,
        cancellation_reason: row.get("cancellation_reason")?,
        cancelled_at: row.get("cancelled_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// An appointment with the people attached to it, read inside a transaction.
#[derive(Debug, Clone)]
pub struct AppointmentContext {
    pub appointment: Appointment,
    pub doctor_user_id: Uuid,
    pub doctor_name: String,
    pub doctor_email: String,
    pub specialization: String,
    pub patient_name: String,
    pub patient_email: String,
}

impl AppointmentContext {
    pub fn details(&self) -> AppointmentDetails {
        let appointment = &self.appointment;
        AppointmentDetails {
            appointment_id: appointment.id,
            patient_name: self.patient_name.clone(),
            patient_email: self.patient_email.clone(),
            doctor_name: self.doctor_name.clone(),
            doctor_email: self.doctor_email.clone(),
            specialization: self.specialization.clone(),
            date: appointment.appointment_date,
            start_time: appointment.start_time,
            end_time: appointment.end_time,
            status: appointment.status.to_string(),
            reason: appointment.reason.clone(),
        }
    }
}

pub struct NewAppointment<'a> {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub slot_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub reason: Option<&'a str>,
}

pub fn insert(conn: &Connection, new: NewAppointment<'_>) -> Result<Appointment, AppointmentError> {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO appointments (id, patient_id, doctor_id, slot_id, appointment_date, start_time,
             end_time, reason, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
        params![
            id.to_string(),
            new.patient_id.to_string(),
            new.doctor_id.to_string(),
            new.slot_id.to_string(),
            new.date,
            new.start_time,
            new.end_time,
            new.reason,
            AppointmentStatus::Pending,
            Utc::now()
        ],
    )?;

    find(conn, id)?.ok_or(AppointmentError::NotFound)
}

pub fn find(conn: &Connection, id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
    let appointment = conn
        .query_row(
            &format!("SELECT {} FROM appointments a WHERE a.id = ?1", APPOINTMENT_COLUMNS),
            params![id.to_string()],
            map_appointment,
        )
        .optional()?;
    Ok(appointment)
}

pub fn load_context(conn: &Connection, id: Uuid) -> Result<Option<AppointmentContext>, AppointmentError> {
    let sql = format!(
        "SELECT {}, d.user_id AS doctor_user_id, d.specialization,
                COALESCE(du.full_name, du.email) AS doctor_name, du.email AS doctor_email,
                COALESCE(pu.full_name, pu.email) AS patient_name, pu.email AS patient_email
         FROM appointments a
         JOIN doctors d ON a.doctor_id = d.id
         JOIN users du ON d.user_id = du.id
         JOIN users pu ON a.patient_id = pu.id
         WHERE a.id = ?1",
        APPOINTMENT_COLUMNS
    );

    let context = conn
        .query_row(&sql, params![id.to_string()], |row| {
            Ok(AppointmentContext {
                appointment: map_appointment(row)?,
                doctor_user_id: uuid_column(row, "doctor_user_id")?,
                doctor_name: row.get("doctor_name")?,
                doctor_email: row.get("doctor_email")?,
                specialization: row.get("specialization")?,
                patient_name: row.get("patient_name")?,
                patient_email: row.get("patient_email")?,
            })
        })
        .optional()?;
    Ok(context)
}

/// Whether the patient holds a non-cancelled appointment on the slot, other than `except`.
pub fn has_active_booking(
    conn: &Connection,
    patient_id: Uuid,
    slot_id: Uuid,
    except: Option<Uuid>,
) -> Result<bool, AppointmentError> {
    let exists = conn.query_row(
        "SELECT EXISTS(
             SELECT 1 FROM appointments
             WHERE patient_id = ?1 AND slot_id = ?2 AND status != 'cancelled'
               AND (?3 IS NULL OR id != ?3))",
        params![
            patient_id.to_string(),
            slot_id.to_string(),
            except.map(|id| id.to_string())
        ],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub fn mark_approved(
    conn: &Connection,
    id: Uuid,
    approver: Uuid,
    admin_notes: Option<&str>,
) -> Result<(), AppointmentError> {
    let now = Utc::now();
    conn.execute(
        "UPDATE appointments
         SET status = ?1, admin_notes = COALESCE(?2, admin_notes), approved_by = ?3,
             approved_at = ?4, updated_at = ?4
         WHERE id = ?5",
        params![
            AppointmentStatus::Approved,
            admin_notes,
            approver.to_string(),
            now,
            id.to_string()
        ],
    )?;
    Ok(())
}

pub fn mark_cancelled(conn: &Connection, id: Uuid, reason: Option<&str>) -> Result<(), AppointmentError> {
    let now = Utc::now();
    conn.execute(
        "UPDATE appointments
         SET status = ?1, cancellation_reason = ?2, cancelled_at = ?3, updated_at = ?3
         WHERE id = ?4",
        params![AppointmentStatus::Cancelled, reason, now, id.to_string()],
    )?;
    Ok(())
}

pub fn mark_completed(conn: &Connection, id: Uuid) -> Result<(), AppointmentError> {
    conn.execute(
        "UPDATE appointments SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![AppointmentStatus::Completed, Utc::now(), id.to_string()],
    )?;
    Ok(())
}

/// Points the appointment at a new slot and sends it back for approval.
pub fn move_to_slot(
    conn: &Connection,
    id: Uuid,
    doctor_id: Uuid,
    slot_id: Uuid,
    date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
) -> Result<(), AppointmentError> {
    conn.execute(
        "UPDATE appointments
         SET slot_id = ?1, doctor_id = ?2, appointment_date = ?3, start_time = ?4, end_time = ?5,
             status = ?6, approved_by = NULL, approved_at = NULL, updated_at = ?7
         WHERE id = ?8",
        params![
            slot_id.to_string(),
            doctor_id.to_string(),
            date,
            start_time,
            end_time,
            AppointmentStatus::Pending,
            Utc::now(),
            id.to_string()
        ],
    )?;
    Ok(())
}

/// Which appointments a listing covers and how it is ordered.
#[derive(Debug, Clone, Copy)]
pub enum ListScope {
    Patient(Uuid),
    Doctor(Uuid),
    All,
}

pub fn list(
    conn: &Connection,
    scope: ListScope,
    query: &AppointmentListQuery,
) -> Result<Vec<AppointmentSummary>, AppointmentError> {
    let (owner_clause, owner, order) = match scope {
        ListScope::Patient(id) => (
            "a.patient_id = ?1",
            Some(id.to_string()),
            "a.appointment_date DESC, a.start_time DESC",
        ),
        ListScope::Doctor(id) => (
            "a.doctor_id = ?1",
            Some(id.to_string()),
            "a.appointment_date ASC, a.start_time ASC",
        ),
        ListScope::All => ("?1 IS NULL", None, "a.created_at DESC"),
    };

    let sql = format!(
        "SELECT {}, COALESCE(pu.full_name, pu.email) AS patient_name, pu.email AS patient_email,
                COALESCE(du.full_name, du.email) AS doctor_name, d.specialization, d.consultation_fee
         FROM appointments a
         JOIN users pu ON a.patient_id = pu.id
         JOIN doctors d ON a.doctor_id = d.id
         JOIN users du ON d.user_id = du.id
         WHERE {}
           AND (?2 IS NULL OR a.status = ?2)
           AND (?3 IS NULL OR a.appointment_date = ?3)
         ORDER BY {}",
        APPOINTMENT_COLUMNS, owner_clause, order
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![owner, query.status, query.date], |row| {
            Ok(AppointmentSummary {
                appointment: map_appointment(row)?,
                patient_name: row.get("patient_name")?,
                patient_email: row.get("patient_email")?,
                doctor_name: row.get("doctor_name")?,
                specialization: row.get("specialization")?,
                consultation_fee: row.get("consultation_fee")?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}
