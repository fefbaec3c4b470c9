//! Append-only ledger of status transitions.

use chrono::Utc;
use rusqlite::{params, Connection};
use uuid::Uuid;

use shared_database::{opt_uuid_column, uuid_column};

use crate::models::{AppointmentError, AppointmentStatus, HistoryAction, HistoryEntry};

#[derive(Debug, Clone)]
pub struct NewHistoryEntry<'a> {
    pub appointment_id: Uuid,
    pub action: HistoryAction,
    pub old_status: Option<AppointmentStatus>,
    pub new_status: AppointmentStatus,
    pub changed_by: Uuid,
    pub change_reason: Option<&'a str>,
}

pub fn append(conn: &Connection, entry: NewHistoryEntry<'_>) -> Result<(), AppointmentError> {
    conn.execute(
        "INSERT INTO appointment_history
             (appointment_id, action, old_status, new_status, changed_by, change_reason, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.appointment_id.to_string(),
            entry.action,
            entry.old_status,
            entry.new_status,
            entry.changed_by.to_string(),
            entry.change_reason,
            Utc::now()
        ],
    )?;
    Ok(())
}

/// Most recent first, with the actor's display name resolved.
pub fn list(conn: &Connection, appointment_id: Uuid) -> Result<Vec<HistoryEntry>, AppointmentError> {
    let mut stmt = conn.prepare(
        "SELECT h.id, h.appointment_id, h.action, h.old_status, h.new_status, h.changed_by,
                COALESCE(u.full_name, u.email) AS changed_by_name, h.change_reason, h.created_at
         FROM appointment_history h
         LEFT JOIN users u ON h.changed_by = u.id
         WHERE h.appointment_id = ?1
         ORDER BY h.created_at DESC, h.id DESC",
    )?;

    let entries = stmt
        .query_map(params![appointment_id.to_string()], |row| {
            Ok(HistoryEntry {
                id: row.get("id")?,
                appointment_id: uuid_column(row, "appointment_id")?,
                action: row.get("action")?,
                old_status: row.get("old_status")?,
                new_status: row.get("new_status")?,
                changed_by: opt_uuid_column(row, "changed_by")?,
                changed_by_name: row.get("changed_by_name")?,
                change_reason: row.get("change_reason")?,
                created_at: row.get("created_at")?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}
