//! Durable queue of rendered e-mails in the `email_notifications` table.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use shared_database::{uuid_column, DatabaseError};

use crate::error::NotificationError;
use crate::models::{EmailMessage, OutboxEntry, OutboxStatus};

const OUTBOX_COLUMNS: &str =
    "id, recipient_email, subject, body, status, attempt_count, error_message, created_at, sent_at";

fn map_entry(row: &Row<'_>) -> rusqlite::Result<OutboxEntry> {
    let status: String = row.get("status")?;
    let status = match status.as_str() {
        "pending" => OutboxStatus::Pending,
        "sent" => OutboxStatus::Sent,
        "failed" => OutboxStatus::Failed,
        other => {
            return Err(rusqlite::Error::InvalidColumnType(
                4,
                format!("status={}", other),
                rusqlite::types::Type::Text,
            ))
        }
    };

    Ok(OutboxEntry {
        id: uuid_column(row, "id")?,
        message: EmailMessage {
            to: row.get("recipient_email")?,
            subject: row.get("subject")?,
            body: row.get("body")?,
        },
        status,
        attempt_count: row.get("attempt_count")?,
        error_message: row.get("error_message")?,
        created_at: row.get("created_at")?,
        sent_at: row.get("sent_at")?,
    })
}

pub fn enqueue(conn: &Connection, message: &EmailMessage) -> Result<Uuid, NotificationError> {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO email_notifications (id, recipient_email, subject, body, status, attempt_count, created_at)
         VALUES (?1, ?2, ?3, ?4, 'pending', 0, ?5)",
        params![id.to_string(), message.to, message.subject, message.body, Utc::now()],
    )?;
    Ok(id)
}

/// Oldest pending messages first.
pub fn pending_batch(conn: &Connection, limit: usize) -> Result<Vec<OutboxEntry>, NotificationError> {
    let sql = format!(
        "SELECT {} FROM email_notifications
         WHERE status = 'pending'
         ORDER BY created_at ASC, rowid ASC
         LIMIT ?1",
        OUTBOX_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let entries = stmt
        .query_map(params![limit as i64], map_entry)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

pub fn find_entry(conn: &Connection, id: Uuid) -> Result<Option<OutboxEntry>, NotificationError> {
    let sql = format!("SELECT {} FROM email_notifications WHERE id = ?1", OUTBOX_COLUMNS);
    let entry = conn
        .query_row(&sql, params![id.to_string()], map_entry)
        .optional()?;
    Ok(entry)
}

pub fn mark_sent(conn: &Connection, id: Uuid) -> Result<(), NotificationError> {
    conn.execute(
        "UPDATE email_notifications
         SET status = 'sent', attempt_count = attempt_count + 1, error_message = NULL, sent_at = ?2
         WHERE id = ?1",
        params![id.to_string(), Utc::now()],
    )?;
    Ok(())
}

/// Counts a failed attempt. The message stays pending until it runs out of attempts.
pub fn record_failure(
    conn: &Connection,
    id: Uuid,
    error: &str,
    max_attempts: u32,
) -> Result<OutboxStatus, NotificationError> {
    let status: String = conn
        .query_row(
            "UPDATE email_notifications
             SET attempt_count = attempt_count + 1,
                 error_message = ?2,
                 status = CASE WHEN attempt_count + 1 >= ?3 THEN 'failed' ELSE 'pending' END
             WHERE id = ?1
             RETURNING status",
            params![id.to_string(), error, max_attempts],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| {
            NotificationError::Database(DatabaseError::InvalidValue {
                field: "email_notifications.id".to_string(),
                value: id.to_string(),
            })
        })?;

    Ok(if status == "failed" {
        OutboxStatus::Failed
    } else {
        OutboxStatus::Pending
    })
}
