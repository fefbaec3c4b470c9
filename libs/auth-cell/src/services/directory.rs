use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use shared_database::{uuid_column, DatabaseError};
use shared_models::auth::Role;

use crate::models::DirectoryUser;

const USER_COLUMNS: &str = "id, email, full_name, phone, role, created_at, updated_at";

fn map_user(row: &Row<'_>) -> rusqlite::Result<DirectoryUser> {
    let raw_role: String = row.get("role")?;
    let role = raw_role.parse::<Role>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            e.into(),
        )
    })?;

    Ok(DirectoryUser {
        id: uuid_column(row, "id")?,
        email: row.get("email")?,
        full_name: row.get("full_name")?,
        phone: row.get("phone")?,
        role,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn find_user(conn: &Connection, user_id: Uuid) -> Result<Option<DirectoryUser>, DatabaseError> {
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            params![user_id.to_string()],
            map_user,
        )
        .optional()?;
    Ok(user)
}

/// Insert the user, or refresh email and profile fields of an existing row.
/// The role of an existing row is never touched here.
pub fn upsert_user(
    conn: &Connection,
    user_id: Uuid,
    email: &str,
    full_name: Option<&str>,
    phone: Option<&str>,
    initial_role: Role,
) -> Result<DirectoryUser, DatabaseError> {
    let now = Utc::now();
    conn.execute(
        "INSERT INTO users (id, email, full_name, phone, role, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
         ON CONFLICT(id) DO UPDATE SET
             email = excluded.email,
             full_name = COALESCE(excluded.full_name, users.full_name),
             phone = COALESCE(excluded.phone, users.phone),
             updated_at = excluded.updated_at",
        params![
            user_id.to_string(),
            email,
            full_name,
            phone,
            initial_role.as_str(),
            now
        ],
    )?;

    find_user(conn, user_id)?.ok_or_else(|| DatabaseError::InvalidValue {
        field: "users.id".to_string(),
        value: user_id.to_string(),
    })
}

pub fn set_role(conn: &Connection, user_id: Uuid, role: Role) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET role = ?1, updated_at = ?2 WHERE id = ?3",
        params![role.as_str(), Utc::now(), user_id.to_string()],
    )?;
    Ok(changed > 0)
}

/// Name shown for a user in listings and history; falls back to the email.
pub fn display_name(conn: &Connection, user_id: Uuid) -> Result<Option<String>, DatabaseError> {
    let name = conn
        .query_row(
            "SELECT COALESCE(full_name, email) FROM users WHERE id = ?1",
            params![user_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(name)
}
