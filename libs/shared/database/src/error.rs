use rusqlite::ErrorCode;
use thiserror::Error;
use tracing::{debug, error};

use shared_models::error::AppError;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Store task failed: {0}")]
    Task(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::NotADatabase
                | ErrorCode::DiskFull => DatabaseError::Unavailable(err.to_string()),
                ErrorCode::ConstraintViolation => {
                    DatabaseError::ConstraintViolation(err.to_string())
                }
                _ => DatabaseError::Sqlite(err),
            },
            _ => DatabaseError::Sqlite(err),
        }
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Unavailable(msg) => {
                error!("Store unavailable: {}", msg);
                AppError::ServiceUnavailable(msg)
            }
            DatabaseError::ConstraintViolation(msg) => {
                debug!("Constraint violated: {}", msg);
                AppError::Conflict("Request conflicts with existing data".to_string())
            }
            other => AppError::Database(other.to_string()),
        }
    }
}
