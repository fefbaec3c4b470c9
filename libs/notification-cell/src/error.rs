use thiserror::Error;

use shared_database::DatabaseError;

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Relay request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Outbox error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for NotificationError {
    fn from(err: rusqlite::Error) -> Self {
        NotificationError::Database(err.into())
    }
}
