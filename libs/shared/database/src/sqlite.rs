use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::{types::Type, Connection, Row, Transaction, TransactionBehavior};
use tracing::{debug, error, info};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::error::DatabaseError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the scheduling store, cloned into every service as `Arc<Database>`.
///
/// All access goes through [`Database::transaction`] or [`Database::read`], which
/// acquire the connection for the duration of one closure and release it on
/// every exit path.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    location: String,
}

impl Database {
    pub fn from_config(config: &AppConfig) -> Result<Self, DatabaseError> {
        Self::open(&config.database_url)
    }

    pub fn open(location: &str) -> Result<Self, DatabaseError> {
        let conn = if location == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(Path::new(location))?
        };
        Self::initialize(conn, location)
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::open(":memory:")
    }

    fn initialize(conn: Connection, location: &str) -> Result<Self, DatabaseError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        configure_pragmas(&conn)?;
        run_migrations(&conn)?;
        info!("Scheduling store ready at {}", location);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location: location.to_string(),
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Run `f` inside an IMMEDIATE transaction.
    ///
    /// The write lock is taken by `BEGIN IMMEDIATE`, before `f` reads anything, so
    /// every row `f` reads is held exclusively until commit or rollback. `Ok`
    /// commits; `Err` rolls back before the error is returned.
    pub async fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<DatabaseError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);

        let joined = tokio::task::spawn_blocking(move || -> Result<T, E> {
            let mut guard = lock_connection(&conn);
            let tx = guard
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(DatabaseError::from)?;

            match f(&tx) {
                Ok(value) => {
                    tx.commit().map_err(DatabaseError::from)?;
                    Ok(value)
                }
                Err(err) => {
                    if let Err(rollback_err) = tx.rollback() {
                        error!("Rollback failed: {}", rollback_err);
                    } else {
                        debug!("Transaction rolled back");
                    }
                    Err(err)
                }
            }
        })
        .await;

        match joined {
            Ok(result) => result,
            Err(join_err) => Err(E::from(DatabaseError::Task(join_err.to_string()))),
        }
    }

    /// Run a read-only closure against the connection.
    pub async fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<DatabaseError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);

        let joined = tokio::task::spawn_blocking(move || {
            let guard = lock_connection(&conn);
            f(&guard)
        })
        .await;

        match joined {
            Ok(result) => result,
            Err(join_err) => Err(E::from(DatabaseError::Task(join_err.to_string()))),
        }
    }
}

// A panic inside a closure drops its Transaction, which rolls back, so the
// connection behind a poisoned lock is still consistent.
fn lock_connection(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}

fn configure_pragmas(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "PRAGMA foreign_keys=ON;
         PRAGMA journal_mode=DELETE;",
    )?;
    Ok(())
}

/// Run all pending migrations. Each one is applied in its own transaction, so a
/// failure leaves the schema at the previous version.
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current_version = current_schema_version(conn)?;

    let migrations: Vec<(i64, &str)> = vec![
        (1, include_str!("../migrations/001_initial.sql")),
    ];

    for (version, sql) in migrations {
        if version > current_version {
            info!("Running migration v{}", version);
            apply_migration(conn, sql).map_err(|e| match DatabaseError::from(e) {
                DatabaseError::Unavailable(msg) => DatabaseError::Unavailable(msg),
                other => DatabaseError::MigrationFailed {
                    version,
                    reason: other.to_string(),
                },
            })?;
        }
    }

    Ok(())
}

fn apply_migration(conn: &Connection, sql: &str) -> rusqlite::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(sql)?;
    tx.commit()
}

/// 0 when no schema exists yet. Any other failure, a busy store included, is
/// returned rather than read as an empty schema.
pub fn current_schema_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version')",
        [],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(0);
    }

    let version = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, Option<i64>>(0)
    })?;
    Ok(version.unwrap_or(0))
}

pub fn uuid_column(row: &Row<'_>, column: &str) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(column)?;
    Uuid::parse_str(&raw).map_err(|e| {
        let index = row.as_ref().column_index(column).unwrap_or(0);
        rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e))
    })
}

pub fn opt_uuid_column(row: &Row<'_>, column: &str) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(column)?;
    match raw {
        Some(raw) => Uuid::parse_str(&raw).map(Some).map_err(|e| {
            let index = row.as_ref().column_index(column).unwrap_or(0);
            rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e))
        }),
        None => Ok(None),
    }
}
