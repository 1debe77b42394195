//! SQLite database connection management.
//!
//! Provides a connection pool to the SQLite file named by a
//! [`ConnectionDescriptor`], with WAL mode enabled so concurrent ingestion
//! tasks can write without blocking readers. The database file and its
//! parent directories are created automatically if they don't exist.
//!
//! # Busy timeout
//!
//! Concurrent writers serialize on SQLite's write lock. The descriptor's
//! timeout becomes the busy timeout, which bounds how long an insert waits
//! before the connector reports a failure.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::connector::ConnectionDescriptor;
use crate::error::ConnectorError;

/// Create a connection pool to the descriptor's database.
///
/// # Errors
///
/// Returns [`ConnectorError::Open`] if the directory cannot be created or the
/// database cannot be opened.
pub async fn connect(descriptor: &ConnectionDescriptor) -> Result<SqlitePool, ConnectorError> {
    let db_path = descriptor.database_path();
    let target = db_path.display().to_string();
    let open_error = |message: String| ConnectorError::Open {
        target: target.clone(),
        message,
    };

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| open_error(e.to_string()))?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
        .map_err(|e| open_error(e.to_string()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(descriptor.timeout);

    SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(descriptor.timeout)
        .connect_with(options)
        .await
        .map_err(|e| open_error(e.to_string()))
}
