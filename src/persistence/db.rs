//! `SQLite` connection pool and schema bootstrap.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::{AppError, Result};

use super::schema;

/// Alias for the shared `SQLite` pool.
pub type Database = SqlitePool;

/// Open (creating if missing) the database file and apply the schema.
///
/// # Errors
///
/// Returns `AppError::Db` if the pool cannot be opened or the schema fails
/// to apply, `AppError::Io` if the parent directory cannot be created.
pub async fn connect(db_path: &Path) -> Result<Database> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|err| AppError::Io(format!("failed to create db dir: {err}")))?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    schema::apply(&pool).await?;
    Ok(pool)
}

/// Open an in-memory database for tests.
///
/// A single connection is kept so the memory database survives between
/// queries.
///
/// # Errors
///
/// Returns `AppError::Db` if the pool cannot be opened or the schema fails
/// to apply.
pub async fn connect_memory() -> Result<Database> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(AppError::from)?;
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    schema::apply(&pool).await?;
    Ok(pool)
}
