//! SQLite connection management.
//!
//! The pipeline is a single writer, so the pool is capped at one
//! connection; WAL mode lets `get` and `stats` read while a run is in
//! progress from another process. For file databases the parent directory
//! is created if it does not exist.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::config::Config;

/// Create a connection pool for the configured `db.url`.
///
/// # Errors
///
/// Returns an error if the URL cannot be parsed, the parent directory
/// cannot be created, or the database cannot be opened.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    connect_url(&config.db.url).await
}

pub async fn connect_url(url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    // Ensure parent directory exists
    if let Some(parent) = options.get_filename().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// In-memory database with the schema applied, for unit tests.
#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    let pool = connect_url("sqlite::memory:").await.unwrap();
    let mut conn = pool.acquire().await.unwrap();
    crate::migrate::apply_schema(&mut conn).await.unwrap();
    drop(conn);
    pool
}
