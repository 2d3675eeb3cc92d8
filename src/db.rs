//! SQLite database connection management.
//!
//! One pool is opened per process and shared by the HTTP handlers and CLI
//! commands through [`SqliteStore`](crate::sqlite_store::SqliteStore).
//!
//! # Write-Ahead Logging (WAL)
//!
//! WAL mode lets duplicate checks keep reading while a replacement writes.
//! The busy timeout covers the short window where two uploads race for the
//! single writer.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

use crate::config::Config;

/// Create a connection pool to the configured SQLite database.
///
/// Creates the database file and parent directories if they don't exist.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    Ok(pool)
}
