//! Database schema migrations.
//!
//! Idempotent: every statement is `IF NOT EXISTS` or guarded, so
//! `intake init` can be run repeatedly. The partial unique index over
//! `name_key` is what stops two concurrent uploads from both landing as
//! `completed` under the same file name, compared the way the scorer
//! compares names.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use tracing::info;

use paper_intake_core::models::name_key;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Applies the schema to an open pool.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            file_name TEXT NOT NULL,
            name_key TEXT NOT NULL,
            file_size INTEGER NOT NULL,
            mime_type TEXT NOT NULL DEFAULT 'application/octet-stream',
            content TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL
                CHECK (status IN ('pending', 'completed', 'failed', 'superseded')),
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    add_name_key(pool).await?;

    sqlx::query("DROP INDEX IF EXISTS idx_documents_one_completed")
        .execute(pool)
        .await?;
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_documents_one_completed_name
        ON documents(project_id, name_key)
        WHERE status = 'completed'
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_project_status ON documents(project_id, status)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_created_at ON documents(created_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Databases created before `name_key` existed get the column added and
/// filled from `file_name`.
async fn add_name_key(pool: &SqlitePool) -> Result<()> {
    let present: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info('documents') WHERE name = 'name_key'",
    )
    .fetch_one(pool)
    .await?;
    if present > 0 {
        return Ok(());
    }

    sqlx::query("ALTER TABLE documents ADD COLUMN name_key TEXT NOT NULL DEFAULT ''")
        .execute(pool)
        .await?;

    let rows = sqlx::query("SELECT id, file_name FROM documents")
        .fetch_all(pool)
        .await?;
    for row in &rows {
        let id: String = row.try_get("id")?;
        let file_name: String = row.try_get("file_name")?;
        sqlx::query("UPDATE documents SET name_key = ? WHERE id = ?")
            .bind(name_key(&file_name))
            .bind(&id)
            .execute(pool)
            .await?;
    }
    info!(rows = rows.len(), "added name_key column");
    Ok(())
}
