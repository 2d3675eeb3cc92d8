//! SQLite-backed [`DocumentStore`] implementation.
//!
//! Timestamps are stored as Unix milliseconds so recency ordering stays
//! meaningful for uploads that land within the same second. `name_key` is
//! written alongside `file_name` on every insert and update so the unique
//! index compares names the way the scorer does. Unique-index violations are surfaced as [`StoreError::Conflict`]; every other sqlx
//! failure becomes [`StoreError::Backend`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use paper_intake_core::models::{name_key, DocumentPatch, DocumentRecord, UploadStatus};
use paper_intake_core::store::{DocumentStore, StoreError, StoreResult};

const COLUMNS: &str = "id, project_id, user_id, file_name, file_size, mime_type, content, \
                       status, created_at, updated_at";

/// SQLite implementation of the [`DocumentStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn map_err(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db) = err {
        if db.is_unique_violation() {
            return StoreError::Conflict(db.message().to_string());
        }
    }
    StoreError::backend(err)
}

fn from_millis(ms: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::backend(anyhow::anyhow!("timestamp out of range: {}", ms)))
}

fn row_to_record(row: &SqliteRow) -> StoreResult<DocumentRecord> {
    let status: String = row.try_get("status").map_err(map_err)?;
    let status = status
        .parse::<UploadStatus>()
        .map_err(StoreError::backend)?;

    Ok(DocumentRecord {
        id: row.try_get("id").map_err(map_err)?,
        project_id: row.try_get("project_id").map_err(map_err)?,
        user_id: row.try_get("user_id").map_err(map_err)?,
        file_name: row.try_get("file_name").map_err(map_err)?,
        file_size: row.try_get("file_size").map_err(map_err)?,
        mime_type: row.try_get("mime_type").map_err(map_err)?,
        content: row.try_get("content").map_err(map_err)?,
        status,
        created_at: from_millis(row.try_get("created_at").map_err(map_err)?)?,
        updated_at: from_millis(row.try_get("updated_at").map_err(map_err)?)?,
    })
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn list_completed(&self, project_id: &str) -> StoreResult<Vec<DocumentRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE project_id = ? AND status = 'completed' \
             ORDER BY created_at DESC, id ASC",
            COLUMNS
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        rows.iter().map(row_to_record).collect()
    }

    async fn list_project(&self, project_id: &str) -> StoreResult<Vec<DocumentRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE project_id = ? ORDER BY created_at DESC, id ASC",
            COLUMNS
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        rows.iter().map(row_to_record).collect()
    }

    async fn get(&self, id: &str) -> StoreResult<Option<DocumentRecord>> {
        let row = sqlx::query(&format!("SELECT {} FROM documents WHERE id = ?", COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn insert(&self, record: &DocumentRecord) -> StoreResult<DocumentRecord> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, project_id, user_id, file_name, name_key, file_size,
                                   mime_type, content, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.project_id)
        .bind(&record.user_id)
        .bind(&record.file_name)
        .bind(name_key(&record.file_name))
        .bind(record.file_size)
        .bind(&record.mime_type)
        .bind(&record.content)
        .bind(record.status.as_str())
        .bind(record.created_at.timestamp_millis())
        .bind(record.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(map_err)?;

        Ok(record.clone())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn update(&self, id: &str, patch: &DocumentPatch) -> StoreResult<DocumentRecord> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;

        let row = sqlx::query(&format!("SELECT {} FROM documents WHERE id = ?", COLUMNS))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_err)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let mut record = row_to_record(&row)?;
        patch.apply_to(&mut record);

        sqlx::query(
            r#"
            UPDATE documents
            SET file_name = ?, name_key = ?, file_size = ?, mime_type = ?, content = ?,
                status = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&record.file_name)
        .bind(name_key(&record.file_name))
        .bind(record.file_size)
        .bind(&record.mime_type)
        .bind(&record.content)
        .bind(record.status.as_str())
        .bind(record.updated_at.timestamp_millis())
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(map_err)?;

        tx.commit().await.map_err(map_err)?;
        Ok(record)
    }
}
