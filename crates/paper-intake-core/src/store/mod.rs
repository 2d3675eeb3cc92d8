//! Storage abstraction for uploaded documents.
//!
//! The [`DocumentStore`] trait is the only way the resolver and the
//! replacement executor touch persisted state, so the same logic runs
//! against SQLite in production and [`memory::InMemoryStore`] in tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes, and
//! must reject any write that would leave two `completed` rows with the same
//! `(project_id, file_name)`. That constraint is what closes the
//! check-then-act race between concurrent uploads of the same file.

pub mod memory;

use async_trait::async_trait;

use crate::models::{DocumentPatch, DocumentRecord};

/// Failure talking to a document store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(String),

    /// The write would violate the one-completed-per-filename constraint.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Connection, I/O or query failure. Callers should treat this as
    /// retryable and must not read it as "no documents".
    #[error("document store unavailable: {0}")]
    Backend(#[source] anyhow::Error),
}

impl StoreError {
    pub fn backend(err: impl Into<anyhow::Error>) -> Self {
        StoreError::Backend(err.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Abstract document store.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`list_completed`](DocumentStore::list_completed) | Completed rows for a project |
/// | [`list_project`](DocumentStore::list_project) | Every row for a project, any status |
/// | [`get`](DocumentStore::get) | Fetch one row by id |
/// | [`insert`](DocumentStore::insert) | Store a new row |
/// | [`delete`](DocumentStore::delete) | Remove a row |
/// | [`update`](DocumentStore::update) | Patch a row in place |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// All rows with status `completed` for the project.
    async fn list_completed(&self, project_id: &str) -> StoreResult<Vec<DocumentRecord>>;

    /// All rows for the project, newest first.
    async fn list_project(&self, project_id: &str) -> StoreResult<Vec<DocumentRecord>>;

    async fn get(&self, id: &str) -> StoreResult<Option<DocumentRecord>>;

    /// Insert a new row. Returns the row as stored.
    async fn insert(&self, record: &DocumentRecord) -> StoreResult<DocumentRecord>;

    /// Delete a row. Returns [`StoreError::NotFound`] if it does not exist.
    async fn delete(&self, id: &str) -> StoreResult<()>;

    /// Apply a patch and return the updated row.
    async fn update(&self, id: &str, patch: &DocumentPatch) -> StoreResult<DocumentRecord>;
}
