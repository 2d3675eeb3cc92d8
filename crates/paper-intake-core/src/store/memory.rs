//! In-memory [`DocumentStore`] implementation for tests and embedding.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`. Enforces the same
//! one-completed-per-filename rule as the SQLite schema, keyed by
//! [`name_key`], so tests exercise the real conflict behaviour.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::anyhow;
use async_trait::async_trait;

use crate::models::{name_key, DocumentPatch, DocumentRecord, UploadStatus};

use super::{DocumentStore, StoreError, StoreResult};

/// In-memory store keyed by document id.
pub struct InMemoryStore {
    docs: RwLock<HashMap<String, DocumentRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
        }
    }

    /// Builds a store pre-populated with `records`, bypassing the
    /// uniqueness check so fixtures can model already-broken projects.
    pub fn with_records(records: impl IntoIterator<Item = DocumentRecord>) -> Self {
        let docs = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self {
            docs: RwLock::new(docs),
        }
    }

    /// Number of rows currently held, any status.
    pub fn len(&self) -> usize {
        self.docs.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, HashMap<String, DocumentRecord>>> {
        self.docs
            .read()
            .map_err(|_| StoreError::Backend(anyhow!("in-memory store lock poisoned")))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, HashMap<String, DocumentRecord>>> {
        self.docs
            .write()
            .map_err(|_| StoreError::Backend(anyhow!("in-memory store lock poisoned")))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn check_unique(
    docs: &HashMap<String, DocumentRecord>,
    candidate: &DocumentRecord,
) -> StoreResult<()> {
    if candidate.status != UploadStatus::Completed {
        return Ok(());
    }
    let key = name_key(&candidate.file_name);
    let clash = docs.values().any(|d| {
        d.id != candidate.id
            && d.status == UploadStatus::Completed
            && d.project_id == candidate.project_id
            && name_key(&d.file_name) == key
    });
    if clash {
        return Err(StoreError::Conflict(format!(
            "project {} already has a completed document named '{}'",
            candidate.project_id, candidate.file_name
        )));
    }
    Ok(())
}

fn newest_first(mut rows: Vec<DocumentRecord>) -> Vec<DocumentRecord> {
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    rows
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn list_completed(&self, project_id: &str) -> StoreResult<Vec<DocumentRecord>> {
        let docs = self.read()?;
        Ok(newest_first(
            docs.values()
                .filter(|d| d.project_id == project_id && d.status == UploadStatus::Completed)
                .cloned()
                .collect(),
        ))
    }

    async fn list_project(&self, project_id: &str) -> StoreResult<Vec<DocumentRecord>> {
        let docs = self.read()?;
        Ok(newest_first(
            docs.values()
                .filter(|d| d.project_id == project_id)
                .cloned()
                .collect(),
        ))
    }

    async fn get(&self, id: &str) -> StoreResult<Option<DocumentRecord>> {
        Ok(self.read()?.get(id).cloned())
    }

    async fn insert(&self, record: &DocumentRecord) -> StoreResult<DocumentRecord> {
        let mut docs = self.write()?;
        if docs.contains_key(&record.id) {
            return Err(StoreError::Conflict(format!(
                "document id already exists: {}",
                record.id
            )));
        }
        check_unique(&docs, record)?;
        docs.insert(record.id.clone(), record.clone());
        Ok(record.clone())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        match self.write()?.remove(id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    async fn update(&self, id: &str, patch: &DocumentPatch) -> StoreResult<DocumentRecord> {
        let mut docs = self.write()?;
        let mut updated = docs
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        patch.apply_to(&mut updated);
        check_unique(&docs, &updated)?;
        docs.insert(id.to_string(), updated.clone());
        Ok(updated)
    }
}
