//! Replacing a stored document with a new upload.
//!
//! The store offers no multi-row transaction through [`DocumentStore`], so a
//! replacement is a short sequence of single-row writes. Two strategies are
//! available:
//!
//! | Strategy | Steps | Worst case on crash |
//! |----------|-------|---------------------|
//! | `delete-then-insert` | delete old, insert new | project has no copy of the file |
//! | `insert-then-retire` | insert new (pending), mark old superseded, promote new, delete old | both rows present |
//!
//! Whatever the strategy, the executor re-reads the project afterwards and
//! only reports [`ReplaceOutcome::Replaced`] when exactly one completed row
//! carries the new file name (compared by [`name_key`]) and it is the new
//! row.
//!
//! A failure after the old row is gone is reported as
//! [`ReplaceOutcome::Partial`] and logged with the project and document ids
//! so the gap can be repaired. That includes the old row vanishing under a
//! concurrent delete before the executor removed it.

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::models::{name_key, DocumentPatch, DocumentRecord, NewDocument, UploadStatus};
use crate::store::{DocumentStore, StoreError};

/// Order of writes used to swap the old row for the new one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplaceStrategy {
    #[default]
    DeleteThenInsert,
    InsertThenRetire,
}

/// Result of a replacement that got past its preconditions.
#[derive(Debug)]
pub enum ReplaceOutcome {
    /// New row stored and verified as the only completed row for its name.
    Replaced(DocumentRecord),

    /// Nothing changed; the original row is intact.
    Failed {
        project_id: String,
        existing_document_id: String,
        reason: String,
    },

    /// The old row is gone or retired but the new one is missing or not
    /// completed. Needs reconciliation.
    Partial {
        project_id: String,
        old_document_id: String,
        new_document_id: Option<String>,
        reason: String,
    },

    /// Writes succeeded but the post-condition did not hold (or could not
    /// be read back). `completed_count` is `None` when the read failed.
    Unverified {
        document: DocumentRecord,
        completed_count: Option<usize>,
    },
}

impl ReplaceOutcome {
    /// Stable label used in API responses and logs.
    pub fn label(&self) -> &'static str {
        match self {
            ReplaceOutcome::Replaced(_) => "replaced",
            ReplaceOutcome::Failed { .. } => "replace-failed",
            ReplaceOutcome::Partial { .. } => "replace-partial",
            ReplaceOutcome::Unverified { .. } => "replace-unverified",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ReplaceOutcome::Replaced(_))
    }
}

/// Precondition failures. No write has been attempted when these are returned.
#[derive(Debug, thiserror::Error)]
pub enum ReplaceError {
    #[error("invalid replacement: {0}")]
    Invalid(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("document {document_id} belongs to project {actual}, not {expected}")]
    ProjectMismatch {
        document_id: String,
        expected: String,
        actual: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Swaps an existing document for a new upload within one project.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplacementExecutor {
    strategy: ReplaceStrategy,
}

impl ReplacementExecutor {
    pub fn new(strategy: ReplaceStrategy) -> Self {
        Self { strategy }
    }

    pub async fn execute(
        &self,
        store: &dyn DocumentStore,
        existing_document_id: &str,
        upload: NewDocument,
    ) -> Result<ReplaceOutcome, ReplaceError> {
        if existing_document_id.trim().is_empty() {
            return Err(ReplaceError::Invalid(
                "existingDocumentId must not be empty".into(),
            ));
        }
        if upload.project_id.trim().is_empty() {
            return Err(ReplaceError::Invalid("projectId must not be empty".into()));
        }

        let existing = store
            .get(existing_document_id)
            .await?
            .ok_or_else(|| ReplaceError::NotFound(existing_document_id.to_string()))?;
        if existing.project_id != upload.project_id {
            return Err(ReplaceError::ProjectMismatch {
                document_id: existing.id,
                expected: upload.project_id,
                actual: existing.project_id,
            });
        }

        let outcome = match self.strategy {
            ReplaceStrategy::DeleteThenInsert => delete_then_insert(store, &existing, upload).await,
            ReplaceStrategy::InsertThenRetire => insert_then_retire(store, &existing, upload).await,
        };

        let outcome = match outcome {
            Step::Written(doc) => verify(store, doc).await,
            Step::Stopped(outcome) => outcome,
        };

        match &outcome {
            ReplaceOutcome::Replaced(doc) => info!(
                project_id = %doc.project_id,
                old_document_id = %existing.id,
                new_document_id = %doc.id,
                "document replaced"
            ),
            ReplaceOutcome::Failed { reason, .. } => warn!(
                project_id = %existing.project_id,
                document_id = %existing.id,
                %reason,
                "replace-failed"
            ),
            ReplaceOutcome::Partial {
                project_id,
                old_document_id,
                new_document_id,
                reason,
            } => error!(
                %project_id,
                %old_document_id,
                new_document_id = new_document_id.as_deref().unwrap_or("-"),
                %reason,
                "replace-partial: project needs reconciliation"
            ),
            ReplaceOutcome::Unverified {
                document,
                completed_count,
            } => warn!(
                project_id = %document.project_id,
                new_document_id = %document.id,
                file_name = %document.file_name,
                completed_count = ?completed_count,
                "replace-unverified"
            ),
        }

        Ok(outcome)
    }
}

/// Either the new row is in place, or the strategy stopped early.
enum Step {
    Written(DocumentRecord),
    Stopped(ReplaceOutcome),
}

async fn delete_then_insert(
    store: &dyn DocumentStore,
    existing: &DocumentRecord,
    upload: NewDocument,
) -> Step {
    match store.delete(&existing.id).await {
        Ok(()) => {}
        // Removed by someone else since the precondition read; the project
        // has no copy until the insert lands.
        Err(StoreError::NotFound(_)) => {
            return Step::Stopped(ReplaceOutcome::Partial {
                project_id: existing.project_id.clone(),
                old_document_id: existing.id.clone(),
                new_document_id: None,
                reason: "existing document was removed concurrently".into(),
            })
        }
        Err(e) => return Step::Stopped(failed(existing, e)),
    }

    let record = upload.into_record(UploadStatus::Completed);
    match store.insert(&record).await {
        Ok(doc) => Step::Written(doc),
        Err(e) => Step::Stopped(ReplaceOutcome::Partial {
            project_id: existing.project_id.clone(),
            old_document_id: existing.id.clone(),
            new_document_id: None,
            reason: e.to_string(),
        }),
    }
}

async fn insert_then_retire(
    store: &dyn DocumentStore,
    existing: &DocumentRecord,
    upload: NewDocument,
) -> Step {
    let pending = upload.into_record(UploadStatus::Pending);
    let pending = match store.insert(&pending).await {
        Ok(doc) => doc,
        Err(e) => return Step::Stopped(failed(existing, e)),
    };

    let retired = match store
        .update(&existing.id, &DocumentPatch::status(UploadStatus::Superseded))
        .await
    {
        Ok(_) => true,
        // Already gone: nothing left to retire, promote the new row.
        Err(StoreError::NotFound(_)) => false,
        Err(e) => return Step::Stopped(roll_back(store, existing, &pending, false, e).await),
    };

    let promoted = match store
        .update(&pending.id, &DocumentPatch::status(UploadStatus::Completed))
        .await
    {
        Ok(doc) => doc,
        Err(e) => return Step::Stopped(roll_back(store, existing, &pending, true, e).await),
    };

    // The superseded row no longer takes part in duplicate checks, so a
    // failed delete only leaves clutter for `reconcile` to sweep.
    if retired {
        if let Err(e) = store.delete(&existing.id).await {
            warn!(
                project_id = %existing.project_id,
                document_id = %existing.id,
                error = %e,
                "superseded document left in place"
            );
        }
    }

    Step::Written(promoted)
}

/// Undo an interrupted insert-then-retire. Clean undo reports `Failed`,
/// anything less reports `Partial`.
async fn roll_back(
    store: &dyn DocumentStore,
    existing: &DocumentRecord,
    pending: &DocumentRecord,
    old_retired: bool,
    cause: StoreError,
) -> ReplaceOutcome {
    let restored = if old_retired {
        store
            .update(&existing.id, &DocumentPatch::status(existing.status))
            .await
            .is_ok()
    } else {
        true
    };
    let removed = store.delete(&pending.id).await.is_ok();

    if restored && removed {
        failed(existing, cause)
    } else {
        ReplaceOutcome::Partial {
            project_id: existing.project_id.clone(),
            old_document_id: existing.id.clone(),
            new_document_id: (!removed).then(|| pending.id.clone()),
            reason: format!("{} (rollback incomplete)", cause),
        }
    }
}

fn failed(existing: &DocumentRecord, cause: StoreError) -> ReplaceOutcome {
    ReplaceOutcome::Failed {
        project_id: existing.project_id.clone(),
        existing_document_id: existing.id.clone(),
        reason: cause.to_string(),
    }
}

async fn verify(store: &dyn DocumentStore, doc: DocumentRecord) -> ReplaceOutcome {
    let rows = match store.list_completed(&doc.project_id).await {
        Ok(rows) => rows,
        Err(_) => {
            return ReplaceOutcome::Unverified {
                document: doc,
                completed_count: None,
            }
        }
    };

    let key = name_key(&doc.file_name);
    let same_name: Vec<&DocumentRecord> = rows
        .iter()
        .filter(|r| name_key(&r.file_name) == key)
        .collect();
    if same_name.len() == 1 && same_name[0].id == doc.id {
        ReplaceOutcome::Replaced(doc)
    } else {
        ReplaceOutcome::Unverified {
            completed_count: Some(same_name.len()),
            document: doc,
        }
    }
}
