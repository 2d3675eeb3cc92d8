//! Intake operations shared by the HTTP server and the CLI.
//!
//! [`IntakeService`] owns the store handle, the scoring policy and the
//! replacement executor. Handlers and CLI commands never reach into the
//! store directly.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use paper_intake_core::models::{DocumentRecord, NewDocument, SimilarityVerdict, UploadStatus};
use paper_intake_core::replace::{ReplaceOutcome, ReplacementExecutor};
use paper_intake_core::resolver::{resolve, UploadQuery};
use paper_intake_core::similarity::ScoringPolicy;
use paper_intake_core::store::DocumentStore;

use crate::config::Config;
use crate::db;
use crate::error::IntakeError;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

/// Result of [`IntakeService::commit`].
#[derive(Debug)]
pub enum CommitOutcome {
    /// The upload was stored as `completed`.
    Stored {
        document: DocumentRecord,
        verdict: SimilarityVerdict,
    },
    /// The verdict was not `allow` and the caller did not force the upload.
    Held { verdict: SimilarityVerdict },
}

#[derive(Clone)]
pub struct IntakeService {
    store: Arc<dyn DocumentStore>,
    policy: ScoringPolicy,
    executor: ReplacementExecutor,
}

impl IntakeService {
    pub fn new(store: Arc<dyn DocumentStore>, config: &Config) -> Self {
        Self {
            store,
            policy: config.detection.clone(),
            executor: ReplacementExecutor::new(config.replace.strategy),
        }
    }

    /// Opens the SQLite store named in `config`, applying migrations first.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(Arc::new(SqliteStore::new(pool)), config))
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    /// Scores an upload against the project without storing anything.
    pub async fn check(&self, upload: &NewDocument) -> Result<SimilarityVerdict, IntakeError> {
        let query = UploadQuery {
            project_id: &upload.project_id,
            file_name: &upload.file_name,
            content: &upload.content,
        };
        Ok(resolve(self.store.as_ref(), query, &self.policy).await?)
    }

    /// Checks, then stores the upload if it is allowed or `force` is set.
    ///
    /// A forced upload that reuses the exact file name of a completed
    /// document still fails with [`IntakeError::Conflict`]: the store keeps
    /// one completed row per name.
    pub async fn commit(
        &self,
        upload: NewDocument,
        force: bool,
    ) -> Result<CommitOutcome, IntakeError> {
        let verdict = self.check(&upload).await?;
        if !(force || verdict.recommendation.is_allow()) {
            return Ok(CommitOutcome::Held { verdict });
        }

        let record = upload.into_record(UploadStatus::Completed);
        let document = self.store.insert(&record).await?;
        info!(
            project_id = %document.project_id,
            document_id = %document.id,
            file_name = %document.file_name,
            forced = force && !verdict.recommendation.is_allow(),
            "document stored"
        );
        Ok(CommitOutcome::Stored { document, verdict })
    }

    pub async fn replace(
        &self,
        existing_document_id: &str,
        upload: NewDocument,
    ) -> Result<ReplaceOutcome, IntakeError> {
        Ok(self
            .executor
            .execute(self.store.as_ref(), existing_document_id, upload)
            .await?)
    }

    pub async fn get(&self, id: &str) -> Result<DocumentRecord, IntakeError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| IntakeError::NotFound(id.to_string()))
    }

    /// All documents in a project, any status, newest first.
    pub async fn list(&self, project_id: &str) -> Result<Vec<DocumentRecord>, IntakeError> {
        if project_id.trim().is_empty() {
            return Err(IntakeError::invalid("projectId must not be empty"));
        }
        Ok(self.store.list_project(project_id).await?)
    }
}
