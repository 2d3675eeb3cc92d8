//! Core data models for uploaded documents and duplicate verdicts.
//!
//! [`DocumentRecord`] is the row shape every [`DocumentStore`](crate::store::DocumentStore)
//! speaks. [`SimilarityVerdict`] is produced per upload attempt by the
//! resolver and never persisted.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Processing state of a stored upload.
///
/// Only [`UploadStatus::Completed`] rows take part in duplicate detection.
/// `Superseded` marks a row that is being retired by a replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Completed,
    Failed,
    Superseded,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Completed => "completed",
            UploadStatus::Failed => "failed",
            UploadStatus::Superseded => "superseded",
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored status string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown upload status: '{0}'")]
pub struct ParseStatusError(pub String);

impl FromStr for UploadStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(UploadStatus::Pending),
            "completed" => Ok(UploadStatus::Completed),
            "failed" => Ok(UploadStatus::Failed),
            "superseded" => Ok(UploadStatus::Superseded),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// Identity of a file name within a project.
///
/// Drops any client-side directory, trims and lowercases, so `Paper.PDF`
/// and `C:\\thesis\\paper.pdf` name the same document. Uniqueness of
/// completed rows and duplicate scoring both compare this key.
pub fn name_key(file_name: &str) -> String {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    base.trim().to_lowercase()
}

/// A stored upload, owned by the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: String,
    pub project_id: String,
    pub user_id: String,
    /// Original filename as uploaded.
    pub file_name: String,
    /// Size of the original file in bytes.
    pub file_size: i64,
    pub mime_type: String,
    /// Extracted text. May be empty when extraction was not possible.
    pub content: String,
    pub status: UploadStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An upload that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    pub project_id: String,
    pub user_id: String,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub content: String,
}

impl NewDocument {
    /// Builds a storable record with a fresh UUID and current timestamps.
    pub fn into_record(self, status: UploadStatus) -> DocumentRecord {
        let now = Utc::now();
        DocumentRecord {
            id: Uuid::new_v4().to_string(),
            project_id: self.project_id,
            user_id: self.user_id,
            file_name: self.file_name,
            file_size: self.file_size,
            mime_type: self.mime_type,
            content: self.content,
            status,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update applied by [`DocumentStore::update`](crate::store::DocumentStore::update).
///
/// `None` fields are left untouched. Stores always bump `updated_at`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentPatch {
    pub status: Option<UploadStatus>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub content: Option<String>,
}

impl DocumentPatch {
    pub fn status(status: UploadStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Applies the patch in place and stamps `updated_at`.
    pub fn apply_to(&self, record: &mut DocumentRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(ref name) = self.file_name {
            record.file_name = name.clone();
        }
        if let Some(size) = self.file_size {
            record.file_size = size;
        }
        if let Some(ref mime) = self.mime_type {
            record.mime_type = mime.clone();
        }
        if let Some(ref content) = self.content {
            record.content = content.clone();
        }
        record.updated_at = Utc::now();
    }
}

/// Coarse outcome of duplicate scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Duplicate,
    PossibleDuplicate,
    Unique,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Duplicate => "duplicate",
            Classification::PossibleDuplicate => "possible_duplicate",
            Classification::Unique => "unique",
        }
    }
}

/// What the caller should do with the upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Recommendation {
    /// Confidence reached the high threshold.
    BlockUpload,
    /// Middle band: warn and let the user pick keep-both or replace.
    OfferReplace,
    Allow,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::BlockUpload => "block-upload",
            Recommendation::OfferReplace => "offer-replace",
            Recommendation::Allow => "allow",
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Recommendation::Allow)
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored document that scored above the low threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub document_id: String,
    pub file_name: String,
    pub created_at: DateTime<Utc>,
    /// Combined score in `[0, 100]`.
    pub confidence: f64,
    pub filename_score: f64,
    /// `None` when either side had no extracted text.
    pub content_score: Option<f64>,
}

/// Result of checking one upload against a project's completed documents.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityVerdict {
    pub is_duplicate: bool,
    /// Best score across all candidates, `0.0` when there were none.
    pub confidence: f64,
    pub classification: Classification,
    /// Sorted by confidence desc, then `created_at` desc.
    pub matches: Vec<Match>,
    pub recommendation: Recommendation,
}

impl SimilarityVerdict {
    /// Verdict for an upload with nothing to compare against.
    pub fn unique() -> Self {
        Self {
            is_duplicate: false,
            confidence: 0.0,
            classification: Classification::Unique,
            matches: Vec::new(),
            recommendation: Recommendation::Allow,
        }
    }
}
