//! Duplicate document resolution.
//!
//! Given an upload and the project it targets, [`resolve`] fetches the
//! project's completed documents and produces a [`SimilarityVerdict`].
//! [`evaluate`] is the pure half: it scores a candidate snapshot and never
//! touches a store, so it is what tests exercise most.
//!
//! A failed store read is returned as [`ResolveError::Store`]. It is never
//! turned into an "allow" verdict.

use std::cmp::Ordering;

use tracing::debug;

use crate::models::{Classification, DocumentRecord, Match, SimilarityVerdict, UploadStatus};
use crate::similarity::{Fingerprint, ScoringPolicy};
use crate::store::{DocumentStore, StoreError};

/// What the resolver needs to know about an upload.
#[derive(Debug, Clone, Copy)]
pub struct UploadQuery<'a> {
    pub project_id: &'a str,
    pub file_name: &'a str,
    /// Extracted text, empty when none could be obtained.
    pub content: &'a str,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("invalid upload: {0}")]
    Invalid(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Checks an upload against every completed document in its project.
pub async fn resolve(
    store: &dyn DocumentStore,
    query: UploadQuery<'_>,
    policy: &ScoringPolicy,
) -> Result<SimilarityVerdict, ResolveError> {
    if query.project_id.trim().is_empty() {
        return Err(ResolveError::Invalid("projectId must not be empty".into()));
    }
    if query.file_name.trim().is_empty() {
        return Err(ResolveError::Invalid("file name must not be empty".into()));
    }

    let candidates = store.list_completed(query.project_id).await?;
    let verdict = evaluate(query, &candidates, policy);

    debug!(
        project_id = query.project_id,
        file_name = query.file_name,
        candidates = candidates.len(),
        confidence = verdict.confidence,
        recommendation = %verdict.recommendation,
        "duplicate check"
    );

    Ok(verdict)
}

/// Scores `query` against a candidate snapshot.
///
/// Rows that are not `completed`, or that belong to another project, are
/// ignored even if the caller passes them in.
pub fn evaluate(
    query: UploadQuery<'_>,
    candidates: &[DocumentRecord],
    policy: &ScoringPolicy,
) -> SimilarityVerdict {
    let mut candidates = candidates
        .iter()
        .filter(|d| d.status == UploadStatus::Completed && d.project_id == query.project_id)
        .peekable();
    if candidates.peek().is_none() {
        return SimilarityVerdict::unique();
    }

    let upload = Fingerprint::new(query.file_name, query.content);
    let mut best = 0.0_f64;
    let mut matches: Vec<Match> = Vec::new();

    for doc in candidates {
        let score = policy.score(&upload, &Fingerprint::new(&doc.file_name, &doc.content));
        best = best.max(score.confidence);
        if score.confidence >= policy.low_threshold {
            matches.push(Match {
                document_id: doc.id.clone(),
                file_name: doc.file_name.clone(),
                created_at: doc.created_at,
                confidence: score.confidence,
                filename_score: score.filename,
                content_score: score.content,
            });
        }
    }

    // Confidence desc, then most recent first, then id for a stable order.
    matches.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.document_id.cmp(&b.document_id))
    });

    let (classification, recommendation) = policy.classify(best);
    SimilarityVerdict {
        is_duplicate: classification == Classification::Duplicate,
        confidence: best,
        classification,
        matches,
        recommendation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentPatch, NewDocument, Recommendation};
    use crate::store::memory::InMemoryStore;
    use crate::store::StoreResult;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};

    fn record(name: &str, text: &str, status: UploadStatus) -> DocumentRecord {
        NewDocument {
            project_id: "P".to_string(),
            user_id: "u1".to_string(),
            file_name: name.to_string(),
            file_size: text.len() as i64,
            mime_type: "application/pdf".to_string(),
            content: text.to_string(),
        }
        .into_record(status)
    }

    fn query<'a>(name: &'a str, text: &'a str) -> UploadQuery<'a> {
        UploadQuery {
            project_id: "P",
            file_name: name,
            content: text,
        }
    }

    #[test]
    fn test_empty_candidates_allow() {
        let v = evaluate(query("paper.pdf", "ABC"), &[], &ScoringPolicy::default());
        assert!(!v.is_duplicate);
        assert!(v.matches.is_empty());
        assert_eq!(v.confidence, 0.0);
        assert_eq!(v.recommendation, Recommendation::Allow);
        assert_eq!(v, SimilarityVerdict::unique());
    }

    #[test]
    fn test_only_completed_rows_match() {
        let candidates = vec![
            record("paper.pdf", "ABC", UploadStatus::Pending),
            record("paper.pdf", "ABC", UploadStatus::Failed),
            record("paper.pdf", "ABC", UploadStatus::Superseded),
        ];
        let v = evaluate(query("paper.pdf", "ABC"), &candidates, &ScoringPolicy::default());
        assert!(v.matches.is_empty());
        assert_eq!(v.recommendation, Recommendation::Allow);

        let mut with_completed = candidates.clone();
        let done = record("paper.pdf", "ABC", UploadStatus::Completed);
        with_completed.push(done.clone());
        let v = evaluate(query("paper.pdf", "ABC"), &with_completed, &ScoringPolicy::default());
        assert_eq!(v.matches.len(), 1);
        assert_eq!(v.matches[0].document_id, done.id);
    }

    #[test]
    fn test_other_project_rows_ignored() {
        let mut foreign = record("paper.pdf", "ABC", UploadStatus::Completed);
        foreign.project_id = "Q".to_string();
        let v = evaluate(query("paper.pdf", "ABC"), &[foreign], &ScoringPolicy::default());
        assert_eq!(v, SimilarityVerdict::unique());
    }

    #[test]
    fn test_exact_duplicate_blocks() {
        let candidates = vec![record("paper.pdf", "ABC", UploadStatus::Completed)];
        let v = evaluate(query("paper.pdf", "ABC"), &candidates, &ScoringPolicy::default());
        assert!(v.is_duplicate);
        assert!(v.confidence >= 90.0);
        assert_eq!(v.classification, Classification::Duplicate);
        assert_ne!(v.recommendation, Recommendation::Allow);
    }

    #[test]
    fn test_dissimilar_upload_allowed() {
        let candidates = vec![record("paper.pdf", "ABC", UploadStatus::Completed)];
        let v = evaluate(query("other.pdf", "XYZ"), &candidates, &ScoringPolicy::default());
        assert!(!v.is_duplicate);
        assert!(v.confidence < ScoringPolicy::default().low_threshold);
        assert!(v.matches.is_empty());
        assert_eq!(v.recommendation, Recommendation::Allow);
    }

    #[test]
    fn test_missing_upload_text_does_not_block() {
        let candidates = vec![record("paper.pdf", "ABC", UploadStatus::Completed)];
        let v = evaluate(query("paper.pdf", ""), &candidates, &ScoringPolicy::default());
        assert!(!v.is_duplicate);
        assert_eq!(v.recommendation, Recommendation::OfferReplace);
        assert_eq!(v.matches[0].content_score, None);
    }

    #[test]
    fn test_matches_sorted_by_confidence_then_recency() {
        let now = Utc::now();
        let mut older = record("notes.txt", "shared body text", UploadStatus::Completed);
        older.created_at = now - Duration::days(2);
        let mut newer = record("summary.txt", "shared body text", UploadStatus::Completed);
        newer.created_at = now - Duration::days(1);
        let exact = record("report.txt", "shared body text", UploadStatus::Completed);

        let candidates = vec![older.clone(), exact.clone(), newer.clone()];
        let v = evaluate(
            query("report.txt", "shared body text"),
            &candidates,
            &ScoringPolicy::default(),
        );

        let ids: Vec<&str> = v.matches.iter().map(|m| m.document_id.as_str()).collect();
        assert_eq!(ids, vec![exact.id.as_str(), newer.id.as_str(), older.id.as_str()]);
        assert_eq!(v.matches[1].confidence, v.matches[2].confidence);
        for pair in v.matches.windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
        }
    }

    #[tokio::test]
    async fn test_resolve_end_to_end() {
        let store = InMemoryStore::new();
        store
            .insert(&record("paper.pdf", "ABC", UploadStatus::Completed))
            .await
            .unwrap();
        let policy = ScoringPolicy::default();

        let dup = resolve(&store, query("paper.pdf", "ABC"), &policy).await.unwrap();
        assert!(dup.confidence >= 90.0);
        assert_eq!(dup.matches.len(), 1);

        let fresh = resolve(&store, query("other.pdf", "XYZ"), &policy).await.unwrap();
        assert!(fresh.confidence < 10.0);
        assert!(fresh.matches.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_rejects_blank_project_without_store_access() {
        let err = resolve(
            &UnreachableStore,
            UploadQuery {
                project_id: " ",
                file_name: "paper.pdf",
                content: "",
            },
            &ScoringPolicy::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ResolveError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_store_failure_is_not_a_verdict() {
        let err = resolve(&UnreachableStore, query("paper.pdf", "ABC"), &ScoringPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Store(StoreError::Backend(_))));
    }

    /// Store whose every call fails as if the backend were down.
    struct UnreachableStore;

    #[async_trait]
    impl DocumentStore for UnreachableStore {
        async fn list_completed(&self, _: &str) -> StoreResult<Vec<DocumentRecord>> {
            Err(StoreError::backend(anyhow::anyhow!("connection refused")))
        }
        async fn list_project(&self, _: &str) -> StoreResult<Vec<DocumentRecord>> {
            Err(StoreError::backend(anyhow::anyhow!("connection refused")))
        }
        async fn get(&self, _: &str) -> StoreResult<Option<DocumentRecord>> {
            Err(StoreError::backend(anyhow::anyhow!("connection refused")))
        }
        async fn insert(&self, _: &DocumentRecord) -> StoreResult<DocumentRecord> {
            Err(StoreError::backend(anyhow::anyhow!("connection refused")))
        }
        async fn delete(&self, _: &str) -> StoreResult<()> {
            Err(StoreError::backend(anyhow::anyhow!("connection refused")))
        }
        async fn update(
            &self,
            _: &str,
            _: &DocumentPatch,
        ) -> StoreResult<DocumentRecord> {
            Err(StoreError::backend(anyhow::anyhow!("connection refused")))
        }
    }
}
