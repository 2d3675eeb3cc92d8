//! Repair of rows left behind by interrupted replacements.
//!
//! Rows are grouped by [`name_key`]. `intake reconcile --project P` reports:
//!
//! - names with no `completed` row at all, where an insert-then-retire
//!   replacement stopped after retiring the old row. The newest superseded
//!   row is restored, or failing that the newest stale pending row is
//!   promoted;
//! - names with more than one `completed` row (possible in databases
//!   created before the unique index, or written by other tools);
//! - `pending` rows older than the grace period that were not promoted;
//! - `superseded` rows whose cleanup delete never ran.
//!
//! With `--apply`, restorations run first, then the newest completed row of
//! each duplicate group is kept and the rest are marked `superseded`, stale
//! pending rows are marked `failed`, and the superseded rows found by the
//! scan are deleted. A superseded row is only ever scheduled for deletion
//! when its name keeps a completed copy.
//!
//! A name that still has a pending row inside the grace period is left
//! alone: a replacement may be in flight.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::info;

use paper_intake_core::models::{name_key, DocumentPatch, DocumentRecord, UploadStatus};
use paper_intake_core::store::{DocumentStore, StoreResult};

use crate::config::Config;
use crate::service::IntakeService;

/// Completed rows sharing one file name.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub file_name: String,
    pub keep: DocumentRecord,
    pub extra: Vec<DocumentRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Rows to mark `completed` because their name has no completed copy.
    pub restore: Vec<DocumentRecord>,
    pub duplicate_groups: Vec<DuplicateGroup>,
    pub stale_pending: Vec<DocumentRecord>,
    pub superseded: Vec<DocumentRecord>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.restore.is_empty()
            && self.duplicate_groups.is_empty()
            && self.stale_pending.is_empty()
            && self.superseded.is_empty()
    }
}

/// Counts of rows changed by [`apply`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub restored: usize,
    pub retired: usize,
    pub failed: usize,
    pub deleted: usize,
}

/// Rows of one name, bucketed by status, each bucket newest first.
#[derive(Default)]
struct NameRows {
    completed: Vec<DocumentRecord>,
    stale_pending: Vec<DocumentRecord>,
    fresh_pending: usize,
    superseded: Vec<DocumentRecord>,
}

/// Scans one project. Read-only.
pub async fn inspect(
    store: &dyn DocumentStore,
    project_id: &str,
    now: DateTime<Utc>,
    pending_grace: Duration,
) -> StoreResult<ReconcileReport> {
    let mut rows = store.list_project(project_id).await?;
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

    let mut names: BTreeMap<String, NameRows> = BTreeMap::new();
    for row in rows {
        let entry = names.entry(name_key(&row.file_name)).or_default();
        match row.status {
            UploadStatus::Completed => entry.completed.push(row),
            UploadStatus::Pending if now - row.created_at > pending_grace => {
                entry.stale_pending.push(row)
            }
            UploadStatus::Pending => entry.fresh_pending += 1,
            UploadStatus::Superseded => entry.superseded.push(row),
            UploadStatus::Failed => {}
        }
    }

    let mut report = ReconcileReport::default();
    for mut name in names.into_values() {
        if name.completed.is_empty() {
            if name.fresh_pending > 0 {
                continue;
            }
            let restored = if name.superseded.is_empty() {
                if name.stale_pending.is_empty() {
                    continue;
                }
                name.stale_pending.remove(0)
            } else {
                name.superseded.remove(0)
            };
            report.restore.push(restored);
        } else if name.completed.len() > 1 {
            let keep = name.completed.remove(0);
            report.duplicate_groups.push(DuplicateGroup {
                file_name: keep.file_name.clone(),
                keep,
                extra: name.completed,
            });
        }

        report.stale_pending.extend(name.stale_pending);
        report.superseded.extend(name.superseded);
    }

    Ok(report)
}

/// Applies the fixes described in the module docs.
pub async fn apply(store: &dyn DocumentStore, report: &ReconcileReport) -> StoreResult<ReconcileStats> {
    let mut stats = ReconcileStats::default();

    for doc in &report.restore {
        store
            .update(&doc.id, &DocumentPatch::status(UploadStatus::Completed))
            .await?;
        stats.restored += 1;
    }

    for group in &report.duplicate_groups {
        for doc in &group.extra {
            store
                .update(&doc.id, &DocumentPatch::status(UploadStatus::Superseded))
                .await?;
            stats.retired += 1;
        }
    }

    for doc in &report.stale_pending {
        store
            .update(&doc.id, &DocumentPatch::status(UploadStatus::Failed))
            .await?;
        stats.failed += 1;
    }

    for doc in &report.superseded {
        store.delete(&doc.id).await?;
        stats.deleted += 1;
    }

    info!(
        restored = stats.restored,
        retired = stats.retired,
        failed = stats.failed,
        deleted = stats.deleted,
        "reconcile applied"
    );
    Ok(stats)
}

/// CLI entry point for `intake reconcile`.
pub async fn run_reconcile(
    config: &Config,
    project_id: &str,
    grace_minutes: i64,
    do_apply: bool,
) -> Result<()> {
    let service = IntakeService::open(config).await?;
    let report = inspect(
        service.store(),
        project_id,
        Utc::now(),
        Duration::minutes(grace_minutes),
    )
    .await?;

    if report.is_clean() {
        println!("Project {} is consistent.", project_id);
        return Ok(());
    }

    for doc in &report.restore {
        println!(
            "restore    {}  {}  was {}",
            doc.file_name, doc.id, doc.status
        );
    }
    for group in &report.duplicate_groups {
        println!(
            "duplicate  {}  keep {}  retire {}",
            group.file_name,
            group.keep.id,
            group
                .extra
                .iter()
                .map(|d| d.id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    for doc in &report.stale_pending {
        println!(
            "pending    {}  {}  since {}",
            doc.file_name,
            doc.id,
            doc.created_at.to_rfc3339()
        );
    }
    for doc in &report.superseded {
        println!("superseded {}  {}", doc.file_name, doc.id);
    }

    if do_apply {
        let stats = apply(service.store(), &report).await?;
        println!(
            "Applied: {} restored, {} retired, {} marked failed, {} deleted.",
            stats.restored, stats.retired, stats.failed, stats.deleted
        );
    } else {
        println!("Dry run. Re-run with --apply to fix.");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use paper_intake_core::models::NewDocument;
    use paper_intake_core::store::memory::InMemoryStore;

    fn row(id: &str, name: &str, status: UploadStatus, age_minutes: i64) -> DocumentRecord {
        let mut rec = NewDocument {
            project_id: "P".to_string(),
            user_id: "u1".to_string(),
            file_name: name.to_string(),
            file_size: 3,
            mime_type: "text/plain".to_string(),
            content: "ABC".to_string(),
        }
        .into_record(status);
        rec.id = id.to_string();
        rec.created_at = Utc::now() - Duration::minutes(age_minutes);
        rec.updated_at = rec.created_at;
        rec
    }

    #[tokio::test]
    async fn test_clean_project() {
        let store = InMemoryStore::with_records([
            row("a", "a.pdf", UploadStatus::Completed, 10),
            row("b", "b.pdf", UploadStatus::Completed, 5),
            row("c", "c.pdf", UploadStatus::Pending, 1),
        ]);
        let report = inspect(&store, "P", Utc::now(), Duration::minutes(60))
            .await
            .unwrap();
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_detects_and_repairs() {
        let store = InMemoryStore::with_records([
            row("old", "paper.pdf", UploadStatus::Completed, 30),
            row("new", "Paper.PDF", UploadStatus::Completed, 10),
            row("draft", "draft.pdf", UploadStatus::Completed, 200),
            row("stuck", "draft.pdf", UploadStatus::Pending, 120),
            row("gone", "draft.pdf", UploadStatus::Superseded, 120),
        ]);

        let report = inspect(&store, "P", Utc::now(), Duration::minutes(60))
            .await
            .unwrap();
        assert!(report.restore.is_empty());
        assert_eq!(report.duplicate_groups.len(), 1);
        assert_eq!(report.duplicate_groups[0].keep.id, "new");
        assert_eq!(report.duplicate_groups[0].extra[0].id, "old");
        assert_eq!(report.stale_pending[0].id, "stuck");
        assert_eq!(report.superseded[0].id, "gone");

        let stats = apply(&store, &report).await.unwrap();
        assert_eq!(
            stats,
            ReconcileStats {
                restored: 0,
                retired: 1,
                failed: 1,
                deleted: 1
            }
        );

        let completed = store.list_completed("P").await.unwrap();
        let ids: Vec<&str> = completed.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["new", "draft"]);
        assert_eq!(
            store.get("old").await.unwrap().unwrap().status,
            UploadStatus::Superseded
        );
        assert_eq!(
            store.get("stuck").await.unwrap().unwrap().status,
            UploadStatus::Failed
        );
        assert!(store.get("gone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_interrupted_replacement_restores_superseded_copy() {
        // Old row retired, new row never promoted, rollback lost.
        let store = InMemoryStore::with_records([
            row("old", "paper.pdf", UploadStatus::Superseded, 120),
            row("new", "paper.pdf", UploadStatus::Pending, 90),
        ]);

        let report = inspect(&store, "P", Utc::now(), Duration::minutes(60))
            .await
            .unwrap();
        assert_eq!(report.restore.len(), 1);
        assert_eq!(report.restore[0].id, "old");
        assert!(report.superseded.is_empty());

        let stats = apply(&store, &report).await.unwrap();
        assert_eq!(stats.restored, 1);
        assert_eq!(stats.deleted, 0);

        let completed = store.list_completed("P").await.unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, "old");
        assert_eq!(
            store.get("new").await.unwrap().unwrap().status,
            UploadStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_orphaned_pending_row_is_promoted() {
        let store = InMemoryStore::with_records([
            row("lost", "notes.pdf", UploadStatus::Pending, 300),
            row("newer", "notes.pdf", UploadStatus::Pending, 120),
        ]);

        let report = inspect(&store, "P", Utc::now(), Duration::minutes(60))
            .await
            .unwrap();
        assert_eq!(report.restore[0].id, "newer");
        assert_eq!(report.stale_pending.len(), 1);

        apply(&store, &report).await.unwrap();
        let completed = store.list_completed("P").await.unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, "newer");
    }

    #[tokio::test]
    async fn test_in_flight_replacement_left_alone() {
        let store = InMemoryStore::with_records([
            row("old", "paper.pdf", UploadStatus::Superseded, 2),
            row("new", "paper.pdf", UploadStatus::Pending, 1),
        ]);

        let report = inspect(&store, "P", Utc::now(), Duration::minutes(60))
            .await
            .unwrap();
        assert!(report.is_clean(), "report={:?}", report);
    }
}
