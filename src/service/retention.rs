//! Retention sweep for auth-data snapshots.
//!
//! Auth snapshots accumulate quickly and are only needed for a bounded
//! trailing window. The sweep exports every expiring record to a
//! line-delimited backup file first and prunes the same records second;
//! both steps query the same cutoff predicate, so the exported set is
//! exactly the pruned set absent concurrent writes in between.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::AsyncWrite;

use crate::domain::SnapshotCategory;
use crate::error::ReserveError;
use crate::storage::SnapshotStore;

/// Export-then-prune job for retention-managed snapshot categories.
#[derive(Clone)]
pub struct RetentionJob {
    store: Arc<dyn SnapshotStore>,
    retention_ms: u64,
    export_dir: PathBuf,
}

impl fmt::Debug for RetentionJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetentionJob")
            .field("retention_ms", &self.retention_ms)
            .field("export_dir", &self.export_dir)
            .finish_non_exhaustive()
    }
}

impl RetentionJob {
    /// Creates a retention job with the given retention window and
    /// export directory.
    #[must_use]
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        retention_ms: u64,
        export_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            retention_ms,
            export_dir: export_dir.into(),
        }
    }

    /// Exports expiring auth-data records to `sink`, then prunes them.
    /// Returns `(exported, pruned)` counts.
    ///
    /// # Errors
    ///
    /// Returns a [`ReserveError`] from either step. If the export fails,
    /// pruning is not attempted, so no record is lost unbacked-up.
    pub async fn sweep(
        &self,
        now_ms: u64,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<(u64, u64), ReserveError> {
        let exported = self
            .store
            .export_expired(SnapshotCategory::AuthData, now_ms, self.retention_ms, sink)
            .await?;
        let pruned = self
            .store
            .prune_expired(SnapshotCategory::AuthData, now_ms, self.retention_ms)
            .await?;
        Ok((exported, pruned))
    }

    /// Runs one sweep, writing the backup to
    /// `<export_dir>/auth_data_<now_ms>.jsonl`.
    ///
    /// # Errors
    ///
    /// Returns [`ReserveError::Storage`] if the export file cannot be
    /// created, or any error from [`RetentionJob::sweep`].
    pub async fn run_once(&self, now_ms: u64) -> Result<(u64, u64), ReserveError> {
        tokio::fs::create_dir_all(&self.export_dir)
            .await
            .map_err(|e| ReserveError::storage("create export dir", e))?;
        let path = self.export_dir.join(format!("auth_data_{now_ms}.jsonl"));
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| ReserveError::storage("create export file", e))?;

        let (exported, pruned) = self.sweep(now_ms, &mut file).await?;
        tracing::info!(
            exported,
            pruned,
            path = %path.display(),
            "auth data retention sweep finished"
        );
        Ok((exported, pruned))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::io::Cursor;

    use serde_json::json;

    use super::*;
    use crate::storage::MemoryStorage;

    #[tokio::test]
    async fn sweep_exports_then_prunes_the_same_records() {
        let store = Arc::new(MemoryStorage::default());
        for t in [1_000u64, 2_000, 9_500] {
            let stored = store
                .store(SnapshotCategory::AuthData, json!({ "t": t }), t)
                .await;
            assert!(stored.is_ok());
        }
        // A fresh record in a different category must never be touched.
        let stored = store.store(SnapshotCategory::Price, json!({"p": 1}), 1_000).await;
        assert!(stored.is_ok());

        let job = RetentionJob::new(
            Arc::clone(&store) as Arc<dyn SnapshotStore>,
            5_000,
            "./unused",
        );
        let mut sink = Cursor::new(Vec::new());
        let result = job.sweep(10_000, &mut sink).await;
        assert_eq!(result.ok(), Some((2, 2)));

        let lines = sink.into_inner();
        let text = String::from_utf8(lines).ok();
        let Some(text) = text else {
            panic!("export is not utf-8");
        };
        assert_eq!(text.lines().count(), 2);

        // Recent auth data and other categories survive.
        assert!(store.current_version(SnapshotCategory::AuthData, 10_000).await.is_ok());
        assert!(store.current_version(SnapshotCategory::Price, 10_000).await.is_ok());
    }

    #[tokio::test]
    async fn sweep_with_nothing_expired_is_a_noop() {
        let store = Arc::new(MemoryStorage::default());
        let stored = store
            .store(SnapshotCategory::AuthData, json!({"fresh": true}), 9_999)
            .await;
        assert!(stored.is_ok());

        let job = RetentionJob::new(
            Arc::clone(&store) as Arc<dyn SnapshotStore>,
            5_000,
            "./unused",
        );
        let mut sink = Cursor::new(Vec::new());
        let result = job.sweep(10_000, &mut sink).await;
        assert_eq!(result.ok(), Some((0, 0)));
        assert!(sink.into_inner().is_empty());
    }
}
