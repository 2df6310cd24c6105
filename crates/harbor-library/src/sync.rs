//! Sync entry points for the library engines
//!
//! The manager owns scheduling and error policy; the actual transport
//! hides behind [`SyncBridge`] so the engine can be exercised without
//! a server. Transport failures surface as a [`SyncOutcome::Failed`]
//! and an error report, never as an `Err`; only a closed engine fails
//! the call itself.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::Connection;

use harbor_storage::Severity;
use harbor_sync::{SyncAuthInfo, SyncOutcome};

use crate::schema;
use crate::{LibraryError, LibraryManager, Result};

pub(crate) const META_BOOKMARKS_LAST_SYNC: &str = "bookmarks_last_sync_at";
pub(crate) const META_HISTORY_LAST_SYNC: &str = "history_last_sync_at";

pub trait SyncBridge: Send + Sync {
    fn sync_bookmarks(&self, conn: &mut Connection, auth: &SyncAuthInfo) -> Result<SyncOutcome>;
    fn sync_history(&self, conn: &mut Connection, auth: &SyncAuthInfo) -> Result<SyncOutcome>;
}

/// Default bridge: no transport, just a local checkpoint so callers
/// and tests see the full sync path.
pub struct LocalSyncBridge;

impl SyncBridge for LocalSyncBridge {
    fn sync_bookmarks(&self, conn: &mut Connection, _auth: &SyncAuthInfo) -> Result<SyncOutcome> {
        schema::put_meta(
            conn,
            META_BOOKMARKS_LAST_SYNC,
            &Utc::now().timestamp_millis().to_string(),
        )?;
        Ok(SyncOutcome::Success)
    }

    fn sync_history(&self, conn: &mut Connection, _auth: &SyncAuthInfo) -> Result<SyncOutcome> {
        schema::put_meta(
            conn,
            META_HISTORY_LAST_SYNC,
            &Utc::now().timestamp_millis().to_string(),
        )?;
        Ok(SyncOutcome::Success)
    }
}

impl LibraryManager {
    pub async fn sync_bookmarks(&self, auth: &SyncAuthInfo) -> Result<SyncOutcome> {
        let bridge = Arc::clone(&self.bridge);
        let auth = auth.clone();
        let result = self
            .with_writer(move |conn| bridge.sync_bookmarks(conn, &auth))
            .await;
        self.finish_sync("bookmarks", result)
    }

    pub async fn sync_history(&self, auth: &SyncAuthInfo) -> Result<SyncOutcome> {
        let bridge = Arc::clone(&self.bridge);
        let auth = auth.clone();
        let result = self
            .with_writer(move |conn| bridge.sync_history(conn, &auth))
            .await;
        self.finish_sync("history", result)
    }

    fn finish_sync(&self, engine: &str, result: Result<SyncOutcome>) -> Result<SyncOutcome> {
        match result {
            Ok(outcome) => {
                if !outcome.is_success() {
                    tracing::warn!(engine, ?outcome, "Sync finished unsuccessfully");
                }
                Ok(outcome)
            }
            Err(LibraryError::Closed) => Err(LibraryError::Closed),
            Err(e) => {
                self.reporter.report(
                    "Library sync failed",
                    "sync",
                    Severity::Error,
                    &e.to_string(),
                );
                Ok(SyncOutcome::Failed(e.to_string()))
            }
        }
    }

    /// Forget the bookmarks sync checkpoint and mark every node as
    /// needing upload, for account sign-out.
    pub async fn reset_bookmarks_metadata(&self) -> Result<()> {
        self.with_writer(|conn| {
            let tx = conn.transaction()?;
            schema::delete_meta(&tx, META_BOOKMARKS_LAST_SYNC)?;
            tx.execute("UPDATE bookmarks SET sync_change_counter = 1", ())?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    pub async fn reset_history_metadata(&self) -> Result<()> {
        self.with_writer(|conn| schema::delete_meta(conn, META_HISTORY_LAST_SYNC))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harbor_storage::{ErrorReporter, EventBus, LogReporter};
    use parking_lot::Mutex;
    use tempfile::TempDir;
    use url::Url;

    struct RecordingReporter {
        tags: Mutex<Vec<String>>,
    }

    impl RecordingReporter {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                tags: Mutex::new(Vec::new()),
            })
        }
    }

    impl ErrorReporter for RecordingReporter {
        fn report(&self, _message: &str, tag: &str, _severity: Severity, _description: &str) {
            self.tags.lock().push(tag.to_string());
        }
    }

    struct BrokenBridge;

    impl SyncBridge for BrokenBridge {
        fn sync_bookmarks(&self, conn: &mut Connection, _auth: &SyncAuthInfo) -> Result<SyncOutcome> {
            conn.execute("SELECT * FROM definitely_missing", ())?;
            Ok(SyncOutcome::Success)
        }

        fn sync_history(&self, _conn: &mut Connection, _auth: &SyncAuthInfo) -> Result<SyncOutcome> {
            Ok(SyncOutcome::AuthInvalid)
        }
    }

    fn auth() -> SyncAuthInfo {
        SyncAuthInfo {
            kid: "kid".to_string(),
            fxa_access_token: "token".to_string(),
            sync_key: "key".to_string(),
            tokenserver_url: Url::parse("https://token.example/1.0/sync").unwrap(),
        }
    }

    async fn open_manager(dir: &TempDir) -> LibraryManager {
        let manager = LibraryManager::new(
            dir.path().join("library.db"),
            EventBus::new(),
            Arc::new(LogReporter),
        );
        manager.open().await.unwrap();
        manager
    }

    #[tokio::test]
    async fn test_local_bridge_records_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let manager = open_manager(&dir).await;

        assert_eq!(manager.sync_bookmarks(&auth()).await.unwrap(), SyncOutcome::Success);
        assert_eq!(manager.sync_history(&auth()).await.unwrap(), SyncOutcome::Success);

        let (bookmarks, history) = manager
            .with_reader(|conn| {
                Ok((
                    schema::get_meta(conn, META_BOOKMARKS_LAST_SYNC)?,
                    schema::get_meta(conn, META_HISTORY_LAST_SYNC)?,
                ))
            })
            .await
            .unwrap();
        assert!(bookmarks.is_some());
        assert!(history.is_some());
    }

    #[tokio::test]
    async fn test_bridge_error_becomes_failed_outcome_and_report() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = RecordingReporter::new();
        let manager = LibraryManager::new(
            dir.path().join("library.db"),
            EventBus::new(),
            Arc::clone(&reporter) as Arc<dyn ErrorReporter>,
        )
        .with_sync_bridge(Arc::new(BrokenBridge));
        manager.open().await.unwrap();

        let outcome = manager.sync_bookmarks(&auth()).await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Failed(_)));
        assert_eq!(reporter.tags.lock().as_slice(), ["sync"]);
    }

    #[tokio::test]
    async fn test_unsuccessful_outcome_passes_through_without_report() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = RecordingReporter::new();
        let manager = LibraryManager::new(
            dir.path().join("library.db"),
            EventBus::new(),
            Arc::clone(&reporter) as Arc<dyn ErrorReporter>,
        )
        .with_sync_bridge(Arc::new(BrokenBridge));
        manager.open().await.unwrap();

        let outcome = manager.sync_history(&auth()).await.unwrap();
        assert_eq!(outcome, SyncOutcome::AuthInvalid);
        assert!(reporter.tags.lock().is_empty());
    }

    #[tokio::test]
    async fn test_sync_on_closed_engine_fails_with_closed() {
        let dir = tempfile::tempdir().unwrap();
        let manager = LibraryManager::new(
            dir.path().join("library.db"),
            EventBus::new(),
            Arc::new(LogReporter),
        );

        let err = manager.sync_bookmarks(&auth()).await.unwrap_err();
        assert!(matches!(err, LibraryError::Closed));
    }

    #[tokio::test]
    async fn test_reset_clears_checkpoint_and_marks_all_changed() {
        let dir = tempfile::tempdir().unwrap();
        let manager = open_manager(&dir).await;

        let node = manager
            .create_bookmark(
                crate::bookmarks::UNFILED_ROOT_GUID,
                "n",
                "https://n.example/",
                None,
            )
            .await
            .unwrap();
        manager.sync_bookmarks(&auth()).await.unwrap();
        // Pretend the node was uploaded.
        let guid = node.guid.clone();
        manager
            .with_writer(move |conn| {
                conn.execute(
                    "UPDATE bookmarks SET sync_change_counter = 0 WHERE guid = ?1",
                    [guid],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        manager.reset_bookmarks_metadata().await.unwrap();

        let (checkpoint, counter) = manager
            .with_reader(move |conn| {
                let checkpoint = schema::get_meta(conn, META_BOOKMARKS_LAST_SYNC)?;
                let counter: i64 = conn.query_row(
                    "SELECT sync_change_counter FROM bookmarks WHERE guid = ?1",
                    [node.guid],
                    |r| r.get(0),
                )?;
                Ok((checkpoint, counter))
            })
            .await
            .unwrap();
        assert_eq!(checkpoint, None);
        assert_eq!(counter, 1);
    }

    #[tokio::test]
    async fn test_reset_history_metadata_drops_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let manager = open_manager(&dir).await;

        manager.sync_history(&auth()).await.unwrap();
        manager.reset_history_metadata().await.unwrap();

        let checkpoint = manager
            .with_reader(|conn| schema::get_meta(conn, META_HISTORY_LAST_SYNC))
            .await
            .unwrap();
        assert_eq!(checkpoint, None);
    }
}
