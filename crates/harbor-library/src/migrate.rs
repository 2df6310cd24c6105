//! One-shot import from the legacy profile database
//!
//! The legacy format kept one history row per url with rfc3339 text
//! timestamps, and bookmarks as a JSON blob in its settings table with
//! slash-separated folder paths. Import runs only when the legacy file
//! exists and the library file does not, so it happens at most once
//! per profile.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::Deserialize;
use url::Url;

use harbor_storage::Severity;

use crate::bookmarks::{insert_node, BookmarkKind, UNFILED_ROOT_GUID};
use crate::history::{frecency_score, VisitType};
use crate::schema;
use crate::{LibraryManager, Result};

pub(crate) const META_LEGACY_BOOKMARKS: &str = "legacy_bookmarks_imported";
pub(crate) const META_LEGACY_HISTORY: &str = "legacy_history_imported";

const DAY_MS: i64 = 86_400_000;

#[derive(Debug, Deserialize)]
struct LegacyBookmark {
    title: String,
    url: String,
    #[serde(default)]
    folder: Option<String>,
}

impl LibraryManager {
    /// True when the legacy file is present and this library has never
    /// been created.
    pub fn needs_legacy_migration(&self, legacy_db_path: &Path) -> bool {
        legacy_db_path.exists() && !self.path.exists()
    }

    /// Import bookmarks and history from the legacy database, once.
    ///
    /// Import failures are reported rather than returned: the library
    /// file exists afterwards either way, which keeps the import from
    /// running again.
    pub async fn migrate_from_legacy(&self, legacy_db_path: &Path) -> Result<()> {
        if !self.needs_legacy_migration(legacy_db_path) {
            tracing::debug!("Legacy migration not needed");
            return Ok(());
        }
        debug_assert!(
            !self.is_open(),
            "legacy migration must run before the engine opens"
        );

        self.reopen_if_closed().await?;

        let legacy = legacy_db_path.to_path_buf();
        let outcome = self
            .with_writer(move |conn| import_legacy(conn, &legacy))
            .await;

        match outcome {
            Ok((bookmarks, history)) => {
                tracing::info!(bookmarks, history, "Imported legacy library data");
            }
            Err(e) => {
                self.reporter.report(
                    "Legacy library migration failed",
                    "legacy-migration",
                    Severity::Error,
                    &e.to_string(),
                );
            }
        }
        Ok(())
    }
}

fn import_legacy(conn: &mut Connection, legacy: &Path) -> Result<(usize, usize)> {
    conn.execute(
        "ATTACH DATABASE ?1 AS legacy",
        [legacy.to_string_lossy().into_owned()],
    )?;
    let imported = copy_legacy_rows(conn);
    let _ = conn.execute("DETACH DATABASE legacy", ());
    imported
}

fn copy_legacy_rows(conn: &mut Connection) -> Result<(usize, usize)> {
    let tx = conn.transaction()?;

    let history = if legacy_table_exists(&tx, "history")? {
        import_history(&tx)?
    } else {
        0
    };
    let bookmarks = if legacy_table_exists(&tx, "settings")? {
        import_bookmarks(&tx)?
    } else {
        0
    };

    schema::put_meta(&tx, META_LEGACY_BOOKMARKS, &bookmarks.to_string())?;
    schema::put_meta(&tx, META_LEGACY_HISTORY, &history.to_string())?;
    tx.commit()?;
    Ok((bookmarks, history))
}

fn legacy_table_exists(tx: &Transaction<'_>, name: &str) -> Result<bool> {
    let found: Option<String> = tx
        .query_row(
            "SELECT name FROM legacy.sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Each legacy row becomes one page carrying its visit count plus a
/// single synthetic link visit at the recorded time.
fn import_history(tx: &Transaction<'_>) -> Result<usize> {
    let rows: Vec<(String, String, String, i64)> = {
        let mut stmt =
            tx.prepare("SELECT url, title, visited_at, visit_count FROM legacy.history")?;
        let rows = stmt
            .query_map((), |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows
    };

    let now = Utc::now();
    let mut imported = 0usize;
    for (url, title, visited_at, visit_count) in rows {
        let Ok(url) = Url::parse(&url) else {
            tracing::warn!(url = %url, "Skipping legacy history row with unparseable url");
            continue;
        };
        let at = DateTime::parse_from_rfc3339(&visited_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(now)
            .timestamp_millis();
        let count = visit_count.max(1);
        let days = (now.timestamp_millis() - at).max(0) / DAY_MS;
        let frecency = frecency_score(count, days, VisitType::Link);
        let title = if title.is_empty() { None } else { Some(title) };

        tx.execute(
            "INSERT OR IGNORE INTO pages (url, title, visit_count, frecency, hidden, last_visit_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            params![url.to_string(), title, count, frecency, at],
        )?;
        let page_id: i64 = tx.query_row(
            "SELECT id FROM pages WHERE url = ?1",
            [url.to_string()],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO visits (page_id, visit_type, visited_at) VALUES (?1, ?2, ?3)",
            params![page_id, VisitType::Link.code(), at],
        )?;
        imported += 1;
    }
    Ok(imported)
}

fn import_bookmarks(tx: &Transaction<'_>) -> Result<usize> {
    let raw: Option<String> = tx
        .query_row(
            "SELECT value FROM legacy.settings WHERE key = 'bookmarks'",
            (),
            |row| row.get(0),
        )
        .optional()?;
    let Some(raw) = raw else {
        return Ok(0);
    };
    let entries: Vec<LegacyBookmark> = match serde_json::from_str(&raw) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(error = %e, "Legacy bookmarks blob is unreadable, skipping");
            Vec::new()
        }
    };

    let mut imported = 0usize;
    for entry in entries {
        let Ok(url) = Url::parse(&entry.url) else {
            tracing::warn!(url = %entry.url, "Skipping legacy bookmark with unparseable url");
            continue;
        };
        let parent = match entry.folder.as_deref() {
            Some(path) => ensure_folder_path(tx, path)?,
            None => UNFILED_ROOT_GUID.to_string(),
        };
        insert_node(
            tx,
            &parent,
            BookmarkKind::Bookmark,
            &entry.title,
            Some(&url),
            None,
        )?;
        imported += 1;
    }
    Ok(imported)
}

/// Find or create the folder chain for a legacy "a/b/c" path under the
/// unfiled root, returning the innermost folder's guid.
fn ensure_folder_path(tx: &Transaction<'_>, path: &str) -> Result<String> {
    let mut parent = UNFILED_ROOT_GUID.to_string();
    for part in path.split('/').map(str::trim).filter(|s| !s.is_empty()) {
        let existing: Option<String> = tx
            .query_row(
                "SELECT guid FROM bookmarks WHERE parent_guid = ?1 AND title = ?2 AND kind = ?3",
                params![parent, part, BookmarkKind::Folder.code()],
                |row| row.get(0),
            )
            .optional()?;
        parent = match existing {
            Some(guid) => guid,
            None => insert_node(tx, &parent, BookmarkKind::Folder, part, None, None)?.guid,
        };
    }
    Ok(parent)
}
