//! Library database schema
//!
//! Versioned through `PRAGMA user_version`. Timestamps are epoch
//! milliseconds throughout.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};

use crate::bookmarks::{
    BookmarkKind, MENU_ROOT_GUID, MOBILE_ROOT_GUID, ROOT_GUID, TOOLBAR_ROOT_GUID,
    UNFILED_ROOT_GUID,
};
use crate::Result;

pub(crate) const SCHEMA_VERSION: i32 = 1;

const SCHEMA_V1: &str = r#"
    CREATE TABLE IF NOT EXISTS bookmarks (
        id INTEGER PRIMARY KEY,
        guid TEXT NOT NULL UNIQUE,
        kind INTEGER NOT NULL,
        parent_guid TEXT,
        position INTEGER NOT NULL DEFAULT 0,
        title TEXT NOT NULL DEFAULT '',
        url TEXT,
        date_added INTEGER NOT NULL,
        last_modified INTEGER NOT NULL,
        sync_change_counter INTEGER NOT NULL DEFAULT 1
    );

    CREATE INDEX IF NOT EXISTS idx_bookmarks_parent ON bookmarks(parent_guid);
    CREATE INDEX IF NOT EXISTS idx_bookmarks_url ON bookmarks(url);

    CREATE TABLE IF NOT EXISTS pages (
        id INTEGER PRIMARY KEY,
        url TEXT NOT NULL UNIQUE,
        title TEXT,
        visit_count INTEGER NOT NULL DEFAULT 0,
        frecency INTEGER NOT NULL DEFAULT 0,
        hidden INTEGER NOT NULL DEFAULT 0,
        last_visit_at INTEGER
    );

    CREATE INDEX IF NOT EXISTS idx_pages_frecency ON pages(frecency);

    CREATE TABLE IF NOT EXISTS visits (
        id INTEGER PRIMARY KEY,
        page_id INTEGER NOT NULL REFERENCES pages(id) ON DELETE CASCADE,
        visit_type INTEGER NOT NULL,
        visited_at INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_visits_page ON visits(page_id);
    CREATE INDEX IF NOT EXISTS idx_visits_date ON visits(visited_at);

    CREATE TABLE IF NOT EXISTS history_metadata (
        id INTEGER PRIMARY KEY,
        url TEXT NOT NULL,
        search_term TEXT,
        referrer_url TEXT,
        title TEXT NOT NULL DEFAULT '',
        document_type INTEGER NOT NULL DEFAULT 0,
        total_view_time INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_metadata_url ON history_metadata(url);
    CREATE INDEX IF NOT EXISTS idx_metadata_updated ON history_metadata(updated_at);

    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
"#;

pub(crate) fn init(conn: &Connection) -> Result<()> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if version < 1 {
        tracing::info!("Initializing library schema v1");
        conn.execute_batch(SCHEMA_V1)?;
        seed_roots(conn)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }

    Ok(())
}

/// The five built-in folders every profile has. Children of the single
/// top root, in fixed positions.
fn seed_roots(conn: &Connection) -> Result<()> {
    let now = Utc::now().timestamp_millis();
    let roots = [
        (ROOT_GUID, None::<&str>, 0u32, ""),
        (MENU_ROOT_GUID, Some(ROOT_GUID), 0, "menu"),
        (TOOLBAR_ROOT_GUID, Some(ROOT_GUID), 1, "toolbar"),
        (UNFILED_ROOT_GUID, Some(ROOT_GUID), 2, "unfiled"),
        (MOBILE_ROOT_GUID, Some(ROOT_GUID), 3, "mobile"),
    ];

    for (guid, parent, position, title) in roots {
        conn.execute(
            "INSERT OR IGNORE INTO bookmarks
                 (guid, kind, parent_guid, position, title, date_added, last_modified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            rusqlite::params![guid, BookmarkKind::Folder.code(), parent, position, title, now],
        )?;
    }

    Ok(())
}

pub(crate) fn put_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
        rusqlite::params![key, value],
    )?;
    Ok(())
}

pub(crate) fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(value)
}

pub(crate) fn delete_meta(conn: &Connection, key: &str) -> Result<()> {
    conn.execute("DELETE FROM meta WHERE key = ?1", [key])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();
        init(&conn).unwrap();

        let roots: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM bookmarks WHERE kind = ?1",
                [BookmarkKind::Folder.code()],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(roots, 5);

        let version: i32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_meta_round_trip() {
        let conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();

        assert_eq!(get_meta(&conn, "k").unwrap(), None);
        put_meta(&conn, "k", "v1").unwrap();
        put_meta(&conn, "k", "v2").unwrap();
        assert_eq!(get_meta(&conn, "k").unwrap(), Some("v2".to_string()));

        delete_meta(&conn, "k").unwrap();
        assert_eq!(get_meta(&conn, "k").unwrap(), None);
    }
}
