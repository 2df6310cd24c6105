//! Bookmark tree storage
//!
//! Bookmarks form a tree rooted at five well-known folders that are
//! seeded with the schema and can never be deleted. Positions are
//! dense per folder; inserting at an occupied position shifts the
//! siblings below it.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row, Transaction};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use harbor_storage::StorageEvent;

use crate::{LibraryError, LibraryManager, Result};

pub const ROOT_GUID: &str = "root________";
pub const MENU_ROOT_GUID: &str = "menu________";
pub const TOOLBAR_ROOT_GUID: &str = "toolbar_____";
pub const UNFILED_ROOT_GUID: &str = "unfiled_____";
pub const MOBILE_ROOT_GUID: &str = "mobile______";

pub fn is_root(guid: &str) -> bool {
    matches!(
        guid,
        ROOT_GUID | MENU_ROOT_GUID | TOOLBAR_ROOT_GUID | UNFILED_ROOT_GUID | MOBILE_ROOT_GUID
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookmarkKind {
    Bookmark,
    Folder,
}

impl BookmarkKind {
    pub(crate) fn code(self) -> i64 {
        match self {
            BookmarkKind::Bookmark => 1,
            BookmarkKind::Folder => 2,
        }
    }

    pub(crate) fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(BookmarkKind::Bookmark),
            2 => Some(BookmarkKind::Folder),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub guid: String,
    pub parent_guid: Option<String>,
    pub position: u32,
    pub kind: BookmarkKind,
    pub title: String,
    pub url: Option<Url>,
    pub date_added: i64,
    pub last_modified: i64,
}

const BOOKMARK_COLUMNS: &str =
    "guid, parent_guid, position, kind, title, url, date_added, last_modified";

impl Bookmark {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let code: i64 = row.get(3)?;
        let kind = BookmarkKind::from_code(code)
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(3, code))?;
        let url = match row.get::<_, Option<String>>(5)? {
            Some(raw) => Some(Url::parse(&raw).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    5,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?),
            None => None,
        };
        Ok(Bookmark {
            guid: row.get(0)?,
            parent_guid: row.get(1)?,
            position: row.get(2)?,
            kind,
            title: row.get(4)?,
            url,
            date_added: row.get(6)?,
            last_modified: row.get(7)?,
        })
    }
}

/// Insert a node under `parent_guid`, appending when `position` is
/// `None` and shifting later siblings down when it is explicit.
pub(crate) fn insert_node(
    tx: &Transaction<'_>,
    parent_guid: &str,
    kind: BookmarkKind,
    title: &str,
    url: Option<&Url>,
    position: Option<u32>,
) -> Result<Bookmark> {
    let parent_kind: Option<i64> = tx
        .query_row(
            "SELECT kind FROM bookmarks WHERE guid = ?1",
            [parent_guid],
            |row| row.get(0),
        )
        .optional()?;
    if parent_kind != Some(BookmarkKind::Folder.code()) {
        return Err(LibraryError::InvalidParent(parent_guid.to_string()));
    }

    let position = match position {
        Some(p) => {
            tx.execute(
                "UPDATE bookmarks SET position = position + 1
                 WHERE parent_guid = ?1 AND position >= ?2",
                params![parent_guid, p],
            )?;
            p
        }
        None => tx.query_row(
            "SELECT COUNT(*) FROM bookmarks WHERE parent_guid = ?1",
            [parent_guid],
            |row| row.get(0),
        )?,
    };

    let guid = Uuid::new_v4().to_string();
    let now = Utc::now().timestamp_millis();
    tx.execute(
        "INSERT INTO bookmarks (guid, kind, parent_guid, position, title, url, date_added, last_modified)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            guid,
            kind.code(),
            parent_guid,
            position,
            title,
            url.map(Url::as_str),
            now
        ],
    )?;

    Ok(Bookmark {
        guid,
        parent_guid: Some(parent_guid.to_string()),
        position,
        kind,
        title: title.to_string(),
        url: url.cloned(),
        date_added: now,
        last_modified: now,
    })
}

impl LibraryManager {
    pub async fn create_bookmark(
        &self,
        parent_guid: &str,
        title: &str,
        url: &str,
        position: Option<u32>,
    ) -> Result<Bookmark> {
        let url = Url::parse(url).map_err(|_| LibraryError::InvalidUrl(url.to_string()))?;
        let parent = parent_guid.to_string();
        let title = title.to_string();

        let created = self
            .with_writer(move |conn| {
                let tx = conn.transaction()?;
                let node = insert_node(
                    &tx,
                    &parent,
                    BookmarkKind::Bookmark,
                    &title,
                    Some(&url),
                    position,
                )?;
                tx.commit()?;
                Ok(node)
            })
            .await?;

        self.events.post(StorageEvent::BookmarksUpdated);
        Ok(created)
    }

    pub async fn create_folder(
        &self,
        parent_guid: &str,
        title: &str,
        position: Option<u32>,
    ) -> Result<Bookmark> {
        let parent = parent_guid.to_string();
        let title = title.to_string();

        let created = self
            .with_writer(move |conn| {
                let tx = conn.transaction()?;
                let node = insert_node(&tx, &parent, BookmarkKind::Folder, &title, None, position)?;
                tx.commit()?;
                Ok(node)
            })
            .await?;

        self.events.post(StorageEvent::BookmarksUpdated);
        Ok(created)
    }

    /// Update title and/or url of an existing node. Omitted fields keep
    /// their current value.
    pub async fn update_bookmark(
        &self,
        guid: &str,
        title: Option<&str>,
        url: Option<&str>,
    ) -> Result<()> {
        let url = match url {
            Some(raw) => Some(
                Url::parse(raw)
                    .map_err(|_| LibraryError::InvalidUrl(raw.to_string()))?
                    .to_string(),
            ),
            None => None,
        };
        let guid = guid.to_string();
        let title = title.map(str::to_string);

        self.with_writer(move |conn| {
            let changed = conn.execute(
                "UPDATE bookmarks
                 SET title = COALESCE(?2, title),
                     url = COALESCE(?3, url),
                     last_modified = ?4,
                     sync_change_counter = sync_change_counter + 1
                 WHERE guid = ?1",
                params![guid, title, url, Utc::now().timestamp_millis()],
            )?;
            if changed == 0 {
                return Err(LibraryError::BookmarkNotFound(guid));
            }
            Ok(())
        })
        .await?;

        self.events.post(StorageEvent::BookmarksUpdated);
        Ok(())
    }

    /// Delete a node and, for folders, everything beneath it. Sibling
    /// positions close up after the removal.
    pub async fn delete_bookmark_node(&self, guid: &str) -> Result<()> {
        if is_root(guid) {
            return Err(LibraryError::CannotDeleteRoot(guid.to_string()));
        }
        let guid = guid.to_string();

        self.with_writer(move |conn| {
            let tx = conn.transaction()?;
            let slot: Option<(Option<String>, u32)> = tx
                .query_row(
                    "SELECT parent_guid, position FROM bookmarks WHERE guid = ?1",
                    [&guid],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let Some((parent_guid, position)) = slot else {
                return Err(LibraryError::BookmarkNotFound(guid));
            };

            tx.execute(
                "WITH RECURSIVE to_delete(guid) AS (
                     SELECT ?1
                     UNION ALL
                     SELECT b.guid FROM bookmarks b
                     JOIN to_delete td ON b.parent_guid = td.guid
                 )
                 DELETE FROM bookmarks WHERE guid IN (SELECT guid FROM to_delete)",
                [&guid],
            )?;
            if let Some(parent) = parent_guid {
                tx.execute(
                    "UPDATE bookmarks SET position = position - 1
                     WHERE parent_guid = ?1 AND position > ?2",
                    params![parent, position],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await?;

        self.events.post(StorageEvent::BookmarksUpdated);
        Ok(())
    }

    pub async fn get_bookmark(&self, guid: &str) -> Result<Option<Bookmark>> {
        let guid = guid.to_string();
        self.with_reader(move |conn| {
            let node = conn
                .query_row(
                    &format!("SELECT {BOOKMARK_COLUMNS} FROM bookmarks WHERE guid = ?1"),
                    [guid],
                    Bookmark::from_row,
                )
                .optional()?;
            Ok(node)
        })
        .await
    }

    pub async fn get_bookmarks_with_url(&self, url: &str) -> Result<Vec<Bookmark>> {
        let url = Url::parse(url)
            .map_err(|_| LibraryError::InvalidUrl(url.to_string()))?
            .to_string();
        self.with_reader(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {BOOKMARK_COLUMNS} FROM bookmarks WHERE url = ?1 ORDER BY last_modified DESC"
            ))?;
            let nodes = stmt
                .query_map([url], Bookmark::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(nodes)
        })
        .await
    }

    pub async fn get_bookmarks_in_folder(&self, folder_guid: &str) -> Result<Vec<Bookmark>> {
        let folder_guid = folder_guid.to_string();
        self.with_reader(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {BOOKMARK_COLUMNS} FROM bookmarks WHERE parent_guid = ?1 ORDER BY position"
            ))?;
            let nodes = stmt
                .query_map([folder_guid], Bookmark::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(nodes)
        })
        .await
    }

    /// Substring search over bookmark titles and urls. Folders are not
    /// returned.
    pub async fn search_bookmarks(&self, query: &str, limit: u32) -> Result<Vec<Bookmark>> {
        let pattern = format!("%{query}%");
        self.with_reader(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {BOOKMARK_COLUMNS} FROM bookmarks
                 WHERE kind = ?1 AND (title LIKE ?2 OR url LIKE ?2)
                 ORDER BY last_modified DESC
                 LIMIT ?3"
            ))?;
            let nodes = stmt
                .query_map(
                    params![BookmarkKind::Bookmark.code(), pattern, limit],
                    Bookmark::from_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(nodes)
        })
        .await
    }
}
