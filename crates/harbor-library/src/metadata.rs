//! History metadata storage
//!
//! Rows are keyed by (url, search_term, referrer_url) so the same page
//! reached from two searches stays distinct. The key columns are
//! nullable and SQLite treats NULLs as distinct in UNIQUE indexes, so
//! the upsert matches with IS instead of relying on a constraint.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use url::Url;

use harbor_storage::StorageEvent;

use crate::{LibraryManager, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Regular,
    Media,
}

impl DocumentType {
    pub(crate) fn code(self) -> i64 {
        match self {
            DocumentType::Regular => 0,
            DocumentType::Media => 1,
        }
    }

    pub(crate) fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(DocumentType::Regular),
            1 => Some(DocumentType::Media),
            _ => None,
        }
    }
}

/// A partial update for one metadata key; `None` fields leave the
/// stored value alone and `view_time_delta` accumulates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMetadataObservation {
    pub url: Url,
    pub search_term: Option<String>,
    pub referrer_url: Option<Url>,
    pub title: Option<String>,
    pub document_type: Option<DocumentType>,
    pub view_time_delta: Option<i64>,
}

impl HistoryMetadataObservation {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            search_term: None,
            referrer_url: None,
            title: None,
            document_type: None,
            view_time_delta: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMetadata {
    pub url: Url,
    pub search_term: Option<String>,
    pub referrer_url: Option<Url>,
    pub title: String,
    pub document_type: DocumentType,
    pub total_view_time: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

const METADATA_COLUMNS: &str =
    "url, search_term, referrer_url, title, document_type, total_view_time, created_at, updated_at";

impl HistoryMetadata {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let raw: String = row.get(0)?;
        let url = Url::parse(&raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let referrer_url = match row.get::<_, Option<String>>(2)? {
            Some(raw) => Some(Url::parse(&raw).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?),
            None => None,
        };
        let code: i64 = row.get(4)?;
        let document_type = DocumentType::from_code(code)
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(4, code))?;
        Ok(Self {
            url,
            search_term: row.get(1)?,
            referrer_url,
            title: row.get(3)?,
            document_type,
            total_view_time: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

impl LibraryManager {
    /// Merge an observation into the row for its key, creating the row
    /// on first sight.
    pub async fn note_history_metadata_observation(
        &self,
        observation: HistoryMetadataObservation,
    ) -> Result<()> {
        self.with_writer(move |conn| {
            let tx = conn.transaction()?;
            let url = observation.url.to_string();
            let referrer = observation.referrer_url.as_ref().map(Url::to_string);
            let now = Utc::now().timestamp_millis();

            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM history_metadata
                     WHERE url = ?1 AND search_term IS ?2 AND referrer_url IS ?3",
                    params![url, observation.search_term, referrer],
                    |row| row.get(0),
                )
                .optional()?;

            match existing {
                Some(id) => {
                    tx.execute(
                        "UPDATE history_metadata SET
                             title = COALESCE(?2, title),
                             document_type = COALESCE(?3, document_type),
                             total_view_time = total_view_time + COALESCE(?4, 0),
                             updated_at = ?5
                         WHERE id = ?1",
                        params![
                            id,
                            observation.title,
                            observation.document_type.map(DocumentType::code),
                            observation.view_time_delta,
                            now
                        ],
                    )?;
                }
                None => {
                    tx.execute(
                        "INSERT INTO history_metadata
                             (url, search_term, referrer_url, title, document_type,
                              total_view_time, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                        params![
                            url,
                            observation.search_term,
                            referrer,
                            observation.title.unwrap_or_default(),
                            observation.document_type.map_or(0, DocumentType::code),
                            observation.view_time_delta.unwrap_or(0),
                            now
                        ],
                    )?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await?;

        self.events.post(StorageEvent::HistoryUpdated);
        Ok(())
    }

    /// The most recently touched metadata row for a url, across all
    /// search terms and referrers.
    pub async fn get_latest_history_metadata_for_url(
        &self,
        url: &str,
    ) -> Result<Option<HistoryMetadata>> {
        let url = url.to_string();
        self.with_reader(move |conn| {
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {METADATA_COLUMNS} FROM history_metadata
                         WHERE url = ?1 ORDER BY updated_at DESC LIMIT 1"
                    ),
                    [url],
                    HistoryMetadata::from_row,
                )
                .optional()?;
            Ok(row)
        })
        .await
    }

    /// Substring search over url, title and search term.
    pub async fn query_history_metadata(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<HistoryMetadata>> {
        let pattern = format!("%{query}%");
        self.with_reader(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {METADATA_COLUMNS} FROM history_metadata
                 WHERE url LIKE ?1 OR title LIKE ?1 OR search_term LIKE ?1
                 ORDER BY updated_at DESC
                 LIMIT ?2"
            ))?;
            let rows = stmt
                .query_map(params![pattern, limit], HistoryMetadata::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    pub async fn get_history_metadata_since(&self, since: i64) -> Result<Vec<HistoryMetadata>> {
        self.with_reader(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {METADATA_COLUMNS} FROM history_metadata
                 WHERE updated_at >= ?1 ORDER BY updated_at DESC"
            ))?;
            let rows = stmt
                .query_map([since], HistoryMetadata::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    pub async fn delete_history_metadata_older_than(&self, cutoff: i64) -> Result<()> {
        self.with_writer(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM history_metadata WHERE updated_at < ?1",
                [cutoff],
            )?;
            tracing::debug!(deleted, "Expired history metadata");
            Ok(())
        })
        .await?;

        self.events.post(StorageEvent::HistoryUpdated);
        Ok(())
    }
}
