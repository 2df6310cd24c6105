//! Visit history storage
//!
//! Pages are deduplicated by url and carry denormalized visit counts
//! and a frecency score; individual visits hang off them and cascade
//! on page deletion. Embed and redirect visits mark a page hidden so
//! url bar queries skip it until the user visits it directly.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use url::Url;

use harbor_storage::StorageEvent;

use crate::{LibraryManager, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisitType {
    Link,
    Typed,
    Bookmark,
    Embed,
    Redirect,
    Download,
    Reload,
}

impl VisitType {
    pub(crate) fn code(self) -> i64 {
        match self {
            VisitType::Link => 1,
            VisitType::Typed => 2,
            VisitType::Bookmark => 3,
            VisitType::Embed => 4,
            VisitType::Redirect => 5,
            VisitType::Download => 6,
            VisitType::Reload => 7,
        }
    }

    pub(crate) fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(VisitType::Link),
            2 => Some(VisitType::Typed),
            3 => Some(VisitType::Bookmark),
            4 => Some(VisitType::Embed),
            5 => Some(VisitType::Redirect),
            6 => Some(VisitType::Download),
            7 => Some(VisitType::Reload),
            _ => None,
        }
    }

    /// Visits the user did not explicitly make keep their page out of
    /// url bar results.
    pub fn is_hidden(self) -> bool {
        matches!(self, VisitType::Embed | VisitType::Redirect)
    }
}

/// One observed visit, ready to be recorded. `at` defaults to now.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitObservation {
    pub url: Url,
    pub title: Option<String>,
    pub visit_type: VisitType,
    pub at: Option<i64>,
}

impl VisitObservation {
    pub fn new(url: Url, visit_type: VisitType) -> Self {
        Self {
            url,
            title: None,
            visit_type,
            at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryVisitInfo {
    pub url: Url,
    pub title: Option<String>,
    pub visited_at: i64,
    pub visit_type: VisitType,
    pub is_hidden: bool,
}

impl HistoryVisitInfo {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let raw: String = row.get(0)?;
        let url = Url::parse(&raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let code: i64 = row.get(3)?;
        let visit_type = VisitType::from_code(code)
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(3, code))?;
        Ok(Self {
            url,
            title: row.get(1)?,
            visited_at: row.get(2)?,
            visit_type,
            is_hidden: row.get(4)?,
        })
    }
}

/// One page of visits below a timestamp bound, oldest-first pagination
/// via `offset` against the same bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitPage {
    pub infos: Vec<HistoryVisitInfo>,
    pub bound: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteInfo {
    pub url: Url,
    pub title: Option<String>,
    pub frecency: i64,
}

impl SiteInfo {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let raw: String = row.get(0)?;
        let url = Url::parse(&raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(Self {
            url,
            title: row.get(1)?,
            frecency: row.get(2)?,
        })
    }
}

/// Combined visit count, recency and visit type score. Typed visits
/// weigh double a followed link; hidden visit types contribute nothing.
pub(crate) fn frecency_score(visit_count: i64, days_since_last_visit: i64, visit_type: VisitType) -> i64 {
    let recency = match days_since_last_visit {
        0..=4 => 100,
        5..=14 => 70,
        15..=31 => 50,
        32..=90 => 30,
        _ => 10,
    };
    let weight = match visit_type {
        VisitType::Typed => 200,
        VisitType::Bookmark => 140,
        VisitType::Link => 100,
        VisitType::Reload => 50,
        VisitType::Download => 40,
        VisitType::Embed | VisitType::Redirect => 0,
    };
    visit_count * recency * weight / 100
}

const DAY_MS: i64 = 86_400_000;

impl LibraryManager {
    /// Record one visit: upsert the page row, refresh its denormalized
    /// columns and append the visit.
    pub async fn apply_visit_observation(&self, observation: VisitObservation) -> Result<()> {
        self.with_writer(move |conn| {
            let tx = conn.transaction()?;
            let at = observation.at.unwrap_or_else(|| Utc::now().timestamp_millis());
            let url = observation.url.to_string();
            let hidden = observation.visit_type.is_hidden();

            let page: Option<(i64, i64)> = tx
                .query_row(
                    "SELECT id, visit_count FROM pages WHERE url = ?1",
                    [&url],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let page_id = match page {
                Some((id, visit_count)) => {
                    let count = visit_count + 1;
                    let frecency = frecency_score(count, 0, observation.visit_type);
                    // A direct visit unhides the page; a hidden visit
                    // never hides an already-visible one.
                    tx.execute(
                        "UPDATE pages
                         SET title = COALESCE(?2, title),
                             visit_count = ?3,
                             hidden = hidden AND ?4,
                             last_visit_at = ?5,
                             frecency = ?6
                         WHERE id = ?1",
                        params![id, observation.title, count, hidden, at, frecency],
                    )?;
                    id
                }
                None => {
                    let frecency = frecency_score(1, 0, observation.visit_type);
                    tx.execute(
                        "INSERT INTO pages (url, title, visit_count, frecency, hidden, last_visit_at)
                         VALUES (?1, ?2, 1, ?3, ?4, ?5)",
                        params![url, observation.title, frecency, hidden, at],
                    )?;
                    tx.last_insert_rowid()
                }
            };

            tx.execute(
                "INSERT INTO visits (page_id, visit_type, visited_at) VALUES (?1, ?2, ?3)",
                params![page_id, observation.visit_type.code(), at],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await?;

        self.events.post(StorageEvent::HistoryUpdated);
        Ok(())
    }

    /// Visits at or before `bound`, newest first, skipping `offset`
    /// rows. `exclude_types` filters whole visit types out of the page.
    pub async fn get_visits_page(
        &self,
        bound: i64,
        offset: i64,
        count: i64,
        exclude_types: &[VisitType],
    ) -> Result<VisitPage> {
        let mut sql = String::from(
            "SELECT p.url, p.title, v.visited_at, v.visit_type, p.hidden
             FROM visits v
             JOIN pages p ON v.page_id = p.id
             WHERE v.visited_at <= ?1",
        );
        if !exclude_types.is_empty() {
            let codes: Vec<String> = exclude_types.iter().map(|t| t.code().to_string()).collect();
            sql.push_str(&format!(" AND v.visit_type NOT IN ({})", codes.join(",")));
        }
        sql.push_str(" ORDER BY v.visited_at DESC LIMIT ?2 OFFSET ?3");

        let infos = self
            .with_reader(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![bound, count, offset], HistoryVisitInfo::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        Ok(VisitPage {
            infos,
            bound,
            offset,
        })
    }

    /// Url bar matching: substring over url and title, hidden pages
    /// excluded, best frecency first.
    pub async fn query_autocomplete(&self, search: &str, limit: u32) -> Result<Vec<SiteInfo>> {
        let pattern = format!("%{search}%");
        self.with_reader(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT url, title, frecency FROM pages
                 WHERE hidden = 0 AND (url LIKE ?1 OR title LIKE ?1)
                 ORDER BY frecency DESC, last_visit_at DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![pattern, limit], SiteInfo::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    /// Highest-frecency visible pages, for new-tab tiles.
    pub async fn get_top_frecent_site_infos(
        &self,
        limit: u32,
        frecency_threshold: i64,
    ) -> Result<Vec<SiteInfo>> {
        self.with_reader(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT url, title, frecency FROM pages
                 WHERE hidden = 0 AND frecency >= ?1
                 ORDER BY frecency DESC, last_visit_at DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![frecency_threshold, limit], SiteInfo::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    /// Remove a page and all its visits.
    pub async fn delete_visits_for(&self, url: &str) -> Result<()> {
        let url = url.to_string();
        self.with_writer(move |conn| {
            let deleted = conn.execute("DELETE FROM pages WHERE url = ?1", [url])?;
            tracing::debug!(pages = deleted, "Deleted page from history");
            Ok(())
        })
        .await?;

        self.events.post(StorageEvent::HistoryUpdated);
        Ok(())
    }

    pub async fn delete_everything_history(&self) -> Result<()> {
        self.with_writer(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM visits", ())?;
            tx.execute("DELETE FROM pages", ())?;
            tx.execute("DELETE FROM history_metadata", ())?;
            tx.commit()?;
            tracing::info!("Deleted all history");
            Ok(())
        })
        .await?;

        self.events.post(StorageEvent::HistoryUpdated);
        Ok(())
    }

    /// Drop visits older than `keep_days`, then repair the denormalized
    /// page columns and remove pages left without visits.
    pub async fn prune_history(&self, keep_days: u32) -> Result<()> {
        let cutoff = Utc::now().timestamp_millis() - i64::from(keep_days) * DAY_MS;
        self.with_writer(move |conn| {
            let tx = conn.transaction()?;
            let visits = tx.execute("DELETE FROM visits WHERE visited_at < ?1", [cutoff])?;
            tx.execute(
                "UPDATE pages SET
                     visit_count = (SELECT COUNT(*) FROM visits WHERE page_id = pages.id),
                     last_visit_at = (SELECT MAX(visited_at) FROM visits WHERE page_id = pages.id)",
                (),
            )?;
            let pages = tx.execute("DELETE FROM pages WHERE visit_count = 0", ())?;

            // Surviving pages get their frecency rescored against the
            // visits that remain.
            let rescore: Vec<(i64, i64, i64, i64)> = {
                let mut stmt = tx.prepare(
                    "SELECT p.id, p.visit_count, p.last_visit_at,
                            (SELECT v.visit_type FROM visits v
                             WHERE v.page_id = p.id
                             ORDER BY v.visited_at DESC LIMIT 1)
                     FROM pages p",
                )?;
                let rows = stmt
                    .query_map((), |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            };
            let now = Utc::now().timestamp_millis();
            for (id, visit_count, last_visit_at, type_code) in rescore {
                let visit_type = VisitType::from_code(type_code).unwrap_or(VisitType::Link);
                let days = (now - last_visit_at).max(0) / DAY_MS;
                let frecency = frecency_score(visit_count, days, visit_type);
                tx.execute(
                    "UPDATE pages SET frecency = ?2 WHERE id = ?1",
                    params![id, frecency],
                )?;
            }
            tx.commit()?;
            tracing::info!(visits, pages, "Pruned history");
            Ok(())
        })
        .await?;

        self.events.post(StorageEvent::HistoryUpdated);
        Ok(())
    }
}
