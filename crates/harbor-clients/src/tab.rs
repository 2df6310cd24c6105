//! Remote tab snapshots
//!
//! Each sync replaces a client's tab list wholesale; rows have no
//! identity of their own beyond the owning client.

use rusqlite::Row;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTab {
    pub client_guid: String,
    pub url: Url,
    pub title: String,
    /// Most-recent-first back history for the tab.
    pub history: Vec<String>,
    /// Epoch milliseconds.
    pub last_used: i64,
}

impl RemoteTab {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let raw_url: String = row.get(1)?;
        let url = Url::parse(&raw_url).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?;

        let raw_history: String = row.get(3)?;
        let history = serde_json::from_str(&raw_history).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(Self {
            client_guid: row.get(0)?,
            url,
            title: row.get(2)?,
            history,
            last_used: row.get(4)?,
        })
    }
}
