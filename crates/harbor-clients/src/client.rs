//! Remote client records
//!
//! One record per client in the account's clients collection. `guid`
//! and `modified` come from the client's own sync record; a missing
//! guid means the record has never been uploaded.

use rusqlite::Row;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteClient {
    pub guid: Option<String>,
    pub name: String,
    /// Epoch milliseconds from the client's record.
    pub modified: i64,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub formfactor: Option<String>,
    pub os: Option<String>,
    pub version: Option<String>,
    #[serde(rename = "fxaDeviceId")]
    pub fxa_device_id: Option<String>,
}

impl RemoteClient {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            guid: row.get(0)?,
            name: row.get(1)?,
            modified: row.get(2)?,
            kind: row.get(3)?,
            formfactor: row.get(4)?,
            os: row.get(5)?,
            version: row.get(6)?,
            fxa_device_id: row.get(7)?,
        })
    }
}
