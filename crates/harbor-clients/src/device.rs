//! Account-level device registry records
//!
//! Devices come from the account system, not the clients collection.
//! A client record is only shown when a device with a matching guid
//! still exists.

use rusqlite::Row;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDevice {
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub is_current_device: bool,
    /// Epoch milliseconds, when the account last saw this device.
    pub last_access_time: Option<i64>,
    #[serde(rename = "availableCommands")]
    pub available_commands: Option<serde_json::Value>,
}

impl RemoteDevice {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let raw_commands: Option<String> = row.get(5)?;
        let available_commands = match raw_commands {
            Some(raw) => Some(serde_json::from_str(&raw).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    5,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?),
            None => None,
        };

        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            kind: row.get(2)?,
            is_current_device: row.get(3)?,
            last_access_time: row.get(4)?,
            available_commands,
        })
    }
}
