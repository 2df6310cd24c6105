//! Queued sync commands
//!
//! Commands are stored as opaque JSON payloads, one row per target
//! client, and deleted after successful delivery.

use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCommand {
    /// Rowid once stored; `None` before insertion.
    pub id: Option<i64>,
    pub value: String,
    pub client_guid: Option<String>,
}

impl SyncCommand {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            id: None,
            value: value.into(),
            client_guid: None,
        }
    }

    /// The "open this URL over there" command used by send-tab.
    pub fn display_uri(url: &Url, sender_guid: &str, title: &str) -> Self {
        let payload = serde_json::json!({
            "command": "displayURI",
            "args": [url.as_str(), sender_guid, title],
        });
        Self::new(payload.to_string())
    }

    /// Ask a client to wipe one of its sync engines.
    pub fn wipe_engine(engine: &str) -> Self {
        let payload = serde_json::json!({
            "command": "wipeEngine",
            "args": [engine],
        });
        Self::new(payload.to_string())
    }
}
