//! Sync auth bundle and outcomes
//!
//! The token fields are opaque here: they are produced by the account
//! system and consumed by the sync transport, never interpreted
//! locally.

use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncAuthInfo {
    pub kid: String,
    pub fxa_access_token: String,
    pub sync_key: String,
    pub tokenserver_url: Url,
}

/// How a single engine sync ended. Credential problems are split out
/// so callers can prompt for reauthentication instead of retrying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncOutcome {
    Success,
    AuthInvalid,
    Failed(String),
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Success)
    }
}
