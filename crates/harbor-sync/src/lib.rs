//! Harbor Sync Support
//!
//! Credential caching on top of a pluggable secret store, plus the
//! opaque auth bundle handed to the sync entry points. The sync wire
//! protocol itself lives elsewhere; this crate only keeps its inputs
//! and outcomes.

mod auth;
mod cache;
mod error;
mod secrets;

pub use auth::{SyncAuthInfo, SyncOutcome};
pub use cache::CredentialCache;
pub use error::SyncError;
pub use secrets::{Accessibility, FileSecretStore, MemorySecretStore, SecretStore};

pub type Result<T> = std::result::Result<T, SyncError>;
