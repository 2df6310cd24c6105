//! Harbor Core
//!
//! Profile-level wiring for the Harbor storage engines: one place to
//! construct, open and tear down the clients cache, the library engine
//! and the cached sync credentials.

mod config;
mod error;
mod profile;

pub use config::Config;
pub use error::CoreError;
pub use profile::Profile;

// Re-export core components
pub use harbor_clients::{
    ClientsError, ClientsStore, RemoteClient, RemoteDevice, RemoteTab, SyncCommand,
};
pub use harbor_library::{
    Bookmark, BookmarkKind, DocumentType, HistoryMetadata, HistoryMetadataObservation,
    HistoryVisitInfo, LibraryError, LibraryManager, SiteInfo, SyncBridge, VisitObservation,
    VisitPage, VisitType,
};
pub use harbor_storage::{
    Database, ErrorReporter, EventBus, LogReporter, Severity, StorageError, StorageEvent,
};
pub use harbor_sync::{
    Accessibility, CredentialCache, FileSecretStore, MemorySecretStore, SecretStore, SyncAuthInfo,
    SyncError, SyncOutcome,
};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Initialize logging
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(true).init();
}
