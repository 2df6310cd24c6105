//! Harbor Library Engine
//!
//! Bookmarks, history and history metadata in one embedded database,
//! accessed through serialized writer and reader connections the
//! application closes and reopens around its lifecycle.

mod bookmarks;
mod error;
mod history;
mod manager;
mod metadata;
mod migrate;
mod schema;
mod sync;

pub use bookmarks::{
    is_root, Bookmark, BookmarkKind, MENU_ROOT_GUID, MOBILE_ROOT_GUID, ROOT_GUID,
    TOOLBAR_ROOT_GUID, UNFILED_ROOT_GUID,
};
pub use error::{LibraryError, OpenFailureKind};
pub use history::{HistoryVisitInfo, SiteInfo, VisitObservation, VisitPage, VisitType};
pub use manager::LibraryManager;
pub use metadata::{DocumentType, HistoryMetadata, HistoryMetadataObservation};
pub use sync::{LocalSyncBridge, SyncBridge};

pub type Result<T> = std::result::Result<T, LibraryError>;
