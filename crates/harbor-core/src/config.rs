//! Profile configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory for all profile files
    pub data_dir: PathBuf,
    /// Path to the clients cache database
    pub clients_db_path: PathBuf,
    /// Path to the library engine database
    pub library_db_path: PathBuf,
    /// Path the pre-split single-file database lived at
    pub legacy_db_path: PathBuf,
    /// Path to the secret store backing file
    pub secrets_path: PathBuf,
    /// Branch prefix for credential records in the secret store
    pub credential_branch: String,
}

impl Config {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            clients_db_path: data_dir.join("clients.db"),
            library_db_path: data_dir.join("library.db"),
            legacy_db_path: data_dir.join("harbor.db"),
            secrets_path: data_dir.join("secrets.json"),
            credential_branch: "harbor.sync".to_string(),
            data_dir,
        }
    }

    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .map(|d| d.join("Harbor"))
            .unwrap_or_else(|| PathBuf::from(".harbor"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Self::data_dir())
    }
}

// Simple dirs implementation for common directories
mod dirs {
    use std::path::PathBuf;

    pub fn data_local_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("LOCALAPPDATA").ok().map(PathBuf::from)
        }
        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library/Application Support"))
        }
        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_DATA_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".local/share"))
                })
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        {
            None
        }
    }
}
