//! Secret storage capability
//!
//! The platform keychain is supplied by the embedder; these are the
//! bundled backends for tests and headless use. Values are opaque
//! strings keyed by caller-composed names.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::Result;

/// When a stored secret may be read back, for backends that can
/// enforce it. The bundled backends accept and ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accessibility {
    AfterFirstUnlock,
    WhenUnlocked,
}

pub trait SecretStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str, accessibility: Accessibility) -> Result<()>;
    /// Removing a key that was never stored is a success.
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory backend for tests and ephemeral profiles.
#[derive(Default)]
pub struct MemorySecretStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<dyn SecretStore> {
        Arc::new(Self::new())
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str, _accessibility: Accessibility) -> Result<()> {
        self.entries
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// File-backed backend: one JSON object per profile, chmod 0600 on
/// unix. Not an encrypted store; suitable where the profile directory
/// is already trusted.
pub struct FileSecretStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl FileSecretStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<()> {
        let raw = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, raw)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&self.path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(&self.path, perms)?;
        }

        Ok(())
    }
}

impl SecretStore for FileSecretStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str, _accessibility: Accessibility) -> Result<()> {
        let mut entries = self.entries.write();
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write();
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }
}
