//! Write-through credential cache
//!
//! An in-memory value mirrored into the secret store under
//! `"{branch}.{label}"`. Every assignment checkpoints immediately, so
//! the stored copy never lags the cached one. Absence is a value:
//! lookup and decode failures fall back to the caller's default
//! instead of erroring.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::secrets::{Accessibility, SecretStore};

pub struct CredentialCache<T> {
    store: Arc<dyn SecretStore>,
    branch: String,
    label: String,
    value: Arc<Mutex<Option<T>>>,
}

impl<T> CredentialCache<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    /// Load the cached value under `branch`, or fall back to `default`.
    ///
    /// A missing label gets a freshly generated one; the caller is
    /// expected to persist it (see [`CredentialCache::label`]) so the
    /// next launch finds the same record. Construction never fails.
    pub fn from_branch(
        store: Arc<dyn SecretStore>,
        branch: &str,
        label: Option<String>,
        default: Option<T>,
    ) -> Self {
        if let Some(label) = label {
            let key = format!("{branch}.{label}");
            match store.get(&key) {
                Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                    Ok(value) => {
                        tracing::debug!(branch = %branch, label = %label, "Loaded cached credential");
                        return Self::assemble(store, branch, label, Some(value));
                    }
                    Err(e) => {
                        tracing::warn!(
                            branch = %branch,
                            label = %label,
                            error = %e,
                            "Cached credential failed to decode; using default"
                        );
                    }
                },
                Ok(None) => {
                    tracing::debug!(branch = %branch, label = %label, "No credential stored under label");
                }
                Err(e) => {
                    tracing::warn!(branch = %branch, error = %e, "Secret store read failed; using default");
                }
            }
            // Keep the label so a later checkpoint lands on the same key.
            return Self::assemble(store, branch, label, default);
        }

        let label = Uuid::new_v4().to_string();
        tracing::debug!(branch = %branch, label = %label, "Generated fresh credential label");
        Self::assemble(store, branch, label, default)
    }

    fn assemble(store: Arc<dyn SecretStore>, branch: &str, label: String, value: Option<T>) -> Self {
        Self {
            store,
            branch: branch.to_string(),
            label,
            value: Arc::new(Mutex::new(value)),
        }
    }

    pub fn value(&self) -> Option<T> {
        self.value.lock().clone()
    }

    /// Replace the cached value and checkpoint it immediately.
    pub fn set_value(&self, value: Option<T>) {
        *self.value.lock() = value;
        self.checkpoint();
    }

    /// Flush the current value to the secret store: present values are
    /// written, an absent value removes the stored record. Failures are
    /// logged and leave the stored record as it was.
    pub fn checkpoint(&self) {
        let key = self.key();
        let guard = self.value.lock();
        match guard.as_ref() {
            Some(value) => match serde_json::to_string(value) {
                Ok(raw) => {
                    if let Err(e) = self.store.set(&key, &raw, Accessibility::AfterFirstUnlock) {
                        tracing::warn!(branch = %self.branch, error = %e, "Failed to checkpoint credential");
                    } else {
                        tracing::debug!(branch = %self.branch, label = %self.label, "Checkpointed credential");
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        branch = %self.branch,
                        error = %e,
                        "Credential failed to serialize; stored record left untouched"
                    );
                }
            },
            None => {
                if let Err(e) = self.store.remove(&key) {
                    tracing::warn!(branch = %self.branch, error = %e, "Failed to clear stored credential");
                } else {
                    tracing::debug!(branch = %self.branch, label = %self.label, "Cleared stored credential");
                }
            }
        }
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// The label in use, generated if none was supplied at load time.
    pub fn label(&self) -> &str {
        &self.label
    }

    fn key(&self) -> String {
        format!("{}.{}", self.branch, self.label)
    }
}

impl<T> Clone for CredentialCache<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            branch: self.branch.clone(),
            label: self.label.clone(),
            value: Arc::clone(&self.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::MemorySecretStore;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Keys {
        token: String,
        generation: i64,
    }

    fn keys(token: &str) -> Keys {
        Keys {
            token: token.to_string(),
            generation: 1,
        }
    }

    #[test]
    fn test_set_value_checkpoints_immediately() {
        let store: Arc<dyn SecretStore> = Arc::new(MemorySecretStore::new());
        let cache: CredentialCache<Keys> =
            CredentialCache::from_branch(Arc::clone(&store), "sync", None, None);

        cache.set_value(Some(keys("abc")));

        let key = format!("sync.{}", cache.label());
        let raw = store.get(&key).unwrap().unwrap();
        assert_eq!(serde_json::from_str::<Keys>(&raw).unwrap(), keys("abc"));
    }

    #[test]
    fn test_reload_under_same_label_round_trips() {
        let store: Arc<dyn SecretStore> = Arc::new(MemorySecretStore::new());
        let first: CredentialCache<Keys> =
            CredentialCache::from_branch(Arc::clone(&store), "sync", None, None);
        first.set_value(Some(keys("abc")));
        let label = first.label().to_string();

        let second: CredentialCache<Keys> =
            CredentialCache::from_branch(store, "sync", Some(label), None);
        assert_eq!(second.value(), Some(keys("abc")));
    }

    #[test]
    fn test_decode_failure_falls_back_to_default() {
        let store: Arc<dyn SecretStore> = Arc::new(MemorySecretStore::new());
        store
            .set("sync.label-1", "not json at all", Accessibility::AfterFirstUnlock)
            .unwrap();

        let cache: CredentialCache<Keys> = CredentialCache::from_branch(
            store,
            "sync",
            Some("label-1".to_string()),
            Some(keys("fallback")),
        );
        assert_eq!(cache.value(), Some(keys("fallback")));
        assert_eq!(cache.label(), "label-1");
    }

    #[test]
    fn test_missing_label_generates_one() {
        let store: Arc<dyn SecretStore> = Arc::new(MemorySecretStore::new());
        let cache: CredentialCache<Keys> = CredentialCache::from_branch(store, "sync", None, None);

        assert!(!cache.label().is_empty());
        assert_eq!(cache.value(), None);
    }

    #[test]
    fn test_clearing_value_removes_stored_record() {
        let store: Arc<dyn SecretStore> = Arc::new(MemorySecretStore::new());
        let cache: CredentialCache<Keys> =
            CredentialCache::from_branch(Arc::clone(&store), "sync", None, None);

        cache.set_value(Some(keys("abc")));
        let key = format!("sync.{}", cache.label());
        assert!(store.get(&key).unwrap().is_some());

        cache.set_value(None);
        assert!(store.get(&key).unwrap().is_none());
    }

    #[test]
    fn test_reload_after_clear_yields_default() {
        let store: Arc<dyn SecretStore> = Arc::new(MemorySecretStore::new());
        let first: CredentialCache<Keys> =
            CredentialCache::from_branch(Arc::clone(&store), "sync", None, None);
        first.set_value(Some(keys("abc")));
        first.set_value(None);
        let label = first.label().to_string();

        let second: CredentialCache<Keys> = CredentialCache::from_branch(
            store,
            "sync",
            Some(label),
            Some(keys("fallback")),
        );
        assert_eq!(second.value(), Some(keys("fallback")));
    }
}
