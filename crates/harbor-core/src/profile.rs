//! Profile wiring
//!
//! One [`Profile`] owns every storage engine for a user profile: the
//! clients cache, the library engine and the cached sync credentials,
//! with one event bus across them. The clients database runs for the
//! whole process; only the library engine follows the app lifecycle.

use std::sync::Arc;

use harbor_clients::ClientsStore;
use harbor_library::LibraryManager;
use harbor_storage::{Database, ErrorReporter, EventBus, LogReporter};
use harbor_sync::{CredentialCache, FileSecretStore, SecretStore, SyncAuthInfo, SyncOutcome};

use crate::config::Config;
use crate::Result;

/// Label of the credential record holding the sync auth bundle.
const AUTH_LABEL: &str = "auth-info";

pub struct Profile {
    config: Config,
    db: Database,
    clients: ClientsStore,
    library: LibraryManager,
    credentials: CredentialCache<SyncAuthInfo>,
    events: EventBus,
}

impl Profile {
    /// Wire up every engine under `config.data_dir`. The library
    /// engine stays closed until [`Profile::open`].
    pub fn new(config: Config) -> Result<Self> {
        Self::with_reporter(config, Arc::new(LogReporter))
    }

    pub fn with_reporter(config: Config, reporter: Arc<dyn ErrorReporter>) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let events = EventBus::new();
        let db = Database::open(&config.clients_db_path)?;
        let clients = ClientsStore::new(db.clone());

        let secrets: Arc<dyn SecretStore> = Arc::new(FileSecretStore::open(&config.secrets_path)?);
        let credentials = CredentialCache::from_branch(
            secrets,
            &config.credential_branch,
            Some(AUTH_LABEL.to_string()),
            None,
        );

        let library = LibraryManager::new(&config.library_db_path, events.clone(), reporter);

        Ok(Self {
            config,
            db,
            clients,
            library,
            credentials,
            events,
        })
    }

    /// Run the one-shot legacy import if it applies, then open the
    /// library engine.
    pub async fn open(&self) -> Result<()> {
        self.library
            .migrate_from_legacy(&self.config.legacy_db_path)
            .await?;
        self.library.reopen_if_closed().await?;
        tracing::info!(data_dir = %self.config.data_dir.display(), "Profile opened");
        Ok(())
    }

    /// Backgrounding hook: interrupt in-flight library work and close
    /// the engine. The clients cache stays available.
    pub async fn background(&self) -> Result<()> {
        self.library.force_close().await?;
        Ok(())
    }

    /// Foregrounding hook, paired with [`Profile::background`].
    pub async fn reactivate(&self) -> Result<()> {
        self.library.reopen_if_closed().await?;
        Ok(())
    }

    /// Final teardown: close the library engine and stop the clients
    /// database worker. The profile cannot be used afterwards.
    pub async fn shutdown(&self) -> Result<()> {
        self.library.force_close().await?;
        self.db.close();
        tracing::info!("Profile shut down");
        Ok(())
    }

    /// Sign-out: forget the cached credentials, wipe the clients cache
    /// and reset both engines' sync state.
    pub async fn on_account_removed(&self) -> Result<()> {
        self.credentials.set_value(None);
        self.clients.clear().await?;
        self.library.reopen_if_closed().await?;
        self.library.reset_bookmarks_metadata().await?;
        self.library.reset_history_metadata().await?;
        tracing::info!("Cleared account-scoped state");
        Ok(())
    }

    /// Sync both library engines, returning the bookmarks and history
    /// outcomes in that order.
    pub async fn sync_all(&self, auth: &SyncAuthInfo) -> Result<(SyncOutcome, SyncOutcome)> {
        let bookmarks = self.library.sync_bookmarks(auth).await?;
        let history = self.library.sync_history(auth).await?;
        Ok((bookmarks, history))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn clients(&self) -> &ClientsStore {
        &self.clients
    }

    pub fn library(&self) -> &LibraryManager {
        &self.library
    }

    pub fn credentials(&self) -> &CredentialCache<SyncAuthInfo> {
        &self.credentials
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harbor_clients::RemoteClient;
    use harbor_library::{VisitObservation, VisitType, UNFILED_ROOT_GUID};
    use harbor_storage::StorageEvent;
    use url::Url;

    fn auth() -> SyncAuthInfo {
        SyncAuthInfo {
            kid: "kid".to_string(),
            fxa_access_token: "token".to_string(),
            sync_key: "key".to_string(),
            tokenserver_url: Url::parse("https://token.example/1.0/sync").unwrap(),
        }
    }

    fn client(guid: &str) -> RemoteClient {
        RemoteClient {
            guid: Some(guid.to_string()),
            name: format!("Device {guid}"),
            modified: 0,
            kind: Some("desktop".to_string()),
            formfactor: None,
            os: None,
            version: None,
            fxa_device_id: None,
        }
    }

    #[tokio::test]
    async fn test_profile_wires_all_engines() {
        let dir = tempfile::tempdir().unwrap();
        let profile = Profile::new(Config::new(dir.path().to_path_buf())).unwrap();
        profile.open().await.unwrap();
        assert!(profile.library().is_open());

        profile
            .clients()
            .insert_or_update_client(&client("alpha"))
            .await
            .unwrap();
        assert_eq!(profile.clients().get_client_guids().await.unwrap().len(), 1);

        profile
            .library()
            .create_bookmark(UNFILED_ROOT_GUID, "Example", "https://example.com/", None)
            .await
            .unwrap();
        profile
            .library()
            .apply_visit_observation(VisitObservation::new(
                Url::parse("https://example.com/").unwrap(),
                VisitType::Typed,
            ))
            .await
            .unwrap();
        let sites = profile.library().query_autocomplete("example", 5).await.unwrap();
        assert_eq!(sites.len(), 1);
    }

    #[tokio::test]
    async fn test_credentials_survive_profile_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf());

        let profile = Profile::new(config.clone()).unwrap();
        assert_eq!(profile.credentials().value(), None);
        profile.credentials().set_value(Some(auth()));
        profile.shutdown().await.unwrap();
        drop(profile);

        let profile = Profile::new(config).unwrap();
        assert_eq!(profile.credentials().value(), Some(auth()));
    }

    #[tokio::test]
    async fn test_background_and_reactivate_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let profile = Profile::new(Config::new(dir.path().to_path_buf())).unwrap();
        profile.open().await.unwrap();

        profile.background().await.unwrap();
        assert!(!profile.library().is_open());

        // The clients cache is not tied to the library lifecycle.
        profile
            .clients()
            .insert_or_update_client(&client("beta"))
            .await
            .unwrap();

        profile.reactivate().await.unwrap();
        assert!(profile.library().is_open());
    }

    #[tokio::test]
    async fn test_account_removal_clears_account_state() {
        let dir = tempfile::tempdir().unwrap();
        let profile = Profile::new(Config::new(dir.path().to_path_buf())).unwrap();
        profile.open().await.unwrap();

        profile.credentials().set_value(Some(auth()));
        profile
            .clients()
            .insert_or_update_client(&client("gamma"))
            .await
            .unwrap();
        profile.sync_all(&auth()).await.unwrap();

        profile.on_account_removed().await.unwrap();

        assert_eq!(profile.credentials().value(), None);
        assert!(profile.clients().get_client_guids().await.unwrap().is_empty());
        // Local data stays.
        assert!(profile.library().is_open());
    }

    #[tokio::test]
    async fn test_open_runs_legacy_import() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf());
        std::fs::create_dir_all(&config.data_dir).unwrap();

        let legacy = rusqlite::Connection::open(&config.legacy_db_path).unwrap();
        legacy
            .execute_batch(
                r#"
                CREATE TABLE history (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    url TEXT NOT NULL,
                    title TEXT NOT NULL DEFAULT '',
                    visited_at TEXT NOT NULL,
                    visit_count INTEGER NOT NULL DEFAULT 1
                );
                INSERT INTO history (url, title, visited_at, visit_count)
                VALUES ('https://carried.example/', 'Carried over', '2024-03-01T08:00:00+00:00', 2);
                "#,
            )
            .unwrap();
        drop(legacy);

        let profile = Profile::new(config).unwrap();
        profile.open().await.unwrap();

        let page = profile
            .library()
            .get_visits_page(i64::MAX, 0, 10, &[])
            .await
            .unwrap();
        assert_eq!(page.infos.len(), 1);
        assert_eq!(page.infos[0].url.as_str(), "https://carried.example/");
    }

    #[tokio::test]
    async fn test_sync_all_returns_both_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let profile = Profile::new(Config::new(dir.path().to_path_buf())).unwrap();
        profile.open().await.unwrap();

        let (bookmarks, history) = profile.sync_all(&auth()).await.unwrap();
        assert!(bookmarks.is_success());
        assert!(history.is_success());
    }

    #[tokio::test]
    async fn test_events_flow_through_shared_bus() {
        let dir = tempfile::tempdir().unwrap();
        let profile = Profile::new(Config::new(dir.path().to_path_buf())).unwrap();
        let mut rx = profile.events().subscribe();

        profile.open().await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), StorageEvent::EngineOpened);
    }
}
