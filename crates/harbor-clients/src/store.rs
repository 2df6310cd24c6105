//! Clients, tabs, devices and commands persistence
//!
//! All writes are transactional; partial application is never visible.
//! Reads that join against the device registry hide clients whose
//! device record has been revoked.

use std::collections::{HashMap, HashSet};

use chrono::Utc;

use crate::{RemoteClient, RemoteDevice, RemoteTab, Result, SyncCommand};
use harbor_storage::Database;

pub struct ClientsStore {
    db: Database,
}

impl ClientsStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Upsert one client record by guid.
    pub async fn insert_or_update_client(&self, client: &RemoteClient) -> Result<usize> {
        self.insert_or_update_clients(std::slice::from_ref(client))
            .await
    }

    /// Upsert a batch of client records in one transaction.
    ///
    /// Each record is applied as an UPDATE by guid, falling back to an
    /// INSERT when no row changed. Any failure rolls the whole batch
    /// back.
    pub async fn insert_or_update_clients(&self, clients: &[RemoteClient]) -> Result<usize> {
        let records = clients.to_vec();
        let applied = self
            .db
            .transaction(move |tx| {
                let mut applied = 0usize;
                for client in &records {
                    let changed = tx.execute(
                        "UPDATE clients
                         SET name = ?2, modified = ?3, type = ?4, formfactor = ?5,
                             os = ?6, version = ?7, fxaDeviceId = ?8
                         WHERE guid = ?1",
                        rusqlite::params![
                            client.guid,
                            client.name,
                            client.modified,
                            client.kind,
                            client.formfactor,
                            client.os,
                            client.version,
                            client.fxa_device_id
                        ],
                    )?;

                    if changed == 0 {
                        tx.execute(
                            "INSERT INTO clients
                                 (guid, name, modified, type, formfactor, os, version, fxaDeviceId)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                            rusqlite::params![
                                client.guid,
                                client.name,
                                client.modified,
                                client.kind,
                                client.formfactor,
                                client.os,
                                client.version,
                                client.fxa_device_id
                            ],
                        )?;
                    }
                    applied += 1;
                }
                Ok(applied)
            })
            .await?;

        tracing::debug!(applied, "Applied remote client records");
        Ok(applied)
    }

    /// Clients that still have a live device record, newest first.
    /// Clients whose device has been revoked are hidden, not deleted.
    pub async fn get_clients(&self) -> Result<Vec<RemoteClient>> {
        let clients = self
            .db
            .run_query(
                "SELECT guid, name, modified, type, formfactor, os, version, fxaDeviceId
                 FROM clients
                 WHERE EXISTS (
                     SELECT 1 FROM remote_devices
                     WHERE remote_devices.guid = clients.fxaDeviceId
                 )
                 ORDER BY modified DESC",
                (),
                RemoteClient::from_row,
            )
            .await?;
        Ok(clients)
    }

    pub async fn get_client(&self, guid: &str) -> Result<Option<RemoteClient>> {
        let mut clients = self
            .db
            .run_query(
                "SELECT guid, name, modified, type, formfactor, os, version, fxaDeviceId
                 FROM clients WHERE guid = ?1",
                [guid.to_string()],
                RemoteClient::from_row,
            )
            .await?;
        Ok(clients.pop())
    }

    /// Every stored client guid, with no device-registry filtering.
    /// Command queuing uses this so stale clients still drain.
    pub async fn get_client_guids(&self) -> Result<HashSet<String>> {
        let guids = self
            .db
            .run_query(
                "SELECT guid FROM clients WHERE guid IS NOT NULL",
                (),
                |row| row.get(0),
            )
            .await?;
        Ok(guids.into_iter().collect())
    }

    /// Remove a client and everything hanging off it.
    pub async fn delete_client(&self, guid: &str) -> Result<()> {
        let owned = guid.to_string();
        self.db
            .transaction(move |tx| {
                tx.execute("DELETE FROM tabs WHERE client_guid = ?1", [&owned])?;
                tx.execute("DELETE FROM commands WHERE client_guid = ?1", [&owned])?;
                tx.execute("DELETE FROM clients WHERE guid = ?1", [&owned])?;
                Ok(())
            })
            .await?;

        tracing::info!(client_guid = %guid, "Deleted remote client");
        Ok(())
    }

    /// Queue `commands` for every client in `to_clients`: one row per
    /// command per target.
    ///
    /// Returns how many rows were actually inserted. A command already
    /// queued for a client inserts nothing and is logged, not failed;
    /// a statement failure rolls back the whole batch.
    pub async fn insert_commands(
        &self,
        commands: &[SyncCommand],
        to_clients: &[RemoteClient],
    ) -> Result<usize> {
        let commands = commands.to_vec();
        let guids: Vec<String> = to_clients
            .iter()
            .filter_map(|c| c.guid.clone())
            .collect();

        let inserted = self
            .db
            .transaction(move |tx| {
                let mut inserted = 0usize;
                for command in &commands {
                    for guid in &guids {
                        // The statement's changed-row count is the insert
                        // signal; the connection's rowid counter is shared
                        // with unrelated writes and cannot be trusted here.
                        let changed = match tx.execute(
                            "INSERT OR IGNORE INTO commands (client_guid, value) VALUES (?1, ?2)",
                            rusqlite::params![guid, command.value],
                        ) {
                            Ok(changed) => changed,
                            Err(e) => {
                                tracing::warn!(
                                    inserted,
                                    client_guid = %guid,
                                    error = %e,
                                    "Command insert failed; rolling back batch"
                                );
                                return Err(e.into());
                            }
                        };
                        if changed == 0 {
                            tracing::warn!(client_guid = %guid, "Command was not inserted");
                        } else {
                            inserted += 1;
                        }
                    }
                }
                Ok(inserted)
            })
            .await?;

        Ok(inserted)
    }

    /// All queued commands, grouped by target client guid. The grouping
    /// is computed per call and never persisted.
    pub async fn get_commands(&self) -> Result<HashMap<String, Vec<SyncCommand>>> {
        let rows = self
            .db
            .run_query(
                "SELECT command_id, client_guid, value FROM commands ORDER BY command_id",
                (),
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .await?;

        let mut grouped: HashMap<String, Vec<SyncCommand>> = HashMap::new();
        for (id, client_guid, value) in rows {
            grouped.entry(client_guid.clone()).or_default().push(SyncCommand {
                id: Some(id),
                value,
                client_guid: Some(client_guid),
            });
        }
        Ok(grouped)
    }

    /// Drop a client's queued commands after delivery.
    pub async fn delete_commands(&self, client_guid: &str) -> Result<usize> {
        let deleted = self
            .db
            .run(
                "DELETE FROM commands WHERE client_guid = ?1",
                [client_guid.to_string()],
            )
            .await?;
        tracing::debug!(client_guid = %client_guid, deleted, "Cleared delivered commands");
        Ok(deleted)
    }

    pub async fn delete_all_commands(&self) -> Result<usize> {
        Ok(self.db.run("DELETE FROM commands", ()).await?)
    }

    /// Replace a client's tab snapshot in one transaction.
    pub async fn insert_or_update_tabs_for_client(
        &self,
        client_guid: &str,
        tabs: &[RemoteTab],
    ) -> Result<usize> {
        let guid = client_guid.to_string();
        let mut rows = Vec::with_capacity(tabs.len());
        for tab in tabs {
            rows.push((
                tab.url.to_string(),
                tab.title.clone(),
                serde_json::to_string(&tab.history)?,
                tab.last_used,
            ));
        }

        let inserted = self
            .db
            .transaction(move |tx| {
                tx.execute("DELETE FROM tabs WHERE client_guid = ?1", [&guid])?;

                let mut inserted = 0usize;
                for (url, title, history, last_used) in &rows {
                    inserted += tx.execute(
                        "INSERT INTO tabs (client_guid, url, title, history, last_used)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        rusqlite::params![guid, url, title, history, last_used],
                    )?;
                }
                Ok(inserted)
            })
            .await?;

        Ok(inserted)
    }

    pub async fn get_tabs_for_client(&self, client_guid: &str) -> Result<Vec<RemoteTab>> {
        let tabs = self
            .db
            .run_query(
                "SELECT client_guid, url, title, history, last_used
                 FROM tabs WHERE client_guid = ?1
                 ORDER BY last_used DESC",
                [client_guid.to_string()],
                RemoteTab::from_row,
            )
            .await?;
        Ok(tabs)
    }

    pub async fn get_all_tabs(&self) -> Result<Vec<RemoteTab>> {
        let tabs = self
            .db
            .run_query(
                "SELECT client_guid, url, title, history, last_used
                 FROM tabs ORDER BY last_used DESC",
                (),
                RemoteTab::from_row,
            )
            .await?;
        Ok(tabs)
    }

    /// Replace the whole device registry atomically.
    ///
    /// Records without an id or type, and the record for this device,
    /// are dropped first. Every inserted row shares one creation
    /// timestamp so a batch reads as a single registry snapshot.
    pub async fn replace_remote_devices(&self, devices: &[RemoteDevice]) -> Result<()> {
        let now = Utc::now().timestamp_millis();

        let mut rows = Vec::with_capacity(devices.len());
        for device in devices {
            let (id, kind) = match (&device.id, &device.kind) {
                (Some(id), Some(kind)) if !device.is_current_device => {
                    (id.clone(), kind.clone())
                }
                _ => {
                    tracing::debug!(name = %device.name, "Skipping unusable remote device record");
                    continue;
                }
            };

            let commands_json = device
                .available_commands
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            rows.push((
                id,
                device.name.clone(),
                kind,
                device.is_current_device,
                device.last_access_time,
                commands_json,
            ));
        }

        let kept = rows.len();
        self.db
            .transaction(move |tx| {
                tx.execute("DELETE FROM remote_devices", [])?;
                for (id, name, kind, is_current, last_access, commands) in &rows {
                    tx.execute(
                        "INSERT INTO remote_devices
                             (guid, name, type, is_current_device, date_created,
                              date_modified, last_access_time, availableCommands)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                        rusqlite::params![id, name, kind, is_current, now, now, last_access, commands],
                    )?;
                }
                Ok(())
            })
            .await?;

        tracing::debug!(total = devices.len(), kept, "Replaced remote devices");
        Ok(())
    }

    pub async fn get_remote_devices(&self) -> Result<Vec<RemoteDevice>> {
        let devices = self
            .db
            .run_query(
                "SELECT guid, name, type, is_current_device, last_access_time, availableCommands
                 FROM remote_devices ORDER BY name",
                (),
                RemoteDevice::from_row,
            )
            .await?;
        Ok(devices)
    }

    /// Local-only wipe of everything this store owns, used when the
    /// account is removed from the device.
    pub async fn clear(&self) -> Result<()> {
        self.db
            .transaction(|tx| {
                tx.execute("DELETE FROM tabs", [])?;
                tx.execute("DELETE FROM commands", [])?;
                tx.execute("DELETE FROM clients", [])?;
                tx.execute("DELETE FROM remote_devices", [])?;
                Ok(())
            })
            .await?;

        tracing::info!("Cleared all remote client state");
        Ok(())
    }
}

impl Clone for ClientsStore {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn client(guid: &str, name: &str, device_id: Option<&str>) -> RemoteClient {
        RemoteClient {
            guid: Some(guid.to_string()),
            name: name.to_string(),
            modified: 1_700_000_000_000,
            kind: Some("desktop".to_string()),
            formfactor: None,
            os: Some("linux".to_string()),
            version: Some("1.0".to_string()),
            fxa_device_id: device_id.map(|d| d.to_string()),
        }
    }

    fn device(id: &str, name: &str) -> RemoteDevice {
        RemoteDevice {
            id: Some(id.to_string()),
            name: name.to_string(),
            kind: Some("desktop".to_string()),
            is_current_device: false,
            last_access_time: Some(1_700_000_000_000),
            available_commands: None,
        }
    }

    fn tab(client_guid: &str, url: &str, last_used: i64) -> RemoteTab {
        RemoteTab {
            client_guid: client_guid.to_string(),
            url: Url::parse(url).unwrap(),
            title: "A page".to_string(),
            history: vec![url.to_string()],
            last_used,
        }
    }

    fn store() -> (Database, ClientsStore) {
        let db = Database::open_in_memory().unwrap();
        let store = ClientsStore::new(db.clone());
        (db, store)
    }

    #[tokio::test]
    async fn test_insert_or_update_is_idempotent() {
        let (_db, store) = store();

        store
            .insert_or_update_client(&client("c1", "Laptop", None))
            .await
            .unwrap();
        store
            .insert_or_update_client(&client("c1", "Laptop (renamed)", None))
            .await
            .unwrap();

        let guids = store.get_client_guids().await.unwrap();
        assert_eq!(guids.len(), 1);

        let stored = store.get_client("c1").await.unwrap().unwrap();
        assert_eq!(stored.name, "Laptop (renamed)");
    }

    #[tokio::test]
    async fn test_get_clients_hides_orphans_but_guids_do_not() {
        let (_db, store) = store();

        store
            .insert_or_update_clients(&[
                client("c1", "Live", Some("d1")),
                client("c2", "Revoked", Some("d2")),
                client("c3", "Never enrolled", None),
            ])
            .await
            .unwrap();
        store
            .replace_remote_devices(&[device("d1", "Live device")])
            .await
            .unwrap();

        let visible = store.get_clients().await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].guid.as_deref(), Some("c1"));

        let guids = store.get_client_guids().await.unwrap();
        assert_eq!(guids.len(), 3);
        assert!(guids.contains("c2"));
        assert!(guids.contains("c3"));
    }

    #[tokio::test]
    async fn test_command_fan_out_cardinality() {
        let (_db, store) = store();
        let targets = [client("c1", "One", None), client("c2", "Two", None)];
        store.insert_or_update_clients(&targets).await.unwrap();

        let url = Url::parse("https://example.com/a").unwrap();
        let commands = [
            SyncCommand::display_uri(&url, "me", "A"),
            SyncCommand::wipe_engine("bookmarks"),
        ];

        let inserted = store.insert_commands(&commands, &targets).await.unwrap();
        assert_eq!(inserted, 4);

        let grouped = store.get_commands().await.unwrap();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["c1"].len(), 2);
        assert_eq!(grouped["c2"].len(), 2);
    }

    #[tokio::test]
    async fn test_requeued_command_inserts_nothing() {
        let (_db, store) = store();
        let targets = [client("c1", "One", None)];
        store.insert_or_update_clients(&targets).await.unwrap();

        let command = SyncCommand::new(r#"{"command":"logout","args":[]}"#);
        assert_eq!(
            store.insert_commands(&[command.clone()], &targets).await.unwrap(),
            1
        );
        assert_eq!(
            store.insert_commands(&[command], &targets).await.unwrap(),
            0
        );

        let grouped = store.get_commands().await.unwrap();
        assert_eq!(grouped["c1"].len(), 1);
    }

    #[tokio::test]
    async fn test_insert_count_matches_stored_commands() {
        let (_db, store) = store();
        let targets = [client("c1", "One", None)];
        store.insert_or_update_clients(&targets).await.unwrap();

        // The upsert above wrote on the same connection; the fan-out
        // count must still agree with what get_commands reads back.
        let inserted = store
            .insert_commands(&[SyncCommand::wipe_engine("history")], &targets)
            .await
            .unwrap();
        assert_eq!(inserted, 1);

        let grouped = store.get_commands().await.unwrap();
        assert_eq!(grouped["c1"].len(), inserted);
    }

    #[tokio::test]
    async fn test_delete_client_cascades_to_its_rows_only() {
        let (_db, store) = store();
        let c1 = client("c1", "One", None);
        let c2 = client("c2", "Two", None);
        store
            .insert_or_update_clients(&[c1.clone(), c2.clone()])
            .await
            .unwrap();

        store
            .insert_or_update_tabs_for_client(
                "c1",
                &[
                    tab("c1", "https://example.com/1", 10),
                    tab("c1", "https://example.com/2", 20),
                ],
            )
            .await
            .unwrap();
        store
            .insert_or_update_tabs_for_client("c2", &[tab("c2", "https://example.com/3", 30)])
            .await
            .unwrap();
        store
            .insert_commands(&[SyncCommand::new("{}")], &[c1, c2])
            .await
            .unwrap();

        store.delete_client("c1").await.unwrap();

        assert!(store.get_tabs_for_client("c1").await.unwrap().is_empty());
        assert_eq!(store.get_tabs_for_client("c2").await.unwrap().len(), 1);

        let grouped = store.get_commands().await.unwrap();
        assert!(!grouped.contains_key("c1"));
        assert_eq!(grouped["c2"].len(), 1);

        let guids = store.get_client_guids().await.unwrap();
        assert_eq!(guids.len(), 1);
    }

    #[tokio::test]
    async fn test_tab_snapshot_is_replaced_wholesale() {
        let (_db, store) = store();

        store
            .insert_or_update_tabs_for_client(
                "c1",
                &[
                    tab("c1", "https://example.com/1", 10),
                    tab("c1", "https://example.com/2", 20),
                    tab("c1", "https://example.com/3", 30),
                ],
            )
            .await
            .unwrap();
        store
            .insert_or_update_tabs_for_client("c1", &[tab("c1", "https://example.com/9", 90)])
            .await
            .unwrap();

        let tabs = store.get_tabs_for_client("c1").await.unwrap();
        assert_eq!(tabs.len(), 1);
        assert_eq!(tabs[0].url.as_str(), "https://example.com/9");
    }

    #[tokio::test]
    async fn test_replace_devices_filters_and_shares_timestamp() {
        let (db, store) = store();

        let mut current = device("d-self", "This device");
        current.is_current_device = true;
        let mut no_id = device("unused", "Corrupt");
        no_id.id = None;

        store
            .replace_remote_devices(&[device("d1", "One"), device("d2", "Two"), current, no_id])
            .await
            .unwrap();

        let devices = store.get_remote_devices().await.unwrap();
        assert_eq!(devices.len(), 2);

        let stamps: Vec<i64> = db
            .run_query("SELECT date_created FROM remote_devices", (), |row| {
                row.get(0)
            })
            .await
            .unwrap();
        assert_eq!(stamps.len(), 2);
        assert_eq!(stamps[0], stamps[1]);
    }

    #[tokio::test]
    async fn test_replace_devices_failure_leaves_previous_registry() {
        let (_db, store) = store();

        store
            .replace_remote_devices(&[device("d1", "Original")])
            .await
            .unwrap();

        // A duplicated guid violates the primary key mid-batch; the
        // delete-then-insert must roll back as one unit.
        let result = store
            .replace_remote_devices(&[device("d2", "New"), device("d2", "New again")])
            .await;
        assert!(result.is_err());

        let devices = store.get_remote_devices().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name, "Original");
    }

    #[tokio::test]
    async fn test_clear_wipes_all_owned_state() {
        let (_db, store) = store();
        let c1 = client("c1", "One", Some("d1"));
        store.insert_or_update_client(&c1).await.unwrap();
        store
            .replace_remote_devices(&[device("d1", "One")])
            .await
            .unwrap();
        store
            .insert_or_update_tabs_for_client("c1", &[tab("c1", "https://example.com", 1)])
            .await
            .unwrap();
        store
            .insert_commands(&[SyncCommand::new("{}")], &[c1])
            .await
            .unwrap();

        store.clear().await.unwrap();

        assert!(store.get_client_guids().await.unwrap().is_empty());
        assert!(store.get_all_tabs().await.unwrap().is_empty());
        assert!(store.get_commands().await.unwrap().is_empty());
        assert!(store.get_remote_devices().await.unwrap().is_empty());
    }
}
