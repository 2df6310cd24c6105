//! Database migrations
//!
//! Schema for the synced-clients database: clients, remote_devices,
//! commands, tabs. Column names are part of the sync contract and must
//! stay stable across releases.

use crate::Result;
use rusqlite::Connection;

const SCHEMA_VERSION: i32 = 1;

pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<i32> {
    let result: std::result::Result<i32, _> =
        conn.query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        });

    match result {
        Ok(v) => Ok(v),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
        Err(rusqlite::Error::SqliteFailure(_, _)) => {
            // Table doesn't exist yet
            conn.execute(
                "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
                [],
            )?;
            conn.execute("INSERT INTO schema_version (version) VALUES (0)", [])?;
            Ok(0)
        }
        Err(e) => Err(e.into()),
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    tracing::info!("Running migration v1: Initial schema");

    // Clients: one row per remote sync client. `modified` is epoch
    // milliseconds from the client's own record.
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS clients (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            modified INTEGER NOT NULL,
            type TEXT,
            formfactor TEXT,
            os TEXT,
            version TEXT,
            fxaDeviceId TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_clients_fxa_device ON clients(fxaDeviceId);
    "#,
    )?;

    // Remote devices: the account-level device registry. A client whose
    // fxaDeviceId has no row here is treated as stale and hidden.
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS remote_devices (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            type TEXT,
            is_current_device INTEGER NOT NULL DEFAULT 0,
            date_created INTEGER NOT NULL,
            date_modified INTEGER NOT NULL,
            last_access_time INTEGER,
            availableCommands TEXT
        );
    "#,
    )?;

    // Outgoing commands, fanned out one row per target client.
    // UNIQUE(client_guid, value) makes re-queuing a delivered command a
    // no-op instead of a duplicate.
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS commands (
            command_id INTEGER PRIMARY KEY AUTOINCREMENT,
            client_guid TEXT NOT NULL,
            value TEXT NOT NULL,
            UNIQUE(client_guid, value)
        );

        CREATE INDEX IF NOT EXISTS idx_commands_client ON commands(client_guid);
    "#,
    )?;

    // Remote tabs, replaced wholesale per client on every sync.
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS tabs (
            client_guid TEXT NOT NULL,
            url TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            history TEXT NOT NULL DEFAULT '[]',
            last_used INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_tabs_client ON tabs(client_guid);
    "#,
    )?;

    Ok(())
}
