//! Database connection and operations
//!
//! One on-disk SQLite handle per [`Database`], with every statement
//! funneled through a single [`SerialQueue`]. Concurrent callers are
//! ordered, never interleaved.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{Connection, Params, Row, Transaction};

use crate::migrations::run_migrations;
use crate::queue::SerialQueue;
use crate::{Result, StorageError};

pub struct Database {
    queue: Arc<SerialQueue>,
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Enable foreign keys
        conn.pragma_update(None, "foreign_keys", "ON")?;

        // WAL mode for better concurrent performance
        let _: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

        // Run migrations
        run_migrations(&conn)?;

        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        run_migrations(&conn)?;

        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            queue: Arc::new(SerialQueue::spawn("storage")),
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Execute a single statement, returning the number of changed rows.
    pub async fn run<P>(&self, sql: &str, params: P) -> Result<usize>
    where
        P: Params + Send + 'static,
    {
        let sql = sql.to_owned();
        let conn = Arc::clone(&self.conn);
        self.queue
            .dispatch(move || -> Result<usize> {
                let conn = conn.lock();
                Ok(conn.execute(&sql, params)?)
            })
            .await?
    }

    /// Execute a query and decode every row with `row_fn`.
    ///
    /// The prepared statement and its row cursor live entirely inside
    /// the queue slot; by the time the future resolves they have been
    /// finalized. Decode failures surface as
    /// [`StorageError::MalformedRow`].
    pub async fn run_query<P, F, T>(&self, sql: &str, params: P, row_fn: F) -> Result<Vec<T>>
    where
        P: Params + Send + 'static,
        F: Fn(&Row<'_>) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sql = sql.to_owned();
        let conn = Arc::clone(&self.conn);
        self.queue
            .dispatch(move || -> Result<Vec<T>> {
                let conn = conn.lock();
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params, |row| row_fn(row))?;

                let mut out = Vec::new();
                for row in rows {
                    out.push(row.map_err(StorageError::from_row_error)?);
                }
                Ok(out)
            })
            .await?
    }

    /// Read-style access to the raw connection, still serialized on the
    /// queue.
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        self.queue
            .dispatch(move || -> Result<T> {
                let conn = conn.lock();
                f(&conn)
            })
            .await?
    }

    /// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`.
    pub async fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        self.queue
            .dispatch(move || -> Result<T> {
                let mut conn = conn.lock();
                let tx = conn.transaction()?;
                let result = f(&tx)?;
                tx.commit()?;
                Ok(result)
            })
            .await?
    }

    /// Drain outstanding work and stop the queue thread.
    pub fn close(&self) {
        self.queue.shutdown();
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            conn: Arc::clone(&self.conn),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        let count: Vec<i64> = db
            .run_query("SELECT COUNT(*) FROM clients", (), |row| row.get(0))
            .await
            .unwrap();
        assert_eq!(count, vec![0]);
    }

    #[tokio::test]
    async fn test_run_and_query() {
        let db = Database::open_in_memory().unwrap();
        db.run(
            "INSERT INTO clients (guid, name, modified) VALUES (?1, ?2, ?3)",
            ("guid-1".to_string(), "Laptop".to_string(), 100_i64),
        )
        .await
        .unwrap();

        let names: Vec<String> = db
            .run_query("SELECT name FROM clients", (), |row| row.get(0))
            .await
            .unwrap();
        assert_eq!(names, vec!["Laptop".to_string()]);
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        let result: Result<()> = db
            .transaction(|tx| {
                tx.execute(
                    "INSERT INTO clients (guid, name, modified) VALUES ('g', 'n', 1)",
                    [],
                )?;
                Err(StorageError::MalformedRow("forced failure".to_string()))
            })
            .await;
        assert!(result.is_err());

        let count: Vec<i64> = db
            .run_query("SELECT COUNT(*) FROM clients", (), |row| row.get(0))
            .await
            .unwrap();
        assert_eq!(count, vec![0]);
    }

    #[tokio::test]
    async fn test_operations_after_close_fail() {
        let db = Database::open_in_memory().unwrap();
        db.close();

        let err = db.run("DELETE FROM clients", ()).await.unwrap_err();
        assert!(matches!(err, StorageError::QueueUnavailable(_)));
    }

    #[tokio::test]
    async fn test_malformed_row_is_classified() {
        let db = Database::open_in_memory().unwrap();
        db.run(
            "INSERT INTO clients (guid, name, modified) VALUES ('g', 'n', 1)",
            (),
        )
        .await
        .unwrap();

        // name is TEXT; decoding it as i64 is a row-shape problem, not
        // an engine failure.
        let err = db
            .run_query("SELECT name FROM clients", (), |row| row.get::<_, i64>(0))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::MalformedRow(_)));
    }
}
