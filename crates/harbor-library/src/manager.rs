//! Library engine lifecycle
//!
//! One writer and one reader connection to the same WAL database, each
//! driven by its own serialized queue so reads never wait behind
//! writes. The open flag only flips on the writer queue; every job
//! rechecks it at execution time, so work queued against a closed
//! engine fails instead of silently running.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rusqlite::{Connection, InterruptHandle};

use harbor_storage::{ErrorReporter, EventBus, SerialQueue, Severity, StorageEvent};

use crate::error::OpenFailureKind;
use crate::schema;
use crate::sync::{LocalSyncBridge, SyncBridge};
use crate::{LibraryError, Result};

pub struct LibraryManager {
    pub(crate) path: PathBuf,
    pub(crate) writer_queue: Arc<SerialQueue>,
    pub(crate) reader_queue: Arc<SerialQueue>,
    pub(crate) state: Arc<EngineState>,
    pub(crate) events: EventBus,
    pub(crate) reporter: Arc<dyn ErrorReporter>,
    pub(crate) bridge: Arc<dyn SyncBridge>,
}

#[derive(Default)]
pub(crate) struct EngineState {
    /// Held for reading by every job for its whole slot, for writing by
    /// open/close. Cross-queue teardown therefore waits for in-flight
    /// jobs instead of pulling connections out from under them.
    is_open: RwLock<bool>,
    writer: Mutex<Option<Connection>>,
    reader: Mutex<Option<Connection>>,
    writer_interrupt: Mutex<Option<InterruptHandle>>,
    reader_interrupt: Mutex<Option<InterruptHandle>>,
}

impl LibraryManager {
    pub fn new(
        path: impl Into<PathBuf>,
        events: EventBus,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            path: path.into(),
            writer_queue: Arc::new(SerialQueue::spawn("library-writer")),
            reader_queue: Arc::new(SerialQueue::spawn("library-reader")),
            state: Arc::new(EngineState::default()),
            events,
            reporter,
            bridge: Arc::new(LocalSyncBridge),
        }
    }

    /// Swap in a real sync transport. The default bridge only records
    /// local checkpoints.
    pub fn with_sync_bridge(mut self, bridge: Arc<dyn SyncBridge>) -> Self {
        self.bridge = bridge;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        *self.state.is_open.read()
    }

    /// Open the engine: create the file if needed, apply migrations,
    /// and announce the engine. Idempotent while open.
    ///
    /// Failures are classified, reported, and leave the engine closed.
    pub async fn open(&self) -> Result<()> {
        let state = Arc::clone(&self.state);
        let path = self.path.clone();
        let events = self.events.clone();
        let reporter = Arc::clone(&self.reporter);

        self.writer_queue
            .dispatch(move || -> Result<()> {
                let mut is_open = state.is_open.write();
                if *is_open {
                    return Ok(());
                }

                match open_writer(&path) {
                    Ok(conn) => {
                        *state.writer_interrupt.lock() = Some(conn.get_interrupt_handle());
                        *state.writer.lock() = Some(conn);
                        *is_open = true;
                        tracing::info!(path = %path.display(), "Library engine opened");
                        events.post(StorageEvent::EngineOpened);
                        Ok(())
                    }
                    Err(e) => {
                        let kind = OpenFailureKind::classify(&e);
                        reporter.report(
                            "Failed to open library engine",
                            kind.tag(),
                            Severity::Error,
                            &e.to_string(),
                        );
                        Err(LibraryError::OpenFailed {
                            kind,
                            message: e.to_string(),
                        })
                    }
                }
            })
            .await?
    }

    /// Drop both connections and mark the engine closed. Safe to call
    /// when already closed. Waits for in-flight jobs rather than
    /// interrupting them; see [`LibraryManager::force_close`].
    pub async fn close(&self) -> Result<()> {
        let state = Arc::clone(&self.state);
        self.writer_queue
            .dispatch(move || {
                let mut is_open = state.is_open.write();
                let was_open = *is_open;
                *is_open = false;

                state.writer.lock().take();
                state.reader.lock().take();
                state.writer_interrupt.lock().take();
                state.reader_interrupt.lock().take();

                if was_open {
                    tracing::info!("Library engine closed");
                }
            })
            .await?;
        Ok(())
    }

    /// Lifecycle hook for foregrounding: a no-op while open.
    pub async fn reopen_if_closed(&self) -> Result<()> {
        self.open().await
    }

    /// Lifecycle hook for backgrounding: interrupt whatever is running
    /// on either connection, then close.
    pub async fn force_close(&self) -> Result<()> {
        self.interrupt_writer();
        self.interrupt_reader();
        self.close().await
    }

    /// Best-effort cancellation of the statement currently running on
    /// the writer connection, if any.
    pub fn interrupt_writer(&self) {
        if let Some(handle) = self.state.writer_interrupt.lock().as_ref() {
            handle.interrupt();
            tracing::debug!("Interrupted library writer");
        }
    }

    pub fn interrupt_reader(&self) {
        if let Some(handle) = self.state.reader_interrupt.lock().as_ref() {
            handle.interrupt();
            tracing::debug!("Interrupted library reader");
        }
    }

    /// Run `f` against the writer connection, in its queue slot.
    ///
    /// The closed check happens at execution time, not submission
    /// time: a job queued before `close()` but running after it fails
    /// with [`LibraryError::Closed`]. The connection is materialized
    /// on first use and materialization failures fail the future.
    pub async fn with_writer<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let path = self.path.clone();

        self.writer_queue
            .dispatch(move || -> Result<T> {
                let is_open = state.is_open.read();
                if !*is_open {
                    return Err(LibraryError::Closed);
                }

                let mut slot = state.writer.lock();
                if slot.is_none() {
                    let conn = open_writer(&path)?;
                    *state.writer_interrupt.lock() = Some(conn.get_interrupt_handle());
                    *slot = Some(conn);
                }
                let conn = slot.as_mut().ok_or(LibraryError::Closed)?;
                f(conn)
            })
            .await?
    }

    /// Run `f` against the read-only connection, in its queue slot.
    /// Same closed-check and lazy-materialization rules as
    /// [`LibraryManager::with_writer`].
    pub async fn with_reader<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let path = self.path.clone();

        self.reader_queue
            .dispatch(move || -> Result<T> {
                let is_open = state.is_open.read();
                if !*is_open {
                    return Err(LibraryError::Closed);
                }

                let mut slot = state.reader.lock();
                if slot.is_none() {
                    let conn = open_reader(&path)?;
                    *state.reader_interrupt.lock() = Some(conn.get_interrupt_handle());
                    *slot = Some(conn);
                }
                let conn = slot.as_ref().ok_or(LibraryError::Closed)?;
                f(conn)
            })
            .await?
    }
}

impl Clone for LibraryManager {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            writer_queue: Arc::clone(&self.writer_queue),
            reader_queue: Arc::clone(&self.reader_queue),
            state: Arc::clone(&self.state),
            events: self.events.clone(),
            reporter: Arc::clone(&self.reporter),
            bridge: Arc::clone(&self.bridge),
        }
    }
}

fn open_writer(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    let _: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    schema::init(&conn)?;
    Ok(conn)
}

/// The reader shares the writer's WAL file but can only read; writes
/// through it fail at statement time.
fn open_reader(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "query_only", "ON")?;
    Ok(conn)
}
