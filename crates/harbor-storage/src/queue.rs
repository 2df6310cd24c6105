//! Serialized execution queues
//!
//! Each queue owns one dedicated OS thread and runs submitted jobs
//! strictly in submission order. Callers get the job's return value
//! back through a oneshot channel, so async code can await blocking
//! SQLite work without holding a runtime thread.

use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::{Result, StorageError};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A FIFO job queue backed by a single worker thread.
///
/// Jobs never run concurrently with each other. Once the worker thread
/// has exited (after [`SerialQueue::shutdown`], or because a job
/// panicked), every later dispatch fails with
/// [`StorageError::QueueUnavailable`] instead of hanging.
pub struct SerialQueue {
    name: String,
    tx: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SerialQueue {
    pub fn spawn(name: &str) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        let worker = thread::spawn(move || {
            while let Some(job) = rx.blocking_recv() {
                job();
            }
        });

        Self {
            name: name.to_string(),
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Run `f` on the queue thread and await its result.
    ///
    /// Dropping the returned future does not cancel the job; it will
    /// still run in its submitted slot.
    pub async fn dispatch<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            // The receiver may be gone; the job still ran.
            let _ = done_tx.send(f());
        });

        let sender = match self.tx.lock().as_ref() {
            Some(tx) => tx.clone(),
            None => return Err(StorageError::QueueUnavailable(self.name.clone())),
        };

        sender
            .send(job)
            .map_err(|_| StorageError::QueueUnavailable(self.name.clone()))?;

        done_rx
            .await
            .map_err(|_| StorageError::QueueUnavailable(self.name.clone()))
    }

    /// Stop accepting jobs, drain everything already queued, and join
    /// the worker thread.
    pub fn shutdown(&self) {
        self.tx.lock().take();
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                tracing::warn!(queue = %self.name, "Queue worker exited from a panicked job");
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
