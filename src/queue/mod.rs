//! Durable queue for dispatch requests no instance could accept.
//!
//! The queue is a single JSON array on disk, human-readable and editable as a
//! last-resort recovery path. Every mutation is a read-modify-write of the
//! whole file under an in-process mutex, finished by an atomic replace, so
//! concurrent dispatches never lose each other's entries and a crash never
//! truncates the file.
//!
//! # Overview
//!
//! - [`QueueStore`] - file-backed store
//! - [`QueueEntry`] - one undelivered request
//! - [`QueueError`] - storage failures
//!
//! Replay claims entries one at a time: an entry is removed only after its
//! delivery succeeded, and a failed one has `attempts` bumped in place.

mod entry;
mod error;

pub use entry::QueueEntry;
pub use error::QueueError;

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::persist::{read_json, write_json_atomic};

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// File-backed FIFO of undelivered requests.
#[derive(Debug)]
pub struct QueueStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl QueueStore {
    /// Opens a store at `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Returns the queue file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<QueueEntry>> {
        Ok(read_json(&self.path).await?.unwrap_or_default())
    }

    async fn store(&self, entries: &[QueueEntry]) -> Result<()> {
        write_json_atomic(&self.path, &entries).await?;
        Ok(())
    }

    /// Appends an entry.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] when the file is unreadable, malformed, or cannot
    /// be replaced. A malformed file is left untouched.
    #[instrument(skip(self, entry), fields(payload = %entry.payload, reason = %entry.reason))]
    pub async fn enqueue(&self, entry: QueueEntry) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        entries.push(entry);
        self.store(&entries).await?;
        info!(depth = entries.len(), "Request queued");
        Ok(())
    }

    /// Returns all entries without removing them.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] when the file is unreadable or malformed.
    pub async fn peek(&self) -> Result<Vec<QueueEntry>> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    /// Returns the number of queued entries.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] when the file is unreadable or malformed.
    pub async fn len(&self) -> Result<usize> {
        Ok(self.peek().await?.len())
    }

    /// Returns true when nothing is queued.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] when the file is unreadable or malformed.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Removes and returns every entry in one step.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] when the file cannot be read or replaced; the
    /// entries stay on disk in that case.
    #[instrument(skip(self))]
    pub async fn drain(&self) -> Result<Vec<QueueEntry>> {
        let _guard = self.lock.lock().await;
        let entries = self.load().await?;
        if entries.is_empty() {
            return Ok(entries);
        }
        self.store(&[]).await?;
        info!(drained = entries.len(), "Queue drained");
        Ok(entries)
    }

    /// Removes one entry after it was delivered.
    ///
    /// Returns false when the entry was no longer present (e.g. removed by a
    /// hand edit).
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] when the file cannot be read or replaced.
    pub async fn remove(&self, entry: &QueueEntry) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        let Some(index) = entries.iter().position(|queued| queued.same_entry(entry)) else {
            debug!(payload = %entry.payload, "Entry already gone from queue");
            return Ok(false);
        };
        entries.remove(index);
        self.store(&entries).await?;
        Ok(true)
    }

    /// Increments `attempts` for an entry whose replay failed.
    ///
    /// Returns false when the entry was no longer present.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] when the file cannot be read or replaced.
    pub async fn record_failure(&self, entry: &QueueEntry) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        let Some(queued) = entries.iter_mut().find(|queued| queued.same_entry(entry)) else {
            return Ok(false);
        };
        queued.attempts = queued.attempts.saturating_add(1);
        debug!(payload = %queued.payload, attempts = queued.attempts, "Replay failed; entry kept");
        self.store(&entries).await?;
        Ok(true)
    }
}
