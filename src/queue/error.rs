//! Error types for queue operations.

use thiserror::Error;

use crate::persist::PersistError;

/// Errors from the durable queue store.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue file could not be read, parsed or replaced.
    #[error("queue file unavailable: {0}")]
    Storage(#[from] PersistError),
}

impl QueueError {
    /// Returns true when the file exists but holds malformed JSON.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Storage(PersistError::Malformed { .. }))
    }
}
