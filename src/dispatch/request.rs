//! Dispatch request and outcome types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::daemon::AddTorrent;
use crate::health::HealthStatus;
use crate::queue::QueueEntry;

/// A download handed to the dispatcher by the acquisition layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRequest {
    /// Magnet URI or torrent link.
    pub payload: String,
    /// Category to file the torrent under.
    pub target_category: Option<String>,
    /// Save path on the daemon host.
    pub desired_path: Option<String>,
    /// When the request was created.
    pub created_at: DateTime<Utc>,
}

impl DispatchRequest {
    /// Creates a request with no category or path.
    #[must_use]
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            target_category: None,
            desired_path: None,
            created_at: Utc::now(),
        }
    }

    /// Sets the target category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.target_category = Some(category.into());
        self
    }

    /// Sets the save path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.desired_path = Some(path.into());
        self
    }

    /// Rebuilds a request from a queued entry, keeping its original options.
    #[must_use]
    pub fn from_entry(entry: &QueueEntry) -> Self {
        Self {
            payload: entry.payload.clone(),
            target_category: entry.target_category.clone(),
            desired_path: entry.desired_path.clone(),
            created_at: entry.queued_at,
        }
    }

    /// Converts into a fresh queue entry.
    #[must_use]
    pub fn to_queue_entry(&self, reason: &str) -> QueueEntry {
        let mut entry = QueueEntry::new(self.payload.clone(), reason);
        entry.target_category.clone_from(&self.target_category);
        entry.desired_path.clone_from(&self.desired_path);
        entry
    }

    pub(crate) fn as_add(&self) -> AddTorrent<'_> {
        AddTorrent {
            payload: &self.payload,
            category: self.target_category.as_deref(),
            save_path: self.desired_path.as_deref(),
        }
    }
}

/// Definite result of one `dispatch` call.
///
/// Exactly one of `delivered_to.is_some()` and `queued` holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    /// Instance that accepted the request.
    pub delivered_to: Option<String>,
    /// True when the request was written to the queue file instead.
    pub queued: bool,
    /// Health observed for each candidate, in attempt order.
    pub observed: Vec<HealthStatus>,
}

/// Counts from one queue replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    /// Entries delivered and removed.
    pub delivered: usize,
    /// Entries that failed again and had `attempts` bumped.
    pub failed: usize,
    /// Entries still queued after the pass.
    pub remaining: usize,
    /// True when another replay was already running and this one did nothing.
    pub skipped: bool,
}
