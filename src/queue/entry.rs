//! Queue entry shape as stored on disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One undelivered dispatch request.
///
/// The on-disk form is meant to be hand-editable, so optional fields may be
/// omitted and `attempts` defaults to zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Magnet URI or torrent link.
    pub payload: String,
    /// Category requested by the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_category: Option<String>,
    /// Save path requested by the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_path: Option<String>,
    /// Why the request was queued (e.g. `all_instances_unavailable`).
    pub reason: String,
    /// When the request was first queued.
    pub queued_at: DateTime<Utc>,
    /// Failed replay attempts so far.
    #[serde(default)]
    pub attempts: u32,
}

impl QueueEntry {
    /// Creates a fresh entry with zero attempts.
    #[must_use]
    pub fn new(payload: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            target_category: None,
            desired_path: None,
            reason: reason.into(),
            queued_at: Utc::now(),
            attempts: 0,
        }
    }

    /// Identity used to find this entry again after the file was re-read.
    ///
    /// `attempts` is excluded because replay bumps it in place.
    pub(crate) fn same_entry(&self, other: &Self) -> bool {
        self.payload == other.payload && self.queued_at == other.queued_at
    }
}
