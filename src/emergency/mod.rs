//! Ratio emergency controller.
//!
//! `NORMAL → EMERGENCY` when a fresh reading is at or below the floor:
//! downloading torrents on the live instance are paused and point-costing
//! acquisitions are blocked. `EMERGENCY → NORMAL` once a fresh reading reaches
//! the recovery threshold: completed paused torrents are resumed and the block
//! is lifted. Stale readings never move the state machine.
//!
//! State is persisted so a restart mid-emergency keeps the block in place.

mod state;

pub use state::{
    DEFAULT_FLOOR, DEFAULT_RECOVERY, EmergencyState, SideEffect, Thresholds, Transition,
    TransitionKind, transition,
};

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::daemon::{DaemonApi, TorrentFilter, TorrentInfo};
use crate::persist::{PersistError, read_json, write_json_atomic};
use crate::ratio::Sample;

/// Errors from the emergency controller.
#[derive(Debug, Error)]
pub enum EmergencyError {
    /// A point-costing acquisition was attempted during an emergency.
    #[error(
        "acquisitions are blocked: ratio emergency active since {}\n  Suggestion: Wait for the ratio to recover or acquire only freeleech content",
        describe_since(.since.as_ref())
    )]
    AcquisitionBlocked {
        /// When the emergency started.
        since: Option<DateTime<Utc>>,
    },

    /// The state file could not be read or written.
    #[error("emergency state unavailable: {0}")]
    State(#[from] PersistError),
}

fn describe_since(since: Option<&DateTime<Utc>>) -> String {
    since.map_or_else(|| "an unknown time".to_string(), |at| at.to_rfc3339())
}

/// Success/failure counts for one pause or resume batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Hashes the daemon accepted.
    pub succeeded: Vec<String>,
    /// Number of per-torrent calls that failed.
    pub failed: usize,
}

/// What one observation did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObserveReport {
    /// State-machine step; `None` for a stale sample.
    pub transition: Option<TransitionKind>,
    /// Effects that were due.
    pub effects: Vec<SideEffect>,
    /// Entry pause results, when a pause ran.
    pub paused: Option<BatchReport>,
    /// Exit resume results, when a resume ran.
    pub resumed: Option<BatchReport>,
    /// Emergency flag after the observation.
    pub active: bool,
}

/// Drives [`transition`] and executes its side effects.
#[derive(Debug)]
pub struct EmergencyController {
    thresholds: Thresholds,
    path: Option<PathBuf>,
    state: RwLock<EmergencyState>,
    observe_lock: tokio::sync::Mutex<()>,
}

impl EmergencyController {
    /// Creates a controller whose state lives only in memory.
    #[must_use]
    pub fn in_memory(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            path: None,
            state: RwLock::new(EmergencyState::default()),
            observe_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Loads persisted state from `path`, starting `NORMAL` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`EmergencyError::State`] when the file is unreadable or
    /// malformed.
    pub async fn load(path: impl Into<PathBuf>, thresholds: Thresholds) -> Result<Self, EmergencyError> {
        let path = path.into();
        let state: EmergencyState = read_json(&path).await?.unwrap_or_default();
        if state.active {
            info!(
                triggered_at = ?state.triggered_at,
                frozen = state.frozen.len(),
                "Resuming with ratio emergency active"
            );
        }
        Ok(Self {
            thresholds,
            path: Some(path),
            state: RwLock::new(state),
            observe_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Returns the configured thresholds.
    #[must_use]
    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Returns the state file location, if persisted.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns a copy of the current state.
    #[must_use]
    pub fn state(&self) -> EmergencyState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Gate the acquisition layer consults before any point-costing request.
    #[must_use]
    pub fn is_emergency_active(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .active
    }

    /// Returns `Err` while acquisitions are blocked.
    ///
    /// # Errors
    ///
    /// Returns [`EmergencyError::AcquisitionBlocked`] during an emergency.
    pub fn guard_acquisition(&self) -> Result<(), EmergencyError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if state.acquisitions_blocked {
            return Err(EmergencyError::AcquisitionBlocked {
                since: state.triggered_at,
            });
        }
        Ok(())
    }

    /// Feeds one sample through the state machine.
    ///
    /// `live` is the instance to pause/resume on; when `None` the affected
    /// batch stays pending and is retried on a later observation.
    ///
    /// # Errors
    ///
    /// Returns [`EmergencyError::State`] when the new state cannot be
    /// persisted. The in-memory state is still updated in that case so the
    /// acquisition gate reflects the reading.
    #[instrument(skip(self, sample, live), fields(fresh = sample.is_fresh()))]
    pub async fn observe(
        &self,
        sample: &Sample,
        live: Option<&dyn DaemonApi>,
    ) -> Result<ObserveReport, EmergencyError> {
        let Sample::Fresh(snapshot) = sample else {
            return Ok(ObserveReport {
                transition: None,
                effects: Vec::new(),
                paused: None,
                resumed: None,
                active: self.is_emergency_active(),
            });
        };

        let _guard = self.observe_lock.lock().await;
        let current = self.state();
        let Transition {
            mut next,
            effects,
            kind,
        } = transition(&current, snapshot.ratio, self.thresholds, Utc::now());

        match kind {
            TransitionKind::Entered => warn!(
                ratio = snapshot.ratio,
                floor = self.thresholds.floor,
                "Ratio emergency triggered; blocking acquisitions"
            ),
            TransitionKind::Exited => info!(
                ratio = snapshot.ratio,
                recovery = self.thresholds.recovery,
                "Ratio recovered; leaving emergency"
            ),
            _ => {}
        }

        let mut paused = None;
        let mut resumed = None;
        for effect in &effects {
            match effect {
                SideEffect::PauseDownloading => {
                    if let Some(report) = run_batch(live, Batch::Pause).await {
                        for hash in &report.succeeded {
                            if !next.frozen.contains(hash) {
                                next.frozen.push(hash.clone());
                            }
                        }
                        next.pause_pending = false;
                        paused = Some(report);
                    }
                }
                SideEffect::ResumeCompleted => {
                    if let Some(report) = run_batch(live, Batch::Resume).await {
                        next.frozen.retain(|hash| !report.succeeded.contains(hash));
                        next.resume_pending = false;
                        resumed = Some(report);
                    }
                }
                SideEffect::BlockAcquisitions => info!("Point-costing acquisitions blocked"),
                SideEffect::UnblockAcquisitions => info!("Point-costing acquisitions allowed"),
            }
        }

        let active = next.active;
        let changed = next != current;
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = next.clone();
        if changed && let Some(path) = &self.path {
            write_json_atomic(path, &next).await?;
        }

        Ok(ObserveReport {
            transition: Some(kind),
            effects,
            paused,
            resumed,
            active,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Batch {
    Pause,
    Resume,
}

/// Runs one batch; `None` means it could not start and stays pending.
async fn run_batch(live: Option<&dyn DaemonApi>, batch: Batch) -> Option<BatchReport> {
    let Some(api) = live else {
        warn!(?batch, "No live instance; batch deferred");
        return None;
    };

    let candidates: Result<Vec<TorrentInfo>, _> = match batch {
        // seeding and completed torrents keep uploading; the daemon's
        // downloading filter also returns downloads the user already paused
        Batch::Pause => api
            .list(TorrentFilter::Downloading)
            .await
            .map(|torrents| torrents.into_iter().filter(|t| !t.is_paused()).collect()),
        Batch::Resume => api
            .list(TorrentFilter::Completed)
            .await
            .map(|torrents| torrents.into_iter().filter(|t| t.is_paused()).collect()),
    };
    let torrents = match candidates {
        Ok(torrents) => torrents,
        Err(error) => {
            warn!(?batch, error = %error, "Could not list torrents; batch deferred");
            return None;
        }
    };

    let mut report = BatchReport::default();
    for torrent in torrents {
        let result = match batch {
            Batch::Pause => api.pause(&torrent.hash).await,
            Batch::Resume => api.resume(&torrent.hash).await,
        };
        match result {
            Ok(()) => {
                info!(?batch, hash = %torrent.hash, name = %torrent.name, "Torrent updated");
                report.succeeded.push(torrent.hash);
            }
            Err(error) => {
                warn!(?batch, hash = %torrent.hash, error = %error, "Torrent update failed; continuing");
                report.failed += 1;
            }
        }
    }
    info!(
        ?batch,
        succeeded = report.succeeded.len(),
        failed = report.failed,
        "Batch finished"
    );
    Some(report)
}
