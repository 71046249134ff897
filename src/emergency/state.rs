//! Emergency state and the pure transition function.
//!
//! [`transition`] decides the next state and which side effects are due; it
//! performs no IO, so the hysteresis rules are testable without a daemon.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default ratio at or below which an emergency starts.
pub const DEFAULT_FLOOR: f64 = 1.00;
/// Default ratio at or above which an emergency ends.
pub const DEFAULT_RECOVERY: f64 = 1.05;

/// Entry and exit thresholds. `floor < recovery` gives the hysteresis gap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Thresholds {
    /// Enter emergency when `ratio <= floor`.
    pub floor: f64,
    /// Leave emergency when `ratio >= recovery`.
    pub recovery: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            floor: DEFAULT_FLOOR,
            recovery: DEFAULT_RECOVERY,
        }
    }
}

/// Persisted controller state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmergencyState {
    /// True while in `EMERGENCY`.
    pub active: bool,
    /// When the current (or last) emergency started.
    pub triggered_at: Option<DateTime<Utc>>,
    /// When the last emergency ended.
    pub deactivated_at: Option<DateTime<Utc>>,
    /// New point-costing acquisitions are refused while set.
    pub acquisitions_blocked: bool,
    /// Entry pause has not run yet (no live instance at the time).
    pub pause_pending: bool,
    /// Exit resume has not run yet (no live instance at the time).
    pub resume_pending: bool,
    /// Hashes paused by the controller and not yet resumed.
    pub frozen: Vec<String>,
}

/// Work the caller must carry out after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    /// Pause every downloading torrent on the live instance.
    PauseDownloading,
    /// Refuse new point-costing acquisitions.
    BlockAcquisitions,
    /// Resume paused torrents whose download is complete.
    ResumeCompleted,
    /// Allow acquisitions again.
    UnblockAcquisitions,
}

/// What a reading did to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// `NORMAL → EMERGENCY`.
    Entered,
    /// `EMERGENCY → EMERGENCY`.
    StillActive,
    /// `EMERGENCY → NORMAL`.
    Exited,
    /// `NORMAL → NORMAL`.
    StillNormal,
    /// The reading was unusable (NaN) and nothing changed.
    Ignored,
}

/// Next state plus the side effects it requires.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// State to adopt once the effects have been attempted.
    pub next: EmergencyState,
    /// Effects to perform, in order.
    pub effects: Vec<SideEffect>,
    /// Classification of the step.
    pub kind: TransitionKind,
}

/// Computes the next state for one ratio reading.
///
/// Re-entry while active adds no new effects; the only exception is a pause
/// or resume that is still pending from an earlier step.
#[must_use]
pub fn transition(
    state: &EmergencyState,
    ratio: f64,
    thresholds: Thresholds,
    now: DateTime<Utc>,
) -> Transition {
    let mut next = state.clone();
    let mut effects = Vec::new();

    if ratio.is_nan() {
        return Transition {
            next,
            effects,
            kind: TransitionKind::Ignored,
        };
    }

    let kind = if state.active {
        if ratio >= thresholds.recovery {
            next.active = false;
            next.deactivated_at = Some(now);
            next.acquisitions_blocked = false;
            next.pause_pending = false;
            next.resume_pending = true;
            effects.extend([SideEffect::ResumeCompleted, SideEffect::UnblockAcquisitions]);
            TransitionKind::Exited
        } else {
            if state.pause_pending {
                effects.push(SideEffect::PauseDownloading);
            }
            TransitionKind::StillActive
        }
    } else if ratio <= thresholds.floor {
        next.active = true;
        next.triggered_at = Some(now);
        next.deactivated_at = None;
        next.acquisitions_blocked = true;
        next.pause_pending = true;
        next.resume_pending = false;
        effects.extend([SideEffect::PauseDownloading, SideEffect::BlockAcquisitions]);
        TransitionKind::Entered
    } else {
        if state.resume_pending {
            effects.push(SideEffect::ResumeCompleted);
        }
        TransitionKind::StillNormal
    };

    Transition {
        next,
        effects,
        kind,
    }
}
