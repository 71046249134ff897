//! Time-to-recovery projection.
//!
//! With ratio `r`, target `R`, upload rate `u` and uploaded total `U`, the
//! implied downloaded total is `D = U / r` and the upload still needed is
//! `D * (R - r)`. Hours = needed / u / 3600, capped so noisy low-throughput
//! samples cannot produce multi-year figures.

use crate::daemon::TorrentInfo;
use crate::emergency::DEFAULT_RECOVERY;
use crate::ratio::RatioSnapshot;

/// Upper bound on any reported projection.
pub const DEFAULT_MAX_HOURS: f64 = 1440.0;

/// Inputs for one projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecoveryInputs {
    /// Current ratio.
    pub ratio: f64,
    /// Current upload throughput in bytes/sec.
    pub upload_rate: u64,
    /// Uploaded bytes the ratio is based on.
    pub uploaded_total: u64,
    /// Whether an emergency is active.
    pub emergency_active: bool,
}

/// Projects hours until the ratio reaches the recovery target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecoveryEstimator {
    target: f64,
}

impl Default for RecoveryEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_RECOVERY)
    }
}

impl RecoveryEstimator {
    /// Creates an estimator for `target` with the default cap.
    #[must_use]
    pub fn new(target: f64) -> Self {
        Self { target }
    }

    /// Returns projected hours, or `None` when no projection is possible:
    /// not in emergency, already at target, nothing uploading, or no usable
    /// ratio/upload history.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn estimate_hours(&self, inputs: RecoveryInputs) -> Option<f64> {
        let RecoveryInputs {
            ratio,
            upload_rate,
            uploaded_total,
            emergency_active,
        } = inputs;

        if !emergency_active || upload_rate == 0 || uploaded_total == 0 {
            return None;
        }
        if !ratio.is_finite() || ratio <= 0.0 || ratio >= self.target {
            return None;
        }

        let downloaded = uploaded_total as f64 / ratio;
        let needed = downloaded * (self.target - ratio);
        let hours = needed / upload_rate as f64 / 3600.0;
        Some(hours.min(DEFAULT_MAX_HOURS))
    }
}

/// Uploaded total to project from: the seeding torrents' sum, or the
/// snapshot's account total when that sum is zero.
#[must_use]
pub fn uploaded_basis(seeding: &[TorrentInfo], snapshot: Option<&RatioSnapshot>) -> u64 {
    let seeded: u64 = seeding.iter().map(|torrent| torrent.uploaded).sum();
    if seeded > 0 {
        seeded
    } else {
        snapshot.map_or(0, |snapshot| snapshot.upload_bytes_total)
    }
}
