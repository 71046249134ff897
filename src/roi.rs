//! Point return-on-investment tracking.
//!
//! Points are earned by uploading and spent on paid acquisitions. Earnings are
//! estimated from uploaded bytes with a fixed points-per-GiB constant; spending
//! is summed from the acquisition ledger file.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use crate::persist::{PersistError, read_json, write_json_atomic};

/// Conservative default earn rate.
pub const DEFAULT_POINTS_PER_GB: f64 = 1.0;

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Errors from the acquisition ledger.
#[derive(Debug, Error)]
pub enum RoiError {
    /// Ledger file could not be read or written.
    #[error("acquisition ledger unavailable: {0}")]
    Ledger(#[from] PersistError),

    /// A cost was negative or not a number.
    #[error("invalid acquisition cost {cost}\n  Suggestion: Use a non-negative point amount")]
    InvalidCost {
        /// Rejected value.
        cost: f64,
    },
}

/// Tiered advice derived from the ROI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// Nothing has been spent yet.
    NoPaidAcquisitions,
    /// `roi < 0.5`
    CriticallyReduce,
    /// `roi < 1.0`
    Reduce,
    /// `roi < 2.0`
    Maintain,
    /// `roi < 3.0`
    CanIncrease,
    /// `roi >= 3.0`
    CanSignificantlyIncrease,
}

impl Recommendation {
    /// Returns the report label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoPaidAcquisitions => "no_paid_acquisitions",
            Self::CriticallyReduce => "critically_reduce",
            Self::Reduce => "reduce",
            Self::Maintain => "maintain",
            Self::CanIncrease => "can_increase",
            Self::CanSignificantlyIncrease => "can_significantly_increase",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Ordered by exclusive upper bound.
const TIERS: [(f64, Recommendation); 4] = [
    (0.5, Recommendation::CriticallyReduce),
    (1.0, Recommendation::Reduce),
    (2.0, Recommendation::Maintain),
    (3.0, Recommendation::CanIncrease),
];

/// Looks up the tier for an ROI value.
#[must_use]
pub fn recommend(roi: f64) -> Recommendation {
    TIERS
        .iter()
        .find(|(upper, _)| roi < *upper)
        .map_or(Recommendation::CanSignificantlyIncrease, |(_, tier)| *tier)
}

/// Earned vs. spent summary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RoiReport {
    /// Points estimated from upload.
    pub earned_estimate: f64,
    /// Points spent on acquisitions.
    pub spent_total: f64,
    /// `earned / spent`, or 0 when nothing was spent.
    pub roi: f64,
    /// Tier for `roi`.
    pub recommendation: Recommendation,
}

/// Builds a report from uploaded bytes and spent points.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn roi_report(uploaded_bytes: u64, spent_total: f64, points_per_gb: f64) -> RoiReport {
    let earned_estimate = uploaded_bytes as f64 / BYTES_PER_GIB * points_per_gb;
    if spent_total <= 0.0 {
        return RoiReport {
            earned_estimate,
            spent_total: 0.0,
            roi: 0.0,
            recommendation: Recommendation::NoPaidAcquisitions,
        };
    }
    let roi = earned_estimate / spent_total;
    RoiReport {
        earned_estimate,
        spent_total,
        roi,
        recommendation: recommend(roi),
    }
}

/// One acquisition, paid or free.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionRecord {
    /// What was acquired (magnet, link or title).
    pub payload: String,
    /// Points spent; `None` for free acquisitions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    /// When it was recorded.
    pub acquired_at: DateTime<Utc>,
}

impl AcquisitionRecord {
    /// Creates a record stamped now.
    #[must_use]
    pub fn new(payload: impl Into<String>, cost: Option<f64>) -> Self {
        Self {
            payload: payload.into(),
            cost,
            acquired_at: Utc::now(),
        }
    }

    /// Returns true when the record cost points.
    #[must_use]
    pub fn is_paid(&self) -> bool {
        self.cost.is_some_and(|cost| cost > 0.0)
    }
}

/// JSON file of acquisition records.
#[derive(Debug)]
pub struct AcquisitionLedger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AcquisitionLedger {
    /// Uses `path` as the ledger file; created on first record.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Returns the ledger location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a record.
    ///
    /// # Errors
    ///
    /// Returns [`RoiError::InvalidCost`] for a negative or non-finite cost and
    /// [`RoiError::Ledger`] when the file cannot be updated.
    pub async fn record(&self, record: AcquisitionRecord) -> Result<(), RoiError> {
        if let Some(cost) = record.cost
            && (!cost.is_finite() || cost < 0.0)
        {
            return Err(RoiError::InvalidCost { cost });
        }
        let _guard = self.lock.lock().await;
        let mut records: Vec<AcquisitionRecord> = read_json(&self.path).await?.unwrap_or_default();
        info!(payload = %record.payload, cost = ?record.cost, "Acquisition recorded");
        records.push(record);
        write_json_atomic(&self.path, &records).await?;
        Ok(())
    }

    /// Returns every record.
    ///
    /// # Errors
    ///
    /// Returns [`RoiError::Ledger`] when the file is unreadable or malformed.
    pub async fn records(&self) -> Result<Vec<AcquisitionRecord>, RoiError> {
        let _guard = self.lock.lock().await;
        Ok(read_json(&self.path).await?.unwrap_or_default())
    }

    /// Sums the cost of every record.
    ///
    /// # Errors
    ///
    /// Returns [`RoiError::Ledger`] when the file is unreadable or malformed.
    pub async fn spent_total(&self) -> Result<f64, RoiError> {
        Ok(self
            .records()
            .await?
            .iter()
            .filter_map(|record| record.cost)
            .sum())
    }
}

/// Combines the ledger with an earn rate.
#[derive(Debug)]
pub struct RoiTracker {
    ledger: AcquisitionLedger,
    points_per_gb: f64,
}

impl RoiTracker {
    /// Creates a tracker.
    #[must_use]
    pub fn new(ledger: AcquisitionLedger, points_per_gb: f64) -> Self {
        Self {
            ledger,
            points_per_gb,
        }
    }

    /// Returns the underlying ledger.
    #[must_use]
    pub fn ledger(&self) -> &AcquisitionLedger {
        &self.ledger
    }

    /// Builds the report for `uploaded_bytes` of upload.
    ///
    /// # Errors
    ///
    /// Returns [`RoiError::Ledger`] when the ledger cannot be read.
    pub async fn report(&self, uploaded_bytes: u64) -> Result<RoiReport, RoiError> {
        let spent = self.ledger.spent_total().await?;
        Ok(roi_report(uploaded_bytes, spent, self.points_per_gb))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const GIB: u64 = 1024 * 1024 * 1024;

    #[test]
    fn test_nothing_spent_reports_zero_roi() {
        let report = roi_report(500 * GIB, 0.0, DEFAULT_POINTS_PER_GB);
        assert_eq!(report.roi, 0.0);
        assert_eq!(report.recommendation, Recommendation::NoPaidAcquisitions);
        assert_eq!(report.earned_estimate, 500.0);
    }

    #[test]
    fn test_three_to_one_is_top_tier() {
        let report = roi_report(300 * GIB, 100.0, 1.0);
        assert_eq!(report.roi, 3.0);
        assert_eq!(report.recommendation, Recommendation::CanSignificantlyIncrease);
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(recommend(0.0), Recommendation::CriticallyReduce);
        assert_eq!(recommend(0.49), Recommendation::CriticallyReduce);
        assert_eq!(recommend(0.5), Recommendation::Reduce);
        assert_eq!(recommend(1.0), Recommendation::Maintain);
        assert_eq!(recommend(2.0), Recommendation::CanIncrease);
        assert_eq!(recommend(2.99), Recommendation::CanIncrease);
        assert_eq!(recommend(f64::INFINITY), Recommendation::CanSignificantlyIncrease);
    }

    #[test]
    fn test_recommendation_serializes_label() {
        let json = serde_json::to_string(&Recommendation::NoPaidAcquisitions).unwrap();
        assert_eq!(json, "\"no_paid_acquisitions\"");
        assert_eq!(Recommendation::CriticallyReduce.to_string(), "critically_reduce");
    }

    #[tokio::test]
    async fn test_ledger_sums_costs_and_skips_free() {
        let dir = TempDir::new().unwrap();
        let tracker = RoiTracker::new(AcquisitionLedger::new(dir.path().join("ledger.json")), 1.0);

        tracker
            .ledger()
            .record(AcquisitionRecord::new("book-a", Some(40.0)))
            .await
            .unwrap();
        tracker
            .ledger()
            .record(AcquisitionRecord::new("freeleech", None))
            .await
            .unwrap();
        tracker
            .ledger()
            .record(AcquisitionRecord::new("book-b", Some(60.0)))
            .await
            .unwrap();

        assert_eq!(tracker.ledger().records().await.unwrap().len(), 3);
        let report = tracker.report(150 * GIB).await.unwrap();
        assert_eq!(report.spent_total, 100.0);
        assert_eq!(report.roi, 1.5);
        assert_eq!(report.recommendation, Recommendation::Maintain);
    }

    #[tokio::test]
    async fn test_ledger_rejects_negative_cost() {
        let dir = TempDir::new().unwrap();
        let ledger = AcquisitionLedger::new(dir.path().join("ledger.json"));
        let err = ledger
            .record(AcquisitionRecord::new("bad", Some(-1.0)))
            .await
            .unwrap_err();
        assert!(matches!(err, RoiError::InvalidCost { .. }));
        assert!(!ledger.path().exists());
    }
}
