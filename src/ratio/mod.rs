//! Account ratio sampling.
//!
//! The ratio comes from scraping an account status page, which is fragile by
//! nature. [`RatioMonitor::sample`] therefore never fails: a fetch or parse
//! problem yields [`Sample::Stale`] carrying the previous snapshot, so callers
//! can tell "no new data" apart from a real low reading.
//!
//! - [`RatioSource`] / [`HttpRatioSource`] - page retrieval
//! - [`RatioPageParser`] - regex extraction
//! - [`SnapshotLog`] - JSON-lines history
//! - [`RatioMonitor`] - ties the three together

mod error;
mod log;
mod parser;
mod source;

pub use error::RatioError;
pub use log::SnapshotLog;
pub use parser::{ParsedRatio, RatioPageParser, parse_ratio, parse_size};
pub use source::{HttpRatioSource, PageLogin, RatioSource};

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

/// One immutable ratio reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioSnapshot {
    /// Upload/download ratio; may be infinite.
    #[serde(with = "ratio_value")]
    pub ratio: f64,
    /// When the reading was taken.
    pub captured_at: DateTime<Utc>,
    /// Cumulative uploaded bytes.
    pub upload_bytes_total: u64,
    /// Cumulative downloaded bytes.
    pub download_bytes_total: u64,
}

/// JSON has no infinity, so infinite ratios are written as `"inf"`.
mod ratio_value {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub(super) fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_infinite() {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_f64(*value)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Number(value) => Ok(value),
            Raw::Text(text) => super::parse_ratio(&text)
                .ok_or_else(|| D::Error::custom(format!("invalid ratio {text:?}"))),
        }
    }
}

/// Result of one sampling attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    /// A new reading was taken.
    Fresh(RatioSnapshot),
    /// The page could not be read; carries the previous reading, if any.
    Stale(Option<RatioSnapshot>),
}

impl Sample {
    /// Returns true for a new reading.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh(_))
    }

    /// Returns the snapshot to report, fresh or previous.
    #[must_use]
    pub fn snapshot(&self) -> Option<&RatioSnapshot> {
        match self {
            Self::Fresh(snapshot) => Some(snapshot),
            Self::Stale(previous) => previous.as_ref(),
        }
    }
}

/// Samples the ratio and keeps the latest reading.
pub struct RatioMonitor {
    source: Arc<dyn RatioSource>,
    parser: RatioPageParser,
    log: Option<SnapshotLog>,
    last: Mutex<Option<RatioSnapshot>>,
}

impl RatioMonitor {
    /// Creates a monitor with no history.
    #[must_use]
    pub fn new(source: Arc<dyn RatioSource>, parser: RatioPageParser) -> Self {
        Self {
            source,
            parser,
            log: None,
            last: Mutex::new(None),
        }
    }

    /// Appends every fresh snapshot to `log`.
    #[must_use]
    pub fn with_log(mut self, log: SnapshotLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Seeds the previous snapshot from the log.
    ///
    /// # Errors
    ///
    /// Returns [`RatioError::Log`] when the log exists but cannot be read.
    pub async fn restore(&self) -> Result<Option<RatioSnapshot>, RatioError> {
        let Some(log) = &self.log else {
            return Ok(None);
        };
        let restored = log.latest().await?;
        if let Some(snapshot) = &restored {
            info!(ratio = snapshot.ratio, captured_at = %snapshot.captured_at, "Restored last ratio snapshot");
            self.set_last(snapshot.clone());
        }
        Ok(restored)
    }

    /// Returns the most recent snapshot.
    #[must_use]
    pub fn latest(&self) -> Option<RatioSnapshot> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_last(&self, snapshot: RatioSnapshot) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
    }

    /// Fetches and parses the page.
    ///
    /// Never fails: errors are logged and reported as [`Sample::Stale`].
    #[instrument(skip(self))]
    pub async fn sample(&self) -> Sample {
        let parsed = match self.read().await {
            Ok(parsed) => parsed,
            Err(error) => {
                warn!(error = %error, "Ratio sample failed; keeping previous snapshot");
                return Sample::Stale(self.latest());
            }
        };

        let previous = self.latest();
        let snapshot = RatioSnapshot {
            ratio: parsed.ratio,
            captured_at: Utc::now(),
            upload_bytes_total: parsed
                .uploaded
                .or(previous.as_ref().map(|prev| prev.upload_bytes_total))
                .unwrap_or_default(),
            download_bytes_total: parsed
                .downloaded
                .or(previous.as_ref().map(|prev| prev.download_bytes_total))
                .unwrap_or_default(),
        };

        if let Some(log) = &self.log
            && let Err(error) = log.append(&snapshot).await
        {
            warn!(error = %error, "Could not append ratio snapshot to log");
        }
        info!(ratio = snapshot.ratio, uploaded = snapshot.upload_bytes_total, "Ratio sampled");
        self.set_last(snapshot.clone());
        Sample::Fresh(snapshot)
    }

    async fn read(&self) -> Result<ParsedRatio, RatioError> {
        let page = self.source.fetch_page().await?;
        self.parser.parse(&page)
    }
}

impl std::fmt::Debug for RatioMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RatioMonitor")
            .field("log", &self.log)
            .field("last", &self.latest())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use tempfile::TempDir;

    struct ScriptedPages(Mutex<VecDeque<Option<&'static str>>>);

    impl ScriptedPages {
        fn new(pages: Vec<Option<&'static str>>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(pages.into())))
        }
    }

    #[async_trait]
    impl RatioSource for ScriptedPages {
        async fn fetch_page(&self) -> Result<String, RatioError> {
            match self.0.lock().unwrap().pop_front().flatten() {
                Some(page) => Ok(page.to_string()),
                None => Err(RatioError::Timeout {
                    url: "http://tracker.test/user".to_string(),
                }),
            }
        }
    }

    fn monitor(pages: Vec<Option<&'static str>>) -> RatioMonitor {
        RatioMonitor::new(ScriptedPages::new(pages), RatioPageParser::standard().unwrap())
    }

    #[tokio::test]
    async fn test_fresh_sample_updates_latest() {
        let monitor = monitor(vec![Some("Uploaded: 2 GiB Downloaded: 1 GiB Ratio: 2.00")]);
        let sample = monitor.sample().await;
        assert!(sample.is_fresh());
        assert_eq!(sample.snapshot().unwrap().ratio, 2.0);
        assert_eq!(monitor.latest().unwrap().upload_bytes_total, 2 * 1024 * 1024 * 1024);
    }

    #[tokio::test]
    async fn test_parse_failure_returns_previous_not_zero() {
        let monitor = monitor(vec![
            Some("Ratio: 1.20 Uploaded: 12 GiB Downloaded: 10 GiB"),
            Some("<html>We are down for maintenance</html>"),
            None,
        ]);

        assert!(monitor.sample().await.is_fresh());

        let stale = monitor.sample().await;
        assert!(!stale.is_fresh());
        assert_eq!(stale.snapshot().unwrap().ratio, 1.2);

        let fetch_failed = monitor.sample().await;
        assert_eq!(fetch_failed, Sample::Stale(monitor.latest()));
    }

    #[tokio::test]
    async fn test_first_failure_has_no_snapshot() {
        let monitor = monitor(vec![Some("nothing useful")]);
        assert_eq!(monitor.sample().await, Sample::Stale(None));
    }

    #[tokio::test]
    async fn test_missing_counters_keep_previous_totals() {
        let monitor = monitor(vec![
            Some("Ratio: 1.10 Uploaded: 11 GiB Downloaded: 10 GiB"),
            Some("Ratio: 1.05"),
        ]);
        monitor.sample().await;
        let second = monitor.sample().await;
        let snapshot = second.snapshot().unwrap();
        assert_eq!(snapshot.ratio, 1.05);
        assert_eq!(snapshot.upload_bytes_total, 11 * 1024 * 1024 * 1024);
    }

    #[tokio::test]
    async fn test_restore_seeds_from_log() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ratio.jsonl");

        let first = monitor(vec![Some("Ratio: 0.97 Uploaded: 97 GiB Downloaded: 100 GiB")])
            .with_log(SnapshotLog::new(&path));
        first.sample().await;

        let restarted = monitor(vec![None]).with_log(SnapshotLog::new(&path));
        let restored = restarted.restore().await.unwrap().unwrap();
        assert_eq!(restored.ratio, 0.97);
        assert_eq!(restarted.sample().await, Sample::Stale(Some(restored)));
    }

    #[test]
    fn test_snapshot_ratio_inf_round_trip() {
        let snapshot = RatioSnapshot {
            ratio: f64::INFINITY,
            captured_at: Utc::now(),
            upload_bytes_total: 1,
            download_bytes_total: 0,
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"ratio\":\"inf\""));
        let back: RatioSnapshot = serde_json::from_str(&json).unwrap();
        assert!(back.ratio.is_infinite());
    }
}
