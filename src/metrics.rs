//! Read-only status snapshot for the reporting layer.

use serde::{Serialize, Serializer};

/// Current ratio, emergency and transfer figures.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metrics {
    /// Latest known ratio.
    #[serde(serialize_with = "ratio_or_inf")]
    pub ratio: Option<f64>,
    /// Whether acquisitions are currently gated.
    pub emergency_active: bool,
    /// Live instance upload rate in bytes/sec.
    pub upload_rate: u64,
    /// Live instance download rate in bytes/sec.
    pub download_rate: u64,
    /// Torrents seeding on the live instance.
    pub active_uploads: usize,
    /// Torrents downloading on the live instance.
    pub active_downloads: usize,
    /// Torrents paused by the emergency controller.
    pub frozen_count: usize,
    /// Projected hours to recovery.
    pub recovery_hours: Option<f64>,
    /// Instance the figures came from.
    pub live_instance: Option<String>,
}

#[allow(clippy::ref_option)]
fn ratio_or_inf<S: Serializer>(ratio: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    match ratio {
        Some(value) if value.is_infinite() => serializer.serialize_str("inf"),
        Some(value) => serializer.serialize_some(value),
        None => serializer.serialize_none(),
    }
}
