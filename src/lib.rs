//! Seedwarden Core Library
//!
//! Keeps a private-tracker seedbox healthy: new downloads go to the first
//! healthy torrent daemon (or a durable queue when none answers), and the
//! account's upload ratio is watched so downloading stops before the ratio
//! falls below the tracker's floor.
//!
//! # Architecture
//!
//! - [`daemon`] - qBittorrent Web API client behind the [`daemon::DaemonApi`] trait
//! - [`health`] - authenticated health probing and VPN diagnostics
//! - [`queue`] - crash-safe JSON queue of undelivered requests
//! - [`dispatch`] - ordered failover with queue fallback and replay
//! - [`ratio`] - status page scraping and snapshot history
//! - [`emergency`] - hysteresis state machine that pauses and resumes torrents
//! - [`recovery`] / [`roi`] - projections for reporting
//! - [`warden`] - wiring and the monitor loop

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod daemon;
pub mod dispatch;
pub mod emergency;
pub mod health;
pub mod metrics;
pub mod queue;
pub mod ratio;
pub mod recovery;
pub mod roi;
pub mod warden;

mod persist;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use daemon::{ClientError, DaemonApi, Instance, InstanceDescriptor, InstanceRole, QbitClient};
pub use dispatch::{DispatchError, DispatchOutcome, DispatchRequest, Dispatcher, ReplayReport};
pub use emergency::{EmergencyController, EmergencyError, EmergencyState, Thresholds};
pub use health::{HealthProber, HealthState, HealthStatus, VpnChecker};
pub use metrics::Metrics;
pub use persist::PersistError;
pub use queue::{QueueEntry, QueueError, QueueStore};
pub use ratio::{RatioMonitor, RatioSnapshot, Sample};
pub use recovery::RecoveryEstimator;
pub use roi::{AcquisitionLedger, AcquisitionRecord, Recommendation, RoiReport, RoiTracker};
pub use warden::{TickReport, Warden, WardenError};
