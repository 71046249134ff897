//! Runtime wiring and the entry points other layers call.
//!
//! [`Warden`] owns one of each component and exposes `dispatch`,
//! `is_emergency_active` and `get_metrics`, plus the monitor cycle
//! ([`Warden::tick`]) and its loop ([`Warden::run`]).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::{Config, ConfigError};
use crate::daemon::{Instance, TorrentFilter, TorrentInfo, TransferInfo};
use crate::dispatch::{DispatchError, DispatchOutcome, DispatchRequest, Dispatcher};
use crate::emergency::{EmergencyController, EmergencyError, ObserveReport};
use crate::health::{HealthProber, HealthStatus, VpnChecker};
use crate::metrics::Metrics;
use crate::queue::QueueStore;
use crate::ratio::{RatioMonitor, Sample, SnapshotLog};
use crate::recovery::{RecoveryEstimator, RecoveryInputs, uploaded_basis};
use crate::roi::{AcquisitionLedger, RoiError, RoiReport, RoiTracker};

/// Upper bound on the random delay added to each loop interval.
pub const MAX_TICK_JITTER: Duration = Duration::from_secs(15);

/// Errors raised while assembling a [`Warden`].
#[derive(Debug, Error)]
pub enum WardenError {
    /// Configuration could not be turned into components.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Persisted emergency state could not be loaded.
    #[error(transparent)]
    Emergency(#[from] EmergencyError),
}

/// Result of one monitor cycle.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    /// Fresh health for every instance.
    pub health: Vec<HealthStatus>,
    /// Whether the ratio reading was new.
    pub sample_fresh: bool,
    /// Ratio the decision was based on.
    pub ratio: Option<f64>,
    /// What the emergency controller did.
    pub emergency: ObserveReport,
}

/// Figures read from the live instance.
#[derive(Debug, Default)]
struct LiveFigures {
    instance: Option<String>,
    transfer: TransferInfo,
    downloading: usize,
    seeding: Vec<TorrentInfo>,
}

/// One running deployment.
pub struct Warden {
    dispatcher: Dispatcher,
    monitor: Option<RatioMonitor>,
    controller: EmergencyController,
    estimator: RecoveryEstimator,
    roi: RoiTracker,
}

impl Warden {
    /// Assembles a warden from ready components.
    #[must_use]
    pub fn new(
        dispatcher: Dispatcher,
        monitor: Option<RatioMonitor>,
        controller: EmergencyController,
        roi: RoiTracker,
    ) -> Self {
        let estimator = RecoveryEstimator::new(controller.thresholds().recovery);
        Self {
            dispatcher,
            monitor,
            controller,
            estimator,
            roi,
        }
    }

    /// Builds every component from configuration and restores persisted
    /// state (emergency flag, last ratio snapshot).
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Config`] when the ratio settings are unusable
    /// and [`WardenError::Emergency`] when the state file is malformed.
    pub async fn from_config(config: &Config) -> Result<Self, WardenError> {
        let timeouts = config.timeouts.http();

        let instances = config
            .instances
            .iter()
            .map(|instance| Instance::qbittorrent(instance.descriptor(), timeouts))
            .collect();

        let mut prober = HealthProber::new();
        if let Some(vpn) = &config.vpn {
            let checker = VpnChecker::new(vpn.gateway.clone()).with_timeout(vpn.timeout());
            prober = prober.with_tunnel_probe(Arc::new(checker));
        }

        let queue = Arc::new(QueueStore::new(config.queue_path()));
        let dispatcher = Dispatcher::new(instances, prober, queue);

        let monitor = match &config.ratio {
            Some(ratio) => {
                let monitor = RatioMonitor::new(Arc::new(ratio.source(timeouts)?), ratio.parser()?)
                    .with_log(SnapshotLog::new(config.snapshot_log_path()));
                if let Err(error) = monitor.restore().await {
                    warn!(error = %error, "Could not restore last ratio snapshot");
                }
                Some(monitor)
            }
            None => {
                info!("No ratio source configured; emergency control disabled");
                None
            }
        };

        let controller = EmergencyController::load(config.state_path(), config.thresholds).await?;
        let roi = RoiTracker::new(
            AcquisitionLedger::new(config.ledger_path()),
            config.roi.points_per_gb,
        );

        Ok(Self::new(dispatcher, monitor, controller, roi))
    }

    /// Returns the dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Returns the emergency controller.
    #[must_use]
    pub fn controller(&self) -> &EmergencyController {
        &self.controller
    }

    /// Returns the ROI tracker.
    #[must_use]
    pub fn roi_tracker(&self) -> &RoiTracker {
        &self.roi
    }

    /// Delivers or queues a new download.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::dispatch`].
    pub async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchOutcome, DispatchError> {
        self.dispatcher.dispatch(request).await
    }

    /// Gate for point-costing acquisitions.
    #[must_use]
    pub fn is_emergency_active(&self) -> bool {
        self.controller.is_emergency_active()
    }

    /// Runs one monitor cycle: health refresh (with queue replay), ratio
    /// sample, emergency decision.
    ///
    /// # Errors
    ///
    /// Returns [`EmergencyError::State`] when the emergency state cannot be
    /// persisted.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> Result<TickReport, EmergencyError> {
        let health = self.dispatcher.refresh_health().await;
        let live = health
            .iter()
            .find(|status| status.state.is_ok())
            .and_then(|status| self.dispatcher.instance_named(&status.instance_name));

        let sample = match &self.monitor {
            Some(monitor) => monitor.sample().await,
            None => {
                debug!("No ratio monitor; skipping emergency evaluation");
                Sample::Stale(None)
            }
        };
        let emergency = self
            .controller
            .observe(&sample, live.and_then(Instance::api))
            .await?;

        Ok(TickReport {
            health,
            sample_fresh: sample.is_fresh(),
            ratio: sample.snapshot().map(|snapshot| snapshot.ratio),
            emergency,
        })
    }

    /// Runs [`Warden::tick`] every `interval` (plus jitter) until `shutdown`
    /// resolves. A failed cycle is logged and the loop continues.
    pub async fn run<F>(&self, interval: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(interval_secs = interval.as_secs(), "Monitor loop started");
        loop {
            match self.tick().await {
                Ok(report) => debug!(
                    ratio = ?report.ratio,
                    active = report.emergency.active,
                    "Monitor cycle finished"
                ),
                Err(error) => warn!(error = %error, "Monitor cycle failed"),
            }

            let delay = interval + jitter();
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = &mut shutdown => {
                    info!("Monitor loop stopping");
                    break;
                }
            }
        }
    }

    /// Read-only status for reporting.
    #[instrument(skip(self))]
    pub async fn get_metrics(&self) -> Metrics {
        let figures = self.live_figures().await;
        let snapshot = self.monitor.as_ref().and_then(RatioMonitor::latest);
        let recovery_hours = self.recovery_from(&figures);

        Metrics {
            ratio: snapshot.map(|snapshot| snapshot.ratio),
            emergency_active: self.controller.is_emergency_active(),
            upload_rate: figures.transfer.upload_rate,
            download_rate: figures.transfer.download_rate,
            active_uploads: figures.seeding.len(),
            active_downloads: figures.downloading,
            frozen_count: self.controller.state().frozen.len(),
            recovery_hours,
            live_instance: figures.instance,
        }
    }

    /// Projected hours until the ratio reaches the recovery threshold.
    pub async fn estimate_recovery_hours(&self) -> Option<f64> {
        let figures = self.live_figures().await;
        self.recovery_from(&figures)
    }

    /// Earned vs. spent points.
    ///
    /// # Errors
    ///
    /// Returns [`RoiError::Ledger`] when the ledger cannot be read.
    pub async fn roi_report(&self) -> Result<RoiReport, RoiError> {
        let figures = self.live_figures().await;
        let snapshot = self.monitor.as_ref().and_then(RatioMonitor::latest);
        let uploaded = snapshot.as_ref().map_or_else(
            || figures.seeding.iter().map(|torrent| torrent.uploaded).sum(),
            |snapshot| snapshot.upload_bytes_total,
        );
        self.roi.report(uploaded).await
    }

    fn recovery_from(&self, figures: &LiveFigures) -> Option<f64> {
        let snapshot = self.monitor.as_ref().and_then(RatioMonitor::latest)?;
        self.estimator.estimate_hours(RecoveryInputs {
            ratio: snapshot.ratio,
            upload_rate: figures.transfer.upload_rate,
            uploaded_total: uploaded_basis(&figures.seeding, Some(&snapshot)),
            emergency_active: self.controller.is_emergency_active(),
        })
    }

    async fn live_figures(&self) -> LiveFigures {
        let Some(instance) = self.dispatcher.live_instance().await else {
            debug!("No live instance; reporting empty transfer figures");
            return LiveFigures::default();
        };
        let Some(api) = instance.api() else {
            return LiveFigures::default();
        };

        let mut figures = LiveFigures {
            instance: Some(instance.name().to_string()),
            ..LiveFigures::default()
        };
        match api.transfer_info().await {
            Ok(transfer) => figures.transfer = transfer,
            Err(error) => warn!(error = %error, "Could not read transfer stats"),
        }
        match api.list(TorrentFilter::Downloading).await {
            Ok(torrents) => {
                figures.downloading = torrents.iter().filter(|t| !t.is_paused()).count();
            }
            Err(error) => warn!(error = %error, "Could not list downloading torrents"),
        }
        match api.list(TorrentFilter::Seeding).await {
            Ok(torrents) => figures.seeding = torrents,
            Err(error) => warn!(error = %error, "Could not list seeding torrents"),
        }
        figures
    }
}

fn jitter() -> Duration {
    let max_ms = u64::try_from(MAX_TICK_JITTER.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}
