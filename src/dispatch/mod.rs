//! Failover dispatch across prioritized daemon instances.
//!
//! Instances are tried strictly in order, one at a time. Each candidate gets
//! a fresh authenticated health check; the first `OK` instance that also
//! accepts the add wins. When none does, the request goes to the durable
//! queue, so every call ends delivered to exactly one instance or queued.

mod request;

pub use request::{DispatchOutcome, DispatchRequest, ReplayReport};

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::daemon::Instance;
use crate::health::{HealthProber, HealthState, HealthStatus};
use crate::queue::{QueueError, QueueStore};

/// Queue reason recorded when no instance accepted the request.
pub const REASON_ALL_UNAVAILABLE: &str = "all_instances_unavailable";

/// Errors the dispatcher cannot recover from by failing over.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No instance accepted the request and the queue write failed too.
    #[error(
        "request {payload} was not delivered and could not be queued: {source}\n  Suggestion: Check that the queue file location is writable and holds valid JSON"
    )]
    NotQueued {
        /// Payload that is still owned by the caller.
        payload: String,
        /// Queue failure.
        #[source]
        source: QueueError,
    },

    /// Queue access failed during replay.
    #[error("queue replay failed: {0}")]
    Replay(#[from] QueueError),
}

struct Attempt {
    delivered_to: Option<String>,
    observed: Vec<HealthStatus>,
}

/// Ordered failover over a fixed instance set with a queue fallback.
pub struct Dispatcher {
    instances: Vec<Instance>,
    prober: HealthProber,
    queue: Arc<QueueStore>,
    last_states: Mutex<HashMap<String, HealthState>>,
    replay_lock: tokio::sync::Mutex<()>,
}

impl Dispatcher {
    /// Creates a dispatcher. Instances are sorted primary-first, keeping
    /// configuration order within a role.
    #[must_use]
    pub fn new(mut instances: Vec<Instance>, prober: HealthProber, queue: Arc<QueueStore>) -> Self {
        instances.sort_by_key(|instance| instance.descriptor().role);
        Self {
            instances,
            prober,
            queue,
            last_states: Mutex::new(HashMap::new()),
            replay_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Returns the instances in attempt order.
    #[must_use]
    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    /// Returns the queue store.
    #[must_use]
    pub fn queue(&self) -> &Arc<QueueStore> {
        &self.queue
    }

    /// Delivers a request to the first healthy instance or queues it.
    ///
    /// When an instance is seen turning `OK` and this request was delivered,
    /// queued work is replayed afterwards. A request that ends up queued is
    /// never re-sent within the same call.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NotQueued`] only when delivery failed
    /// everywhere and the queue file could not be written either.
    #[instrument(skip(self, request), fields(payload = %request.payload))]
    pub async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchOutcome, DispatchError> {
        let attempt = self.deliver(request).await;
        let recovered = self.remember(&attempt.observed);

        let outcome = if let Some(target) = attempt.delivered_to {
            DispatchOutcome {
                delivered_to: Some(target),
                queued: false,
                observed: attempt.observed,
            }
        } else {
            self.queue
                .enqueue(request.to_queue_entry(REASON_ALL_UNAVAILABLE))
                .await
                .map_err(|source| DispatchError::NotQueued {
                    payload: request.payload.clone(),
                    source,
                })?;
            warn!(
                observed = %summarize(&attempt.observed),
                "No instance accepted the request; queued"
            );
            DispatchOutcome {
                delivered_to: None,
                queued: true,
                observed: attempt.observed,
            }
        };

        // a queued request already had its one try at every healthy instance
        if recovered && !outcome.queued {
            self.replay_after_recovery().await;
        }
        Ok(outcome)
    }

    /// Probes every instance, records the states, and replays the queue when
    /// any instance is `OK` and work is waiting. Replay failures are logged.
    #[instrument(skip(self))]
    pub async fn refresh_health(&self) -> Vec<HealthStatus> {
        let mut observed = Vec::with_capacity(self.instances.len());
        for instance in &self.instances {
            observed.push(self.prober.check(instance).await);
        }
        self.remember(&observed);
        info!(observed = %summarize(&observed), "Instance health refreshed");

        if observed.iter().any(|status| status.state.is_ok()) {
            self.replay_after_recovery().await;
        }
        observed
    }

    /// Looks up a configured instance by name.
    #[must_use]
    pub fn instance_named(&self, name: &str) -> Option<&Instance> {
        self.instances.iter().find(|instance| instance.name() == name)
    }

    /// Returns the first instance, in priority order, whose fresh check is `OK`.
    pub async fn live_instance(&self) -> Option<Instance> {
        for instance in &self.instances {
            if self.prober.check(instance).await.state.is_ok() {
                return Some(instance.clone());
            }
        }
        None
    }

    /// Re-submits queued entries one at a time.
    ///
    /// A delivered entry is removed from the file only after its add call
    /// succeeded; an undelivered one stays with `attempts` incremented. The
    /// pass stops early once no instance is healthy. Overlapping calls are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Replay`] when the queue file cannot be read or
    /// updated.
    #[instrument(skip(self))]
    pub async fn replay_queue(&self) -> Result<ReplayReport, DispatchError> {
        let Ok(_guard) = self.replay_lock.try_lock() else {
            debug!("Replay already running; skipping");
            return Ok(ReplayReport {
                skipped: true,
                ..ReplayReport::default()
            });
        };

        let mut report = ReplayReport::default();
        for entry in self.queue.peek().await? {
            let request = DispatchRequest::from_entry(&entry);
            let attempt = self.deliver(&request).await;
            self.remember(&attempt.observed);

            if let Some(target) = attempt.delivered_to {
                self.queue.remove(&entry).await?;
                info!(payload = %entry.payload, instance = %target, "Queued request delivered");
                report.delivered += 1;
                continue;
            }

            self.queue.record_failure(&entry).await?;
            report.failed += 1;
            if !attempt.observed.iter().any(|status| status.state.is_ok()) {
                debug!("No healthy instance left; stopping replay");
                break;
            }
        }

        report.remaining = self.queue.len().await?;
        info!(
            delivered = report.delivered,
            failed = report.failed,
            remaining = report.remaining,
            "Queue replay finished"
        );
        Ok(report)
    }

    async fn replay_after_recovery(&self) {
        match self.queue.is_empty().await {
            Ok(true) => {}
            Ok(false) => {
                if let Err(error) = self.replay_queue().await {
                    warn!(error = %error, "Queue replay after recovery failed");
                }
            }
            Err(error) => warn!(error = %error, "Could not inspect queue after recovery"),
        }
    }

    /// Tries each instance in order; never sends to more than one.
    async fn deliver(&self, request: &DispatchRequest) -> Attempt {
        let mut observed = Vec::with_capacity(self.instances.len());
        let mut delivered_to = None;

        for instance in &self.instances {
            let status = self.prober.check(instance).await;
            let healthy = status.state.is_ok();
            observed.push(status);
            if !healthy {
                continue;
            }
            let Some(api) = instance.api() else {
                continue;
            };

            match api.add(&request.as_add()).await {
                Ok(()) => {
                    delivered_to = Some(instance.name().to_string());
                    break;
                }
                Err(error) => {
                    warn!(
                        instance = %instance.name(),
                        error = %error,
                        transient = error.is_transient(),
                        "Healthy instance refused add; trying next"
                    );
                }
            }
        }

        if let Some(target) = &delivered_to {
            info!(instance = %target, observed = %summarize(&observed), "Request delivered");
        }
        Attempt {
            delivered_to,
            observed,
        }
    }

    /// Stores the latest states and reports whether any instance became `OK`.
    fn remember(&self, observed: &[HealthStatus]) -> bool {
        let mut last = self
            .last_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut recovered = false;
        for status in observed {
            let previous = last.insert(status.instance_name.clone(), status.state);
            if status.state.is_ok() && previous.is_none_or(|state| !state.is_ok()) {
                info!(instance = %status.instance_name, "Instance is healthy");
                recovered = true;
            }
        }
        recovered
    }
}

fn summarize(observed: &[HealthStatus]) -> String {
    let mut summary = String::new();
    for (index, status) in observed.iter().enumerate() {
        if index > 0 {
            summary.push_str(", ");
        }
        let _ = write!(summary, "{}={}", status.instance_name, status.state);
    }
    summary
}
