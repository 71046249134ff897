//! Endpoint health probing.
//!
//! Many daemons answer every unauthenticated request with 403, which looks the
//! same as "down". The prober therefore authenticates first and only then
//! issues the status call:
//!
//! 1. handshake fails → `AUTH_FAILED`, times out → `TIMEOUT`
//! 2. status call succeeds → `OK`
//! 3. status call still 403 after re-auth → `UNREACHABLE`
//! 4. no URL configured → `NOT_CONFIGURED`
//!
//! Results are never cached: tunnel state can change between two dispatches.

mod vpn;

pub use vpn::{DEFAULT_VPN_TIMEOUT, TunnelProbe, VpnChecker};

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::daemon::{ClientError, Instance};

/// Outcome of one health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthState {
    /// Authenticated and answering.
    Ok,
    /// Handshake refused or malformed.
    AuthFailed,
    /// A call exceeded its timeout budget.
    Timeout,
    /// Connection failed or the daemon kept refusing after auth.
    Unreachable,
    /// Tunnel-gated instance failed while the tunnel is down.
    VpnDown,
    /// No URL configured.
    NotConfigured,
}

impl HealthState {
    /// Returns the log/output label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::AuthFailed => "AUTH_FAILED",
            Self::Timeout => "TIMEOUT",
            Self::Unreachable => "UNREACHABLE",
            Self::VpnDown => "VPN_DOWN",
            Self::NotConfigured => "NOT_CONFIGURED",
        }
    }

    /// Returns true only for `OK`.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    fn from_handshake_error(error: &ClientError) -> Self {
        match error {
            ClientError::Timeout { .. } => Self::Timeout,
            ClientError::Network { .. } => Self::Unreachable,
            ClientError::NotConfigured { .. } | ClientError::Build { .. } => Self::NotConfigured,
            ClientError::AuthRejected { .. }
            | ClientError::Forbidden { .. }
            | ClientError::HttpStatus { .. }
            | ClientError::Rejected { .. }
            | ClientError::Decode { .. } => Self::AuthFailed,
        }
    }

    fn from_status_error(error: &ClientError) -> Self {
        match error {
            ClientError::Timeout { .. } => Self::Timeout,
            // re-auth inside the retry was refused
            ClientError::AuthRejected { .. } => Self::AuthFailed,
            ClientError::NotConfigured { .. } | ClientError::Build { .. } => Self::NotConfigured,
            ClientError::Network { .. }
            | ClientError::Forbidden { .. }
            | ClientError::HttpStatus { .. }
            | ClientError::Rejected { .. }
            | ClientError::Decode { .. } => Self::Unreachable,
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fresh health reading for one instance. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Instance the reading belongs to.
    pub instance_name: String,
    /// Classified state.
    pub state: HealthState,
    /// When the check finished.
    pub checked_at: DateTime<Utc>,
    /// Daemon version when `OK`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Error text for non-OK states.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl HealthStatus {
    fn new(instance_name: &str, state: HealthState) -> Self {
        Self {
            instance_name: instance_name.to_string(),
            state,
            checked_at: Utc::now(),
            version: None,
            detail: None,
        }
    }
}

/// Authenticated liveness checker.
#[derive(Clone, Default)]
pub struct HealthProber {
    tunnel: Option<Arc<dyn TunnelProbe>>,
}

impl HealthProber {
    /// Creates a prober with no tunnel diagnostics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tunnel probe used to label failures of VPN-gated instances.
    #[must_use]
    pub fn with_tunnel_probe(mut self, tunnel: Arc<dyn TunnelProbe>) -> Self {
        self.tunnel = Some(tunnel);
        self
    }

    /// Checks one instance: handshake, then status call.
    #[instrument(skip(self, instance), fields(instance = %instance.name()))]
    pub async fn check(&self, instance: &Instance) -> HealthStatus {
        let name = instance.name();
        let Some(api) = instance.api() else {
            return HealthStatus::new(name, HealthState::NotConfigured);
        };

        let mut status = match api.login().await {
            Err(error) => {
                let mut status = HealthStatus::new(name, HealthState::from_handshake_error(&error));
                status.detail = Some(error.to_string());
                status
            }
            Ok(()) => match api.version().await {
                Ok(version) => {
                    let mut status = HealthStatus::new(name, HealthState::Ok);
                    status.version = Some(version);
                    status
                }
                Err(error) => {
                    let mut status = HealthStatus::new(name, HealthState::from_status_error(&error));
                    status.detail = Some(error.to_string());
                    status
                }
            },
        };

        if instance.descriptor().requires_vpn
            && matches!(status.state, HealthState::Timeout | HealthState::Unreachable)
            && let Some(tunnel) = &self.tunnel
            && !tunnel.is_tunnel_up().await
        {
            debug!(previous = %status.state, "Tunnel down; relabelling failure");
            status.state = HealthState::VpnDown;
        }

        debug!(state = %status.state, "Health check finished");
        status
    }
}

impl fmt::Debug for HealthProber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthProber")
            .field("tunnel_probe", &self.tunnel.is_some())
            .finish()
    }
}
