//! VPN tunnel reachability.
//!
//! The check opens a TCP connection to a gateway address that only routes
//! through the tunnel. It is diagnostic: the prober uses it to explain why a
//! tunnel-gated instance is unreachable, never to decide delivery.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

/// Default connect budget for the gateway probe.
pub const DEFAULT_VPN_TIMEOUT: Duration = Duration::from_secs(3);

/// Answers whether the tunnel is currently up.
#[async_trait]
pub trait TunnelProbe: Send + Sync {
    /// Returns true when the tunnel-only gateway accepts a connection.
    async fn is_tunnel_up(&self) -> bool;
}

/// TCP-connect probe against a tunnel-only gateway (`host:port`).
#[derive(Debug, Clone)]
pub struct VpnChecker {
    gateway: String,
    timeout: Duration,
}

impl VpnChecker {
    /// Creates a checker with the default 3s budget.
    #[must_use]
    pub fn new(gateway: impl Into<String>) -> Self {
        Self {
            gateway: gateway.into(),
            timeout: DEFAULT_VPN_TIMEOUT,
        }
    }

    /// Overrides the connect budget.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl TunnelProbe for VpnChecker {
    async fn is_tunnel_up(&self) -> bool {
        match tokio::time::timeout(self.timeout, TcpStream::connect(self.gateway.as_str())).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(error)) => {
                debug!(gateway = %self.gateway, error = %error, "VPN gateway refused connection");
                false
            }
            Err(_) => {
                debug!(gateway = %self.gateway, timeout_ms = self.timeout.as_millis(), "VPN gateway probe timed out");
                false
            }
        }
    }
}
