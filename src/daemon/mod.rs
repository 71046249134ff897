//! Download-daemon instances and the API used to drive them.
//!
//! # Architecture
//!
//! - [`InstanceDescriptor`] - static, config-provided identity of one daemon
//! - [`DaemonApi`] - async trait for the calls the dispatcher and emergency
//!   controller need (auth, status, add, list, pause/resume, transfer stats)
//! - [`QbitClient`] - qBittorrent Web API v2 implementation
//! - [`Instance`] - a descriptor paired with its API handle
//!
//! # Object Safety
//!
//! `DaemonApi` uses `async_trait` so instances can be held as
//! `Arc<dyn DaemonApi>` and swapped for in-memory fakes in tests.

mod error;
mod http;
mod qbittorrent;

pub use error::ClientError;
pub use http::{HttpTimeouts, build_http_client, user_agent};
pub use qbittorrent::QbitClient;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

/// Failover priority of an instance.
///
/// Derives `Ord` so that `Primary < Secondary` for sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceRole {
    /// Tried first.
    Primary,
    /// Tried when the primary is unavailable.
    Secondary,
}

impl InstanceRole {
    /// Returns the config/log string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }
}

impl fmt::Display for InstanceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Username/password pair for the daemon's authentication handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Login name.
    pub username: String,
    password: String,
}

impl Credentials {
    /// Creates a credential pair.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns the password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

// Manual Debug so passwords never reach logs via `?descriptor`.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Static description of one daemon deployment. Immutable during a run.
#[derive(Debug, Clone)]
pub struct InstanceDescriptor {
    /// Unique name used in logs, outcomes and metrics.
    pub name: String,
    /// Web UI/API root. `None` means the instance is not configured.
    pub base_url: Option<Url>,
    /// Handshake credentials. `None` skips the handshake.
    pub credentials: Option<Credentials>,
    /// Failover priority.
    pub role: InstanceRole,
    /// Whether this instance is only reachable through the VPN tunnel.
    pub requires_vpn: bool,
}

impl InstanceDescriptor {
    /// Creates a configured descriptor without credentials.
    #[must_use]
    pub fn new(name: impl Into<String>, base_url: Url, role: InstanceRole) -> Self {
        Self {
            name: name.into(),
            base_url: Some(base_url),
            credentials: None,
            role,
            requires_vpn: false,
        }
    }

    /// Creates a descriptor for an instance with no URL.
    #[must_use]
    pub fn unconfigured(name: impl Into<String>, role: InstanceRole) -> Self {
        Self {
            name: name.into(),
            base_url: None,
            credentials: None,
            role,
            requires_vpn: false,
        }
    }

    /// Sets handshake credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Marks the instance as reachable only through the tunnel.
    #[must_use]
    pub fn behind_vpn(mut self) -> Self {
        self.requires_vpn = true;
        self
    }

    /// Returns true when a base URL is present.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }
}

/// Torrent list filter understood by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TorrentFilter {
    /// Incomplete torrents, including stalled, queued and paused downloads.
    Downloading,
    /// Complete and seeding.
    Seeding,
    /// Download finished, regardless of run state.
    Completed,
}

impl TorrentFilter {
    /// Returns the query value for the `filter` parameter.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Downloading => "downloading",
            Self::Seeding => "seeding",
            Self::Completed => "completed",
        }
    }
}

/// One torrent as reported by the list call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentInfo {
    /// Info-hash used to address the torrent in pause/resume calls.
    pub hash: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Download progress in `0.0..=1.0`.
    #[serde(default)]
    pub progress: f64,
    /// Daemon state label (e.g. `downloading`, `pausedUP`, `stoppedDL`).
    #[serde(default)]
    pub state: String,
    /// Bytes uploaded for this torrent.
    #[serde(default)]
    pub uploaded: u64,
    /// Bytes downloaded for this torrent.
    #[serde(default)]
    pub downloaded: u64,
    /// Current upload rate in bytes/sec.
    #[serde(default)]
    pub upspeed: u64,
    /// Current download rate in bytes/sec.
    #[serde(default)]
    pub dlspeed: u64,
    /// Category label.
    #[serde(default)]
    pub category: String,
}

impl TorrentInfo {
    /// Returns true when the daemon reports the torrent paused/stopped.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state.starts_with("paused") || self.state.starts_with("stopped")
    }

    /// Returns true once every piece is downloaded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.progress >= 1.0
    }
}

/// Session-wide transfer statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferInfo {
    /// Current upload rate in bytes/sec.
    #[serde(rename = "up_info_speed", default)]
    pub upload_rate: u64,
    /// Current download rate in bytes/sec.
    #[serde(rename = "dl_info_speed", default)]
    pub download_rate: u64,
    /// Bytes uploaded this session.
    #[serde(rename = "up_info_data", default)]
    pub session_uploaded: u64,
    /// Bytes downloaded this session.
    #[serde(rename = "dl_info_data", default)]
    pub session_downloaded: u64,
}

/// Parameters for adding a torrent.
#[derive(Debug, Clone, Copy)]
pub struct AddTorrent<'a> {
    /// Magnet URI or `.torrent` link.
    pub payload: &'a str,
    /// Category to file the torrent under.
    pub category: Option<&'a str>,
    /// Save path on the daemon host.
    pub save_path: Option<&'a str>,
}

/// Calls the rest of the crate issues against a download daemon.
///
/// Implementations bound every call with a timeout and report it as
/// [`ClientError::Timeout`] rather than hanging.
#[async_trait]
pub trait DaemonApi: Send + Sync {
    /// Runs the authentication handshake, replacing any previous session.
    async fn login(&self) -> Result<(), ClientError>;

    /// Lightweight authenticated status call; returns the daemon version.
    async fn version(&self) -> Result<String, ClientError>;

    /// Adds a torrent.
    async fn add(&self, torrent: &AddTorrent<'_>) -> Result<(), ClientError>;

    /// Lists torrents matching a filter.
    async fn list(&self, filter: TorrentFilter) -> Result<Vec<TorrentInfo>, ClientError>;

    /// Pauses one torrent by hash.
    async fn pause(&self, hash: &str) -> Result<(), ClientError>;

    /// Resumes one torrent by hash.
    async fn resume(&self, hash: &str) -> Result<(), ClientError>;

    /// Returns current rates and session totals.
    async fn transfer_info(&self) -> Result<TransferInfo, ClientError>;
}

/// A descriptor paired with its API handle.
///
/// Unconfigured instances carry no handle; health checks report them as
/// `NOT_CONFIGURED` without touching the network.
#[derive(Clone)]
pub struct Instance {
    descriptor: InstanceDescriptor,
    api: Option<Arc<dyn DaemonApi>>,
}

impl Instance {
    /// Pairs a descriptor with an API handle.
    #[must_use]
    pub fn new(descriptor: InstanceDescriptor, api: Arc<dyn DaemonApi>) -> Self {
        Self {
            descriptor,
            api: Some(api),
        }
    }

    /// Wraps a descriptor that cannot be contacted.
    #[must_use]
    pub fn unconfigured(descriptor: InstanceDescriptor) -> Self {
        Self {
            descriptor,
            api: None,
        }
    }

    /// Builds a qBittorrent-backed instance from a descriptor.
    ///
    /// A descriptor without a URL, or one whose client cannot be built, yields
    /// an unconfigured instance; the failure is logged and does not abort
    /// start-up.
    #[must_use]
    pub fn qbittorrent(descriptor: InstanceDescriptor, timeouts: HttpTimeouts) -> Self {
        if !descriptor.is_configured() {
            return Self::unconfigured(descriptor);
        }
        match QbitClient::new(&descriptor, timeouts) {
            Ok(client) => Self::new(descriptor, Arc::new(client)),
            Err(error) => {
                tracing::warn!(
                    instance = %descriptor.name,
                    error = %error,
                    "Instance client unavailable; treating as not configured"
                );
                Self::unconfigured(descriptor)
            }
        }
    }

    /// Returns the static descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &InstanceDescriptor {
        &self.descriptor
    }

    /// Returns the instance name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Returns the API handle when the instance is configured.
    #[must_use]
    pub fn api(&self) -> Option<&dyn DaemonApi> {
        match &self.descriptor.base_url {
            Some(_) => self.api.as_deref(),
            None => None,
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("descriptor", &self.descriptor)
            .field("has_api", &self.api.is_some())
            .finish()
    }
}
