//! Shared HTTP client construction policy.
//!
//! Daemon clients and the ratio-page fetcher go through here so timeouts,
//! user-agent, compression and cookie handling stay consistent.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use reqwest::cookie::Jar;

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Per-call network budget.
///
/// Every auth handshake, status probe, add, list, pause/resume and page fetch
/// is bounded by `request`; exceeding it surfaces as a timeout error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    /// TCP/TLS connect budget.
    pub connect: Duration,
    /// Whole-request budget.
    pub request: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            request: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Returns the user-agent sent on every request.
#[must_use]
pub fn user_agent() -> &'static str {
    concat!("seedwarden/", env!("CARGO_PKG_VERSION"))
}

/// Builds an HTTP client bound to one cookie jar.
///
/// # Errors
///
/// Returns the builder error when TLS or proxy initialisation fails.
pub fn build_http_client(
    timeouts: HttpTimeouts,
    cookie_jar: Arc<Jar>,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(timeouts.connect)
        .timeout(timeouts.request)
        .user_agent(user_agent())
        .gzip(true)
        .cookie_provider(cookie_jar)
        .build()
}
