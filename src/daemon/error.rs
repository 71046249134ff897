//! Error types for download-daemon API calls.
//!
//! Every variant names the instance it came from so failover logs can be read
//! without cross-referencing spans.

use thiserror::Error;

/// Errors returned by a [`DaemonApi`](super::DaemonApi) call.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Instance has no base URL configured.
    #[error("instance {instance} is not configured (no base URL)")]
    NotConfigured {
        /// Instance name.
        instance: String,
    },

    /// Credentials were refused during the authentication handshake.
    #[error(
        "[AUTH] instance {instance} rejected credentials: {detail}\n  Suggestion: Check the username/password configured for this instance"
    )]
    AuthRejected {
        /// Instance name.
        instance: String,
        /// What the daemon answered.
        detail: String,
    },

    /// The call did not complete within the request timeout.
    #[error("timeout calling {url} on instance {instance}")]
    Timeout {
        /// Instance name.
        instance: String,
        /// Endpoint that timed out.
        url: String,
    },

    /// Connection-level failure (refused, DNS, TLS, reset).
    #[error("network error calling {url} on instance {instance}: {source}")]
    Network {
        /// Instance name.
        instance: String,
        /// Endpoint that failed.
        url: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// HTTP 403 persisted after a fresh authentication.
    #[error("instance {instance} answered 403 for {url} after re-authenticating")]
    Forbidden {
        /// Instance name.
        instance: String,
        /// Endpoint that was refused.
        url: String,
    },

    /// Any other non-success HTTP status.
    #[error("HTTP {status} from {url} on instance {instance}")]
    HttpStatus {
        /// Instance name.
        instance: String,
        /// Endpoint that failed.
        url: String,
        /// Status code returned.
        status: u16,
    },

    /// The daemon accepted the request but reported the operation failed.
    #[error("instance {instance} refused {operation}: {body}")]
    Rejected {
        /// Instance name.
        instance: String,
        /// Operation label (e.g. `add`).
        operation: &'static str,
        /// Response body as returned.
        body: String,
    },

    /// The response body could not be decoded.
    #[error("could not decode response from {url} on instance {instance}: {source}")]
    Decode {
        /// Instance name.
        instance: String,
        /// Endpoint whose body failed to decode.
        url: String,
        /// Underlying decode error.
        #[source]
        source: reqwest::Error,
    },

    /// HTTP client construction failed.
    #[error("could not build HTTP client for instance {instance}: {detail}")]
    Build {
        /// Instance name.
        instance: String,
        /// Builder error text.
        detail: String,
    },
}

impl ClientError {
    /// Maps a transport error from `send()` into `Timeout` or `Network`.
    pub fn from_send(instance: &str, url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                instance: instance.to_string(),
                url: url.to_string(),
            }
        } else {
            Self::Network {
                instance: instance.to_string(),
                url: url.to_string(),
                source,
            }
        }
    }

    /// Creates an `HttpStatus` error.
    pub fn http_status(instance: &str, url: &str, status: u16) -> Self {
        Self::HttpStatus {
            instance: instance.to_string(),
            url: url.to_string(),
            status,
        }
    }

    /// Creates an `AuthRejected` error.
    pub fn auth_rejected(instance: &str, detail: impl Into<String>) -> Self {
        Self::AuthRejected {
            instance: instance.to_string(),
            detail: detail.into(),
        }
    }

    /// Returns true for failures that say nothing about the request itself:
    /// the same call may succeed on another instance.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Network { .. } | Self::HttpStatus { status: 500..=599, .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_rejected_message_has_suggestion() {
        let err = ClientError::auth_rejected("primary", "Fails.");
        let msg = err.to_string();
        assert!(msg.starts_with("[AUTH]"), "Expected [AUTH] prefix in: {msg}");
        assert!(msg.contains("primary"));
        assert!(msg.contains("Suggestion"));
    }

    #[test]
    fn test_http_status_transient_classification() {
        assert!(ClientError::http_status("a", "http://x/", 502).is_transient());
        assert!(!ClientError::http_status("a", "http://x/", 404).is_transient());
        let timeout = ClientError::Timeout {
            instance: "a".to_string(),
            url: "http://x/".to_string(),
        };
        assert!(timeout.is_transient());
    }

    #[test]
    fn test_not_configured_message_names_instance() {
        let err = ClientError::NotConfigured {
            instance: "secondary".to_string(),
        };
        assert!(err.to_string().contains("secondary"));
    }
}
