//! Error types for ratio sampling.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors from fetching, parsing or logging a ratio reading.
#[derive(Debug, Error)]
pub enum RatioError {
    /// Transport failure fetching the status page.
    #[error("could not fetch ratio page {url}: {source}")]
    Fetch {
        /// Page or login URL.
        url: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The fetch did not complete in time.
    #[error("timeout fetching ratio page {url}")]
    Timeout {
        /// Page or login URL.
        url: String,
    },

    /// Non-success HTTP status.
    #[error("HTTP {status} fetching ratio page {url}")]
    HttpStatus {
        /// Page or login URL.
        url: String,
        /// Status code returned.
        status: u16,
    },

    /// The page still shows a login form after logging in.
    #[error(
        "[AUTH] ratio page {url} still requires login\n  Suggestion: Check the ratio source credentials and login form field names"
    )]
    LoginRequired {
        /// Page URL.
        url: String,
    },

    /// The page did not contain a usable value.
    #[error("ratio page format not recognised: {field} {detail}")]
    Parse {
        /// Which value could not be extracted.
        field: &'static str,
        /// What was wrong.
        detail: String,
    },

    /// A configured extraction pattern is not a valid regex.
    #[error("invalid {name} pattern: {source}")]
    Pattern {
        /// Pattern name (`ratio`, `uploaded`, `downloaded`).
        name: &'static str,
        /// Regex compile error.
        #[source]
        source: regex::Error,
    },

    /// HTTP client construction failed.
    #[error("could not build ratio page client: {0}")]
    Build(String),

    /// Snapshot log IO failure.
    #[error("snapshot log {path}: {source}")]
    Log {
        /// Log file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl RatioError {
    /// Maps a transport error into `Timeout` or `Fetch`.
    pub fn from_send(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Fetch {
                url: url.to_string(),
                source,
            }
        }
    }

    /// Creates a `Parse` error.
    pub fn parse(field: &'static str, detail: impl Into<String>) -> Self {
        Self::Parse {
            field,
            detail: detail.into(),
        }
    }
}
