//! TOML configuration.
//!
//! Default location:
//! 1. `$XDG_CONFIG_HOME/seedwarden/config.toml`
//! 2. `$HOME/.config/seedwarden/config.toml`
//!
//! A missing default file yields [`Config::default`]; an explicitly given path
//! must exist. Instance problems (bad URL, missing password variable) are
//! logged and degrade that instance to `NOT_CONFIGURED` instead of failing.

use std::env;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::daemon::{Credentials, HttpTimeouts, InstanceDescriptor, InstanceRole};
use crate::emergency::Thresholds;
use crate::health::DEFAULT_VPN_TIMEOUT;
use crate::ratio::{HttpRatioSource, PageLogin, RatioError, RatioPageParser};
use crate::roi::DEFAULT_POINTS_PER_GB;

const APP_DIR: &str = "seedwarden";
const DEFAULT_INTERVAL_SECS: u64 = 300;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// TOML error with line/column.
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range.
    #[error("invalid config value for `{field}`: {detail}")]
    Invalid {
        /// Dotted key.
        field: String,
        /// What is wrong and what is expected.
        detail: String,
    },

    /// The ratio page settings could not be turned into a source/parser.
    #[error("invalid ratio source settings: {0}")]
    Ratio(#[from] RatioError),
}

impl ConfigError {
    fn invalid(field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            detail: detail.into(),
        }
    }
}

/// Whole configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory for the queue, state, snapshot log and ledger files.
    pub data_dir: Option<PathBuf>,
    /// Monitor loop interval in seconds (30..=86400).
    pub interval_secs: u64,
    /// Network budgets.
    pub timeouts: TimeoutConfig,
    /// Emergency thresholds.
    pub thresholds: Thresholds,
    /// Tunnel gateway probe.
    pub vpn: Option<VpnConfig>,
    /// Daemon instances, any order; primaries are tried first.
    pub instances: Vec<InstanceConfig>,
    /// Account status page.
    pub ratio: Option<RatioConfig>,
    /// Point earn rate.
    pub roi: RoiConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            interval_secs: DEFAULT_INTERVAL_SECS,
            timeouts: TimeoutConfig::default(),
            thresholds: Thresholds::default(),
            vpn: None,
            instances: Vec::new(),
            ratio: None,
            roi: RoiConfig::default(),
        }
    }
}

/// Per-call network budgets in seconds.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutConfig {
    /// Connect timeout.
    pub connect_secs: u64,
    /// Whole-request timeout.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            request_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl TimeoutConfig {
    /// Converts to client timeouts.
    #[must_use]
    pub fn http(&self) -> HttpTimeouts {
        HttpTimeouts {
            connect: Duration::from_secs(self.connect_secs),
            request: Duration::from_secs(self.request_secs),
        }
    }
}

/// Tunnel gateway settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VpnConfig {
    /// `host:port` reachable only through the tunnel.
    pub gateway: String,
    /// Probe timeout in seconds.
    pub timeout_secs: Option<u64>,
}

impl VpnConfig {
    /// Returns the probe timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout_secs
            .map_or(DEFAULT_VPN_TIMEOUT, Duration::from_secs)
    }
}

/// One `[[instances]]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceConfig {
    /// Unique name.
    pub name: String,
    /// Failover priority.
    pub role: InstanceRole,
    /// Web UI root; absent means not configured.
    pub url: Option<String>,
    /// Handshake username; absent skips the handshake.
    pub username: Option<String>,
    /// Inline password.
    pub password: Option<String>,
    /// Environment variable holding the password.
    pub password_env: Option<String>,
    /// Only reachable through the tunnel.
    #[serde(default)]
    pub requires_vpn: bool,
}

impl InstanceConfig {
    /// Builds the descriptor, degrading to unconfigured on a bad URL.
    #[must_use]
    pub fn descriptor(&self) -> InstanceDescriptor {
        let Some(raw_url) = self.url.as_deref().filter(|url| !url.trim().is_empty()) else {
            return InstanceDescriptor::unconfigured(&self.name, self.role);
        };
        let url = match Url::parse(raw_url.trim()) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url,
            Ok(url) => {
                warn!(instance = %self.name, scheme = url.scheme(), "Unsupported URL scheme; instance not configured");
                return InstanceDescriptor::unconfigured(&self.name, self.role);
            }
            Err(error) => {
                warn!(instance = %self.name, error = %error, "Invalid instance URL; instance not configured");
                return InstanceDescriptor::unconfigured(&self.name, self.role);
            }
        };

        let mut descriptor = InstanceDescriptor::new(&self.name, url, self.role);
        if let Some(username) = &self.username {
            let password = resolve_password(
                &self.name,
                self.password.as_deref(),
                self.password_env.as_deref(),
            );
            descriptor = descriptor.with_credentials(Credentials::new(username, password));
        }
        if self.requires_vpn {
            descriptor = descriptor.behind_vpn();
        }
        descriptor
    }
}

/// `[ratio]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RatioConfig {
    /// Account status page.
    pub page_url: String,
    /// Login form action; absent means the page needs no login.
    pub login_url: Option<String>,
    /// Account username.
    pub username: Option<String>,
    /// Inline password.
    pub password: Option<String>,
    /// Environment variable holding the password.
    pub password_env: Option<String>,
    /// Login form username field name.
    pub username_field: Option<String>,
    /// Login form password field name.
    pub password_field: Option<String>,
    /// Custom ratio regex (one capture group).
    pub ratio_pattern: Option<String>,
    /// Custom uploaded regex (one capture group).
    pub uploaded_pattern: Option<String>,
    /// Custom downloaded regex (one capture group).
    pub downloaded_pattern: Option<String>,
}

impl RatioConfig {
    /// Builds the page parser.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Ratio`] when a custom pattern does not compile.
    pub fn parser(&self) -> Result<RatioPageParser, ConfigError> {
        let (ratio, uploaded, downloaded) = RatioPageParser::standard_patterns();
        Ok(RatioPageParser::with_patterns(
            self.ratio_pattern.as_deref().unwrap_or(ratio),
            self.uploaded_pattern.as_deref().unwrap_or(uploaded),
            self.downloaded_pattern.as_deref().unwrap_or(downloaded),
        )?)
    }

    /// Builds the HTTP page source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for unparsable URLs and
    /// [`ConfigError::Ratio`] when the client cannot be built.
    pub fn source(&self, timeouts: HttpTimeouts) -> Result<HttpRatioSource, ConfigError> {
        let page_url = Url::parse(&self.page_url)
            .map_err(|error| ConfigError::invalid("ratio.page_url", error.to_string()))?;

        let login = match (&self.login_url, &self.username) {
            (Some(login_url), Some(username)) => {
                let url = Url::parse(login_url)
                    .map_err(|error| ConfigError::invalid("ratio.login_url", error.to_string()))?;
                let password = resolve_password(
                    "ratio",
                    self.password.as_deref(),
                    self.password_env.as_deref(),
                );
                let mut login = PageLogin::new(url, Credentials::new(username, password));
                if let Some(field) = &self.username_field {
                    login.username_field.clone_from(field);
                }
                if let Some(field) = &self.password_field {
                    login.password_field.clone_from(field);
                }
                Some(login)
            }
            (Some(_), None) => {
                return Err(ConfigError::invalid(
                    "ratio.username",
                    "required when ratio.login_url is set",
                ));
            }
            _ => None,
        };

        Ok(HttpRatioSource::new(page_url, login, timeouts)?)
    }
}

/// `[roi]` table.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoiConfig {
    /// Points earned per GiB uploaded.
    pub points_per_gb: f64,
}

impl Default for RoiConfig {
    fn default() -> Self {
        Self {
            points_per_gb: DEFAULT_POINTS_PER_GB,
        }
    }
}

impl Config {
    /// Parses a TOML document. `path` is only used in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for syntax or schema errors and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read, otherwise
    /// as [`Config::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw, path)
    }

    /// Loads `explicit` if given, else the default path when it exists, else
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a file is present but unreadable or
    /// invalid.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match resolve_default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_secs("timeouts.connect_secs", self.timeouts.connect_secs, 1..=3600)?;
        validate_secs("timeouts.request_secs", self.timeouts.request_secs, 1..=3600)?;
        validate_secs("interval_secs", self.interval_secs, 30..=86_400)?;
        if let Some(vpn) = &self.vpn {
            if vpn.gateway.trim().is_empty() {
                return Err(ConfigError::invalid("vpn.gateway", "must be host:port"));
            }
            if let Some(secs) = vpn.timeout_secs {
                validate_secs("vpn.timeout_secs", secs, 1..=3600)?;
            }
        }

        let Thresholds { floor, recovery } = self.thresholds;
        if !(floor.is_finite() && recovery.is_finite() && floor > 0.0 && floor < recovery) {
            return Err(ConfigError::invalid(
                "thresholds",
                format!("floor {floor} and recovery {recovery} must satisfy 0 < floor < recovery"),
            ));
        }

        let points = self.roi.points_per_gb;
        if !(points.is_finite() && points > 0.0) {
            return Err(ConfigError::invalid(
                "roi.points_per_gb",
                format!("{points}. Expected a positive number"),
            ));
        }

        let mut seen = Vec::with_capacity(self.instances.len());
        for instance in &self.instances {
            if instance.name.trim().is_empty() {
                return Err(ConfigError::invalid("instances.name", "must not be empty"));
            }
            if seen.contains(&instance.name.as_str()) {
                return Err(ConfigError::invalid(
                    "instances.name",
                    format!("duplicate instance name '{}'", instance.name),
                ));
            }
            seen.push(instance.name.as_str());
        }
        Ok(())
    }

    /// Directory for persisted files.
    ///
    /// Priority: `data_dir`, `$XDG_DATA_HOME/seedwarden`,
    /// `$HOME/.local/share/seedwarden`, then the current directory.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        if let Some(xdg) = env_var_non_empty_os("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join(APP_DIR);
        }
        env_var_non_empty_os("HOME").map_or_else(
            || PathBuf::from("."),
            |home| PathBuf::from(home).join(".local").join("share").join(APP_DIR),
        )
    }

    /// Queue file location.
    #[must_use]
    pub fn queue_path(&self) -> PathBuf {
        self.data_dir().join("queue.json")
    }

    /// Emergency state file location.
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.data_dir().join("emergency.json")
    }

    /// Ratio snapshot log location.
    #[must_use]
    pub fn snapshot_log_path(&self) -> PathBuf {
        self.data_dir().join("ratio.jsonl")
    }

    /// Acquisition ledger location.
    #[must_use]
    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir().join("acquisitions.json")
    }
}

fn validate_secs(
    field: &str,
    value: u64,
    range: std::ops::RangeInclusive<u64>,
) -> Result<(), ConfigError> {
    if range.contains(&value) {
        return Ok(());
    }
    Err(ConfigError::invalid(
        field,
        format!("{value}. Expected range: {}..={}", range.start(), range.end()),
    ))
}

fn resolve_password(owner: &str, inline: Option<&str>, env_name: Option<&str>) -> String {
    if let Some(name) = env_name {
        match env::var(name) {
            Ok(value) => return value,
            Err(_) => {
                warn!(owner, variable = name, "Password environment variable not set");
            }
        }
    }
    inline.unwrap_or_default().to_string()
}

/// Resolves the default config path.
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join(APP_DIR)
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}
