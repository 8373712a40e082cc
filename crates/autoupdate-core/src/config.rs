//! Update configuration.
//!
//! [`ConfigFile`] is the on-disk JSON shape (upper-case keys, durations in
//! seconds). [`UpdateConfig`] is the validated, typed value the controller
//! consumes. Path resolution is not done here: the caller supplies the
//! staging directory.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::version::{Version, VersionParseError};

/// Configuration validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must use https:// (got {value:?})")]
    InsecureUrl { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("CURRENT_VERSION is invalid: {0}")]
    CurrentVersion(#[from] VersionParseError),
}

/// `CURRENT_VERSION` assumed when no config file says otherwise.
pub const DEFAULT_CURRENT_VERSION: Version = Version::new(1, 0, 0);

/// Typed, validated configuration for one controller.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateConfig {
    /// Where the manifest JSON lives.
    pub version_url: String,
    /// Where the update package lives.
    pub update_url: String,
    /// Version of the running host.
    pub current_version: Version,
    /// Hard cap on the package size in bytes.
    pub max_download_size: u64,
    /// Per-request timeout for both the manifest and the package.
    pub timeout: Duration,
    /// Extra attempts for transient failures.
    pub max_retry: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
    /// Directory verified packages are staged into.
    pub staging_dir: PathBuf,
    /// Re-check period after the first cycle; `None` checks once per run.
    pub check_interval: Option<Duration>,
    /// Ceiling for a whole cycle, retries included.
    pub cycle_timeout: Duration,
    /// Longest the host waits in `initialize` and `finalize`.
    pub startup_wait: Duration,
}

impl UpdateConfig {
    /// Config with default limits for the given endpoints.
    pub fn new(
        version_url: impl Into<String>,
        update_url: impl Into<String>,
        current_version: Version,
        staging_dir: impl Into<PathBuf>,
    ) -> Self {
        let defaults = ConfigFile::default();
        Self {
            version_url: version_url.into(),
            update_url: update_url.into(),
            current_version,
            max_download_size: defaults.max_download_size,
            timeout: Duration::from_secs(defaults.timeout),
            max_retry: defaults.max_retry,
            retry_delay: Duration::from_secs(defaults.retry_delay),
            staging_dir: staging_dir.into(),
            check_interval: None,
            cycle_timeout: Duration::from_secs(defaults.cycle_timeout),
            startup_wait: Duration::from_secs(defaults.startup_wait),
        }
    }

    /// Config equivalent to [`ConfigFile::default`], used when the on-disk
    /// config cannot be loaded.
    pub fn fallback(staging_dir: impl Into<PathBuf>) -> Self {
        let defaults = ConfigFile::default();
        Self::new(
            defaults.version_url,
            defaults.update_url,
            DEFAULT_CURRENT_VERSION,
            staging_dir,
        )
    }
}

/// JSON config file shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(rename = "VERSION_URL")]
    pub version_url: String,
    #[serde(rename = "UPDATE_URL")]
    pub update_url: String,
    #[serde(rename = "CURRENT_VERSION")]
    pub current_version: String,
    #[serde(rename = "MAX_DOWNLOAD_SIZE")]
    pub max_download_size: u64,
    /// Seconds.
    #[serde(rename = "TIMEOUT")]
    pub timeout: u64,
    #[serde(rename = "MAX_RETRY")]
    pub max_retry: u32,
    /// Seconds.
    #[serde(rename = "RETRY_DELAY")]
    pub retry_delay: u64,
    /// Seconds; 0 disables periodic checks.
    #[serde(rename = "CHECK_INTERVAL", default)]
    pub check_interval: u64,
    /// Seconds.
    #[serde(rename = "CYCLE_TIMEOUT", default = "default_cycle_timeout")]
    pub cycle_timeout: u64,
    /// Seconds.
    #[serde(rename = "STARTUP_WAIT", default = "default_startup_wait")]
    pub startup_wait: u64,
    #[serde(rename = "ALLOW_INSECURE_HTTP", default)]
    pub allow_insecure_http: bool,
}

/// A slow update server must not hold up the host for more than a few
/// seconds. Raise `CYCLE_TIMEOUT` for packages that take longer to fetch.
fn default_cycle_timeout() -> u64 {
    10
}

fn default_startup_wait() -> u64 {
    3
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            version_url: "https://your-version-url/version.json".to_string(),
            update_url: "https://your-update-url/update.zip".to_string(),
            current_version: DEFAULT_CURRENT_VERSION.to_string(),
            max_download_size: 100 * 1024 * 1024,
            timeout: 30,
            max_retry: 3,
            retry_delay: 5,
            check_interval: 0,
            cycle_timeout: default_cycle_timeout(),
            startup_wait: default_startup_wait(),
            allow_insecure_http: false,
        }
    }
}

impl ConfigFile {
    /// Check every field without building a config.
    pub fn validate(&self) -> Result<Version, ConfigError> {
        self.check_url("VERSION_URL", &self.version_url)?;
        self.check_url("UPDATE_URL", &self.update_url)?;
        let current = Version::parse(&self.current_version)?;

        for (field, value) in [
            ("MAX_DOWNLOAD_SIZE", self.max_download_size),
            ("TIMEOUT", self.timeout),
            ("CYCLE_TIMEOUT", self.cycle_timeout),
        ] {
            if value == 0 {
                return Err(ConfigError::NotPositive { field });
            }
        }
        Ok(current)
    }

    /// Validate and convert into the typed config.
    pub fn into_config(self, staging_dir: impl Into<PathBuf>) -> Result<UpdateConfig, ConfigError> {
        let current_version = self.validate()?;
        Ok(UpdateConfig {
            version_url: self.version_url,
            update_url: self.update_url,
            current_version,
            max_download_size: self.max_download_size,
            timeout: Duration::from_secs(self.timeout),
            max_retry: self.max_retry,
            retry_delay: Duration::from_secs(self.retry_delay),
            staging_dir: staging_dir.into(),
            check_interval: (self.check_interval > 0)
                .then(|| Duration::from_secs(self.check_interval)),
            cycle_timeout: Duration::from_secs(self.cycle_timeout),
            startup_wait: Duration::from_secs(self.startup_wait),
        })
    }

    fn check_url(&self, field: &'static str, value: &str) -> Result<(), ConfigError> {
        let lower = value.to_ascii_lowercase();
        let ok = lower.starts_with("https://")
            || (self.allow_insecure_http && lower.starts_with("http://"));
        if ok {
            Ok(())
        } else {
            Err(ConfigError::InsecureUrl {
                field,
                value: value.to_string(),
            })
        }
    }
}
