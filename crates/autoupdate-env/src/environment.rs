//! Runtime environment detection and path roots
//!
//! Development runs keep everything in the working directory. Production
//! runs use the platform's per-user data directory (`%APPDATA%`,
//! `~/.local/share`, `~/Library/Application Support`) under the app name.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::warn;

use crate::error::EnvError;
use crate::Result;

/// Variable consulted by [`Environment::detect`].
pub const ENV_VAR: &str = "AUTOUPDATE_ENV";

/// Name of the update config file in every location.
pub const CONFIG_FILE_NAME: &str = "update_config.json";

/// Deployment mode of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// `AUTOUPDATE_ENV` when set and recognised, otherwise the build
    /// profile (debug builds are development).
    pub fn detect() -> Self {
        Self::from_setting(std::env::var(ENV_VAR).ok().as_deref())
    }

    /// Resolve from an optional setting value. Unknown values log a warning
    /// and fall back to the build profile.
    pub fn from_setting(value: Option<&str>) -> Self {
        match value.map(str::parse::<Environment>) {
            Some(Ok(env)) => env,
            Some(Err(e)) => {
                warn!(error = %e, "ignoring {ENV_VAR}");
                Self::build_default()
            }
            None => Self::build_default(),
        }
    }

    fn build_default() -> Self {
        if cfg!(debug_assertions) {
            Environment::Development
        } else {
            Environment::Production
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl FromStr for Environment {
    type Err = EnvError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "prod" | "production" => Ok(Environment::Production),
            _ => Err(EnvError::UnknownEnvironment(s.to_string())),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => f.write_str("development"),
            Environment::Production => f.write_str("production"),
        }
    }
}

/// Resolved locations for one application in one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentResolver {
    app_name: String,
    environment: Environment,
    data_dir: PathBuf,
    exe_dir: Option<PathBuf>,
}

impl EnvironmentResolver {
    /// Resolve roots for `app_name` from the process state.
    pub fn new(app_name: impl Into<String>, environment: Environment) -> Result<Self> {
        let app_name = app_name.into();
        let data_dir = match environment {
            Environment::Development => std::env::current_dir()?,
            Environment::Production => dirs::data_dir().ok_or(EnvError::NoDataDir)?.join(&app_name),
        };
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        Ok(Self {
            app_name,
            environment,
            data_dir,
            exe_dir,
        })
    }

    /// Resolver with explicit roots.
    pub fn with_roots(
        app_name: impl Into<String>,
        environment: Environment,
        data_dir: impl Into<PathBuf>,
        exe_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            environment,
            data_dir: data_dir.into(),
            exe_dir,
        }
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE_NAME)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.data_dir.join("updates")
    }

    /// Marker file used by the deferred installer.
    pub fn pending_marker_path(&self) -> PathBuf {
        self.data_dir.join("pending-update.json")
    }

    /// Config shipped beside the executable. Only consulted in production,
    /// where it takes priority over the data-dir copy.
    pub fn exe_config_path(&self) -> Option<PathBuf> {
        if !self.environment.is_production() {
            return None;
        }
        self.exe_dir.as_ref().map(|dir| dir.join(CONFIG_FILE_NAME))
    }
}
