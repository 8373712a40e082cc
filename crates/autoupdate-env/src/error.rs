//! Error types for autoupdate-env

use std::path::PathBuf;

use autoupdate_core::ConfigError;
use thiserror::Error;

/// Errors that can occur while resolving paths or loading config
#[derive(Error, Debug)]
pub enum EnvError {
    /// `AUTOUPDATE_ENV` or `--env` held something other than dev/prod
    #[error("unknown environment {0:?} (expected dev, development, prod or production)")]
    UnknownEnvironment(String),

    /// The platform has no per-user data directory
    #[error("no platform data directory available")]
    NoDataDir,

    /// Config file parsed but failed validation
    #[error("invalid config in {path}: {source}")]
    InvalidConfig {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },

    /// Config file is not a JSON object
    #[error("config file {0} must contain a JSON object")]
    NotAnObject(PathBuf),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}
