//! autoupdate-env: environment and config resolution for autoupdate hosts
//!
//! Decides where an application's update config, logs and staged packages
//! live, and turns the on-disk `update_config.json` into an
//! [`autoupdate_core::UpdateConfig`].
//!
//! ## Layers
//!
//! - [`Environment`]: development vs production
//! - [`EnvironmentResolver`]: per-app path roots
//! - config loading and version write-back (methods on the resolver)

pub mod environment;
pub mod error;
mod loader;

pub use environment::{Environment, EnvironmentResolver, CONFIG_FILE_NAME, ENV_VAR};
pub use error::EnvError;

/// Result type for environment operations
pub type Result<T> = std::result::Result<T, EnvError>;
