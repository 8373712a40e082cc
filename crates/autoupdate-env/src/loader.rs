//! Config file loading and write-back
//!
//! Loading starts from [`ConfigFile::default`] and overlays whatever keys
//! the file provides, so partial files are fine. In production a config
//! beside the executable wins and is copied into the data directory. If no
//! config exists anywhere, the defaults are written out for the user to edit.

use std::path::Path;

use autoupdate_core::{ConfigFile, UpdateConfig, Version};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::environment::EnvironmentResolver;
use crate::error::EnvError;
use crate::Result;

impl EnvironmentResolver {
    /// Load, merge and validate the config file.
    pub fn load_config_file(&self) -> Result<ConfigFile> {
        let mut merged = serde_json::to_value(ConfigFile::default())?;
        let config_path = self.config_path();

        if let Some(exe_config) = self.exe_config_path().filter(|p| p.is_file()) {
            match read_object(&exe_config) {
                Ok(overrides) => {
                    overlay(&mut merged, overrides);
                    write_json(&config_path, &merged)?;
                    info!(
                        from = %exe_config.display(),
                        to = %config_path.display(),
                        "synced executable config into data directory"
                    );
                    return finish(&exe_config, merged);
                }
                Err(e) => warn!(path = %exe_config.display(), error = %e, "ignoring executable config"),
            }
        }

        if config_path.is_file() {
            overlay(&mut merged, read_object(&config_path)?);
            info!(path = %config_path.display(), "loaded update config");
        } else {
            write_json(&config_path, &merged)?;
            info!(path = %config_path.display(), "created default update config");
        }
        finish(&config_path, merged)
    }

    /// [`load_config_file`](Self::load_config_file) converted into the
    /// controller's typed config, staging into [`staging_dir`](Self::staging_dir).
    pub fn load_config(&self) -> Result<UpdateConfig> {
        let file = self.load_config_file()?;
        let path = self.config_path();
        file.into_config(self.staging_dir())
            .map_err(|source| EnvError::InvalidConfig { path, source })
    }

    /// Like [`load_config`](Self::load_config), but any failure is logged and
    /// replaced by the default config. An update problem must never stop
    /// the host from starting.
    pub fn load_config_or_default(&self) -> UpdateConfig {
        match self.load_config() {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "update config unusable; falling back to defaults");
                UpdateConfig::fallback(self.staging_dir())
            }
        }
    }

    /// Write the default config unless one already exists. Returns whether a
    /// file was written.
    pub fn init_config(&self) -> Result<bool> {
        let path = self.config_path();
        if path.exists() {
            return Ok(false);
        }
        write_json(&path, &serde_json::to_value(ConfigFile::default())?)?;
        Ok(true)
    }

    /// Persist `version` as `CURRENT_VERSION` after a successful hand-off.
    /// Other keys in the file are preserved.
    pub fn record_installed_version(&self, version: &Version) -> Result<()> {
        let path = self.config_path();
        let mut doc = if path.is_file() {
            Value::Object(read_object(&path)?)
        } else {
            serde_json::to_value(ConfigFile::default())?
        };
        if let Value::Object(map) = &mut doc {
            map.insert(
                "CURRENT_VERSION".to_string(),
                Value::String(version.to_string()),
            );
        }
        write_json(&path, &doc)?;
        info!(version = %version, path = %path.display(), "recorded installed version");
        Ok(())
    }
}

fn finish(source: &Path, merged: Value) -> Result<ConfigFile> {
    let file: ConfigFile = serde_json::from_value(merged)?;
    file.validate().map_err(|source_err| EnvError::InvalidConfig {
        path: source.to_path_buf(),
        source: source_err,
    })?;
    Ok(file)
}

fn read_object(path: &Path) -> Result<Map<String, Value>> {
    let bytes = std::fs::read(path)?;
    match serde_json::from_slice(&bytes)? {
        Value::Object(map) => Ok(map),
        _ => Err(EnvError::NotAnObject(path.to_path_buf())),
    }
}

fn overlay(base: &mut Value, overrides: Map<String, Value>) {
    if let Value::Object(map) = base {
        map.extend(overrides);
    }
}

/// Pretty-print `value` to `path` via a temp file in the same directory.
fn write_json(path: &Path, value: &Value) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(tmp.as_file(), value)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| EnvError::Io(e.error))?;
    Ok(())
}
