//! autoupdate core library
//!
//! Background self-update for long-running hosts: version gating against a
//! remote manifest, bounded-retry download with size cap and SHA-256
//! verification, and an exit-time hand-off of the staged package.

pub mod config;
pub mod controller;
pub mod digest;
pub mod download;
pub mod error;
pub mod fakes;
pub mod http;
pub mod installer;
pub mod manifest;
pub mod metrics;
pub mod obs;
pub mod retry;
pub mod telemetry;
pub mod version;

pub use config::{ConfigError, ConfigFile, UpdateConfig, DEFAULT_CURRENT_VERSION};
pub use controller::{decide, Decision, FinalizeOutcome, UpdateController, UpdateState};
pub use digest::{InvalidDigest, Sha256Digest};
pub use download::{
    staged_file_name, sweep_partials, DownloadProgress, DownloadRequest, PackageDownloader,
    StagedArtifact,
};
pub use error::{DownloadError, FetchError, InstallError, Result, Retryable, UpdateError};
pub use installer::{CommandInstaller, DeferredInstaller, Installer, PendingInstall};
pub use manifest::{Manifest, ManifestFetcher};
pub use retry::{with_retry, RetryPolicy};
pub use version::{compare, Version, VersionParseError};

pub use metrics::METRICS;
pub use obs::{
    cycle_span, emit_artifact_staged, emit_cycle_failed, emit_cycle_finished, emit_cycle_started,
    emit_handoff, emit_manifest_fetched, emit_retry_scheduled,
};
pub use telemetry::init_tracing;

/// autoupdate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
