//! Structured observability hooks for the update cycle.
//!
//! This module provides:
//! - A cycle-scoped tracing span carrying a `uuid` cycle id
//! - Emission functions for key lifecycle events: cycle start/finish,
//!   manifest fetched, retry scheduled, artifact staged, hand-off
//!
//! Events are emitted at `info!` level, retries and failures at `warn!`.

use std::time::Duration;

use tracing::info;
use uuid::Uuid;

use crate::digest::Sha256Digest;
use crate::version::Version;

/// Span tagged with the cycle id. The controller attaches it to the cycle
/// future with `Instrument`, so every event inside carries `cycle_id`.
pub fn cycle_span(cycle_id: Uuid) -> tracing::Span {
    tracing::info_span!("autoupdate.cycle", cycle_id = %cycle_id)
}

/// Emit event: a check cycle started for `current` version.
pub fn emit_cycle_started(current: &Version) {
    info!(event = "cycle.started", current_version = %current);
}

/// Emit event: manifest fetched and parsed.
pub fn emit_manifest_fetched(remote: &Version, min_required: &Version, release_date: &str) {
    info!(
        event = "manifest.fetched",
        remote_version = %remote,
        min_required = %min_required,
        release_date = %release_date,
    );
}

/// Emit event: an operation failed transiently and will be retried.
pub fn emit_retry_scheduled(
    op: &str,
    attempt: u32,
    max_attempts: u32,
    delay: Duration,
    error: &dyn std::fmt::Display,
) {
    tracing::warn!(
        event = "retry.scheduled",
        op = %op,
        attempt = attempt,
        max_attempts = max_attempts,
        delay_ms = delay.as_millis() as u64,
        error = %error,
    );
}

/// Emit event: a verified artifact was staged.
pub fn emit_artifact_staged(version: &Version, digest: &Sha256Digest, size: u64) {
    info!(
        event = "artifact.staged",
        version = %version,
        digest = %digest.short(),
        size_bytes = size,
    );
}

/// Emit event: cycle reached an at-rest state.
pub fn emit_cycle_finished(outcome: &str, duration_ms: u64) {
    info!(event = "cycle.finished", outcome = %outcome, duration_ms = duration_ms);
}

/// Emit event: cycle failed (warning level).
pub fn emit_cycle_failed(error: &dyn std::fmt::Display, duration_ms: u64) {
    tracing::warn!(event = "cycle.failed", error = %error, duration_ms = duration_ms);
}

/// Emit event: staged artifact handed to the installer.
pub fn emit_handoff(version: &Version, path: &std::path::Path, success: bool) {
    info!(
        event = "install.handoff",
        version = %version,
        path = %path.display(),
        success = success,
    );
}
