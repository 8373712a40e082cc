//! Update lifecycle controller.
//!
//! One [`UpdateController`] owns a background worker that runs check cycles:
//! fetch the manifest, decide, and download + verify into the staging
//! directory. The host never blocks on the network. It reads the state
//! through [`UpdateController::status`] / [`UpdateController::subscribe`]
//! and calls [`UpdateController::finalize`] once at shutdown to hand a staged
//! artifact to its [`Installer`].
//!
//! State transitions:
//!
//! ```text
//! Idle ──► Checking ──► UpToDate
//!                  ├──► Downloading ──► UpdateAvailable ──(finalize)──► Idle
//!                  │               └──► Failed
//!                  └──► Failed
//! ```
//!
//! `UpToDate` and `Failed` are at rest; the next cycle may start from them.
//! `UpdateAvailable` suppresses further cycles until finalize. A cycle that
//! is still running when finalize gives up waiting is cancelled and leaves
//! the state at `Idle`.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard, Weak};
use std::time::{Duration, Instant};

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::config::UpdateConfig;
use crate::download::{self, DownloadProgress, DownloadRequest, PackageDownloader, StagedArtifact};
use crate::error::{Result, UpdateError};
use crate::http;
use crate::installer::Installer;
use crate::manifest::{Manifest, ManifestFetcher};
use crate::metrics::METRICS;
use crate::obs;
use crate::retry::RetryPolicy;
use crate::version::Version;

/// Observable lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateState {
    /// No cycle has run yet, or the staged artifact was handed off.
    Idle,
    /// A cycle is in flight.
    Checking,
    /// The package is streaming in. Published once per received chunk.
    Downloading(DownloadProgress),
    UpToDate,
    /// A verified package is staged and waiting for finalize.
    UpdateAvailable(StagedArtifact),
    Failed(UpdateError),
}

impl UpdateState {
    /// `true` once a cycle has produced a result.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            UpdateState::UpToDate | UpdateState::UpdateAvailable(_) | UpdateState::Failed(_)
        )
    }

    /// Short stable name, used as the `outcome` log field.
    pub fn label(&self) -> &'static str {
        match self {
            UpdateState::Idle => "idle",
            UpdateState::Checking => "checking",
            UpdateState::Downloading(_) => "downloading",
            UpdateState::UpToDate => "up_to_date",
            UpdateState::UpdateAvailable(_) => "update_available",
            UpdateState::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateState::UpdateAvailable(artifact) => write!(
                f,
                "update available: {} staged at {}",
                artifact.version,
                artifact.path.display()
            ),
            UpdateState::Downloading(progress) => match progress.total {
                Some(total) => write!(f, "downloading: {}/{total} bytes", progress.received),
                None => write!(f, "downloading: {} bytes", progress.received),
            },
            UpdateState::Failed(reason) => write!(f, "failed: {reason}"),
            other => f.write_str(other.label()),
        }
    }
}

/// What a cycle should do with a fetched manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    UpToDate,
    /// Download the advertised package. `forced` is set when the running
    /// version is below `min_required`.
    Download { forced: bool },
}

/// Decide what to do given the running version and a manifest.
///
/// Below `min_required` the advertised package must itself reach the floor;
/// anything older is an inconsistent manifest.
pub fn decide(current: Version, manifest: &Manifest) -> Result<Decision> {
    if current < manifest.min_required {
        if manifest.version < manifest.min_required {
            return Err(UpdateError::InconsistentManifest {
                current,
                remote: manifest.version,
                min_required: manifest.min_required,
            });
        }
        return Ok(Decision::Download { forced: true });
    }
    if manifest.version > current {
        Ok(Decision::Download { forced: false })
    } else {
        Ok(Decision::UpToDate)
    }
}

/// How long finalize gives a cancelled cycle to unwind.
const CANCEL_GRACE: Duration = Duration::from_millis(250);

/// Result of [`UpdateController::finalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    NothingStaged,
    HandedOff(StagedArtifact),
    /// The installer rejected the artifact. The file stays where it was.
    HandoffFailed {
        artifact: StagedArtifact,
        error: String,
    },
}

struct Inner {
    config: UpdateConfig,
    fetcher: ManifestFetcher,
    downloader: PackageDownloader,
    retry: RetryPolicy,
    installer: Arc<dyn Installer>,
    state: watch::Sender<UpdateState>,
    cycle_lock: Mutex<()>,
    /// Flipped once by finalize to cancel a cycle it stopped waiting for.
    shutdown: watch::Sender<bool>,
    worker: std::sync::Mutex<Option<JoinHandle<()>>>,
    finalized: AtomicBool,
}

impl Inner {
    fn lock_worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::SeqCst)
    }

    /// Run one cycle under the cycle lock and publish its result.
    async fn run_cycle(&self) -> UpdateState {
        let _guard = self.cycle_lock.lock().await;

        let current = self.state.borrow().clone();
        if self.is_finalized() || matches!(current, UpdateState::UpdateAvailable(_)) {
            debug!(state = current.label(), "cycle skipped");
            return current;
        }

        let span = obs::cycle_span(Uuid::new_v4());
        let started = Instant::now();
        METRICS.inc_cycles();
        self.state.send_replace(UpdateState::Checking);

        let ceiling = self.config.cycle_timeout;
        let mut shutdown = self.shutdown.subscribe();
        let body = tokio::time::timeout(ceiling, self.cycle_body().instrument(span.clone()));
        let outcome = tokio::select! {
            res = body => match res {
                Ok(Ok(state)) => state,
                Ok(Err(err)) => UpdateState::Failed(err),
                Err(_) => UpdateState::Failed(UpdateError::CycleTimeout {
                    ceiling_ms: ceiling.as_millis() as u64,
                }),
            },
            _ = shutdown.wait_for(|stop| *stop) => {
                // Dropping the body removes any partial download.
                let duration_ms = started.elapsed().as_millis() as u64;
                span.in_scope(|| obs::emit_cycle_finished("cancelled", duration_ms));
                self.state.send_replace(UpdateState::Idle);
                return UpdateState::Idle;
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        span.in_scope(|| match &outcome {
            UpdateState::Failed(reason) => obs::emit_cycle_failed(reason, duration_ms),
            other => obs::emit_cycle_finished(other.label(), duration_ms),
        });

        self.state.send_replace(outcome.clone());
        outcome
    }

    async fn cycle_body(&self) -> Result<UpdateState> {
        let config = &self.config;
        let current = config.current_version;
        obs::emit_cycle_started(&current);

        if let Err(e) = download::sweep_partials(&config.staging_dir).await {
            warn!(dir = %config.staging_dir.display(), error = %e, "could not sweep partial downloads");
        }

        let fetcher = &self.fetcher;
        let url = config.version_url.as_str();
        let timeout = config.timeout;
        let manifest = self
            .retry
            .run("manifest.fetch", move || fetcher.fetch(url, timeout))
            .await?;
        obs::emit_manifest_fetched(
            &manifest.version,
            &manifest.min_required,
            &manifest.release_date,
        );

        match decide(current, &manifest)? {
            Decision::UpToDate => Ok(UpdateState::UpToDate),
            Decision::Download { forced } => {
                if forced {
                    info!(
                        current = %current,
                        min_required = %manifest.min_required,
                        "running version is below min_required; update is mandatory"
                    );
                }
                tokio::fs::create_dir_all(&config.staging_dir)
                    .await
                    .map_err(|e| UpdateError::Staging(e.to_string()))?;

                let request = DownloadRequest {
                    url: config.update_url.clone(),
                    destination: config
                        .staging_dir
                        .join(download::staged_file_name(&config.update_url, &manifest.version)),
                    max_size: config.max_download_size,
                    expected_digest: manifest.sha256.clone(),
                    timeout: config.timeout,
                    version: manifest.version,
                };
                let report = |progress: DownloadProgress| {
                    self.state.send_replace(UpdateState::Downloading(progress));
                };
                let downloader = &self.downloader;
                let req = &request;
                let report = &report;
                let artifact = self
                    .retry
                    .run("package.download", move || {
                        downloader.download_with_progress(req, report)
                    })
                    .await?;

                METRICS.inc_staged();
                obs::emit_artifact_staged(&artifact.version, &artifact.digest, artifact.size);
                Ok(UpdateState::UpdateAvailable(artifact))
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.lock_worker().take() {
            handle.abort();
        }
    }
}

async fn worker_loop(inner: Weak<Inner>) {
    loop {
        let interval = {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let state = inner.run_cycle().await;
            if inner.is_finalized() || matches!(state, UpdateState::UpdateAvailable(_)) {
                return;
            }
            match inner.config.check_interval {
                Some(interval) => interval,
                None => return,
            }
        };
        tokio::time::sleep(interval).await;
    }
}

/// Cloneable handle to one update lifecycle.
#[derive(Clone)]
pub struct UpdateController {
    inner: Arc<Inner>,
}

impl fmt::Debug for UpdateController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateController")
            .field("current_version", &self.inner.config.current_version)
            .field("state", &*self.inner.state.borrow())
            .finish()
    }
}

impl UpdateController {
    /// Build a controller with its own HTTP client.
    pub fn new(config: UpdateConfig, installer: Arc<dyn Installer>) -> Result<Self> {
        let client = http::build_client()?;
        Ok(Self::with_client(config, client, installer))
    }

    /// Build a controller sharing an existing HTTP client.
    pub fn with_client(
        config: UpdateConfig,
        client: reqwest::Client,
        installer: Arc<dyn Installer>,
    ) -> Self {
        let (state, _) = watch::channel(UpdateState::Idle);
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                retry: RetryPolicy::from_config(&config),
                fetcher: ManifestFetcher::new(client.clone()),
                downloader: PackageDownloader::new(client),
                config,
                installer,
                state,
                cycle_lock: Mutex::new(()),
                shutdown,
                worker: std::sync::Mutex::new(None),
                finalized: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &UpdateConfig {
        &self.inner.config
    }

    /// Spawn the background worker. Returns `false` (and does nothing) when
    /// a worker is already running or the controller was finalized.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        if self.inner.is_finalized() {
            return false;
        }
        let mut worker = self.inner.lock_worker();
        if worker.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("update worker already running");
            return false;
        }
        *worker = Some(tokio::spawn(worker_loop(Arc::downgrade(&self.inner))));
        true
    }

    /// Start the worker and wait up to `startup_wait` for the first result.
    /// Returns whatever state was reached; never fails.
    pub async fn initialize(&self) -> UpdateState {
        self.start();
        self.wait_until_settled(self.inner.config.startup_wait).await
    }

    /// Current state snapshot.
    pub fn status(&self) -> UpdateState {
        self.inner.state.borrow().clone()
    }

    /// Receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<UpdateState> {
        self.inner.state.subscribe()
    }

    /// Wait at most `timeout` for a settled state, then return the current
    /// state either way.
    pub async fn wait_until_settled(&self, timeout: Duration) -> UpdateState {
        let mut rx = self.subscribe();
        let settled = tokio::time::timeout(timeout, rx.wait_for(UpdateState::is_settled))
            .await
            .ok()
            .and_then(|res| res.ok().map(|state| (*state).clone()));
        settled.unwrap_or_else(|| self.status())
    }

    /// Run one cycle on the caller's task, serialized with the worker.
    pub async fn check_now(&self) -> UpdateState {
        self.inner.run_cycle().await
    }

    /// Stop the worker and hand a staged artifact to the installer.
    ///
    /// Waits up to `startup_wait` for an in-flight cycle. Past that the cycle
    /// is cancelled, whichever task runs it, and this run counts as "no
    /// update": nothing is handed off. Hands off at most once per controller.
    pub async fn finalize(&self) -> FinalizeOutcome {
        let inner = &self.inner;
        inner.finalized.store(true, Ordering::SeqCst);

        let wait = inner.config.startup_wait;
        let _guard = match tokio::time::timeout(wait, inner.cycle_lock.lock()).await {
            Ok(guard) => guard,
            Err(_) => {
                warn!(
                    waited_ms = wait.as_millis() as u64,
                    "update cycle still running at shutdown; cancelling it"
                );
                inner.shutdown.send_replace(true);
                let unwound = tokio::time::timeout(CANCEL_GRACE, inner.cycle_lock.lock())
                    .await
                    .is_ok();
                if !unwound {
                    warn!("cancelled cycle has not released the cycle lock");
                }
                self.stop_worker().await;
                METRICS.flush();
                return FinalizeOutcome::NothingStaged;
            }
        };
        self.stop_worker().await;

        let artifact = match self.status() {
            UpdateState::UpdateAvailable(artifact) => {
                inner.state.send_replace(UpdateState::Idle);
                Some(artifact)
            }
            _ => None,
        };

        let outcome = match artifact {
            None => FinalizeOutcome::NothingStaged,
            Some(artifact) => match inner.installer.apply(&artifact).await {
                Ok(()) => {
                    obs::emit_handoff(&artifact.version, &artifact.path, true);
                    FinalizeOutcome::HandedOff(artifact)
                }
                Err(e) => {
                    warn!(error = %e, "installer hand-off failed");
                    obs::emit_handoff(&artifact.version, &artifact.path, false);
                    FinalizeOutcome::HandoffFailed {
                        artifact,
                        error: e.to_string(),
                    }
                }
            },
        };

        METRICS.flush();
        outcome
    }

    async fn stop_worker(&self) {
        let handle = self.inner.lock_worker().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
    }
}
