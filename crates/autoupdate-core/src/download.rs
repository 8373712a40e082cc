//! Streaming package download with size cap and digest verification.
//!
//! Bytes are written to a `.partial` temp file next to the destination and
//! hashed as they arrive. The temp file is removed on every error path and
//! when the download future is dropped; only a verified file is renamed
//! onto the destination.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::digest::Sha256Digest;
use crate::error::DownloadError;
use crate::http::{classify, Transport};
use crate::metrics::METRICS;
use crate::version::Version;

/// Suffix of in-flight download files. Such files are never trusted.
pub const PARTIAL_SUFFIX: &str = ".partial";

/// A downloaded package whose digest matched the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedArtifact {
    pub path: PathBuf,
    pub digest: Sha256Digest,
    pub size: u64,
    pub version: Version,
}

/// Bytes received so far by an in-flight download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub received: u64,
    /// The advertised `Content-Length`, when the server sent one.
    pub total: Option<u64>,
}

/// Everything one download needs.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub destination: PathBuf,
    pub max_size: u64,
    pub expected_digest: Sha256Digest,
    pub timeout: Duration,
    /// Version the package claims to be; recorded on the artifact.
    pub version: Version,
}

/// Streams packages to disk.
#[derive(Debug, Clone)]
pub struct PackageDownloader {
    client: reqwest::Client,
}

impl PackageDownloader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Download, cap, verify, then atomically stage at `req.destination`.
    pub async fn download(&self, req: &DownloadRequest) -> Result<StagedArtifact, DownloadError> {
        self.download_with_progress(req, |_| {}).await
    }

    /// Like [`download`](Self::download), calling `on_progress` once the
    /// response headers are in and again after every chunk written.
    pub async fn download_with_progress<F>(
        &self,
        req: &DownloadRequest,
        on_progress: F,
    ) -> Result<StagedArtifact, DownloadError>
    where
        F: Fn(DownloadProgress),
    {
        let limit_ms = req.timeout.as_millis() as u64;
        let transport = |e: reqwest::Error| match classify(&e) {
            Transport::Timeout => DownloadError::Timeout { limit_ms },
            Transport::Other => DownloadError::Connection(e.to_string()),
        };

        let mut response = self
            .client
            .get(&req.url)
            .timeout(req.timeout)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::BadStatus {
                status: status.as_u16(),
            });
        }

        let total = response.content_length();
        if let Some(advertised) = total {
            if advertised > req.max_size {
                return Err(DownloadError::TooLarge {
                    limit: req.max_size,
                    received: advertised,
                });
            }
        }

        let dir = parent_dir(&req.destination);
        tokio::fs::create_dir_all(dir).await?;

        // `temp_path` deletes the file when dropped, which covers early
        // returns and cancellation alike.
        let (std_file, temp_path) = tempfile::Builder::new()
            .prefix(".download-")
            .suffix(PARTIAL_SUFFIX)
            .tempfile_in(dir)?
            .into_parts();
        let mut file = tokio::fs::File::from_std(std_file);

        let mut hasher = Sha256::new();
        let mut written: u64 = 0;
        on_progress(DownloadProgress {
            received: 0,
            total,
        });

        while let Some(chunk) = response.chunk().await.map_err(transport)? {
            written += chunk.len() as u64;
            METRICS.add_bytes(chunk.len() as u64);
            if written > req.max_size {
                warn!(
                    limit = req.max_size,
                    received = written,
                    "package exceeded size limit mid-stream"
                );
                return Err(DownloadError::TooLarge {
                    limit: req.max_size,
                    received: written,
                });
            }
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
            on_progress(DownloadProgress {
                received: written,
                total,
            });
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        let actual = Sha256Digest::from_hasher(hasher);
        if actual != req.expected_digest {
            warn!(
                expected = %req.expected_digest.short(),
                actual = %actual.short(),
                "package digest mismatch"
            );
            return Err(DownloadError::DigestMismatch {
                expected: req.expected_digest.clone(),
                actual,
            });
        }

        restrict_permissions(&temp_path)?;
        temp_path
            .persist(&req.destination)
            .map_err(|e| DownloadError::Io(e.error.to_string()))?;

        debug!(
            path = %req.destination.display(),
            size = written,
            "package verified and staged"
        );

        Ok(StagedArtifact {
            path: req.destination.clone(),
            digest: actual,
            size: written,
            version: req.version,
        })
    }
}

/// Staged file name for `version`, keeping the extension of the URL's last
/// path segment (`.../update.zip` → `update-1.2.0.zip`).
pub fn staged_file_name(update_url: &str, version: &Version) -> String {
    let last_segment = reqwest::Url::parse(update_url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .unwrap_or_default();

    match Path::new(&last_segment).extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => format!("update-{version}.{ext}"),
        _ => format!("update-{version}.pkg"),
    }
}

/// Remove `*.partial` leftovers in `dir` (e.g. from a killed process).
/// Returns how many were removed. A missing directory is not an error.
pub async fn sweep_partials(dir: &Path) -> std::io::Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if name.to_string_lossy().ends_with(PARTIAL_SUFFIX) {
            tokio::fs::remove_file(entry.path()).await?;
            removed += 1;
        }
    }
    if removed > 0 {
        debug!(dir = %dir.display(), removed, "swept stale partial downloads");
    }
    Ok(removed)
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    let _ = path;
    Ok(())
}
