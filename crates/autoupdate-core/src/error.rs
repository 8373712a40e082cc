//! Error taxonomy for the update lifecycle.
//!
//! Component errors (`FetchError`, `DownloadError`) say whether they are
//! worth retrying through [`Retryable`]. All types are `Clone + PartialEq`
//! so a failure can be held inside `UpdateState::Failed`.

use crate::digest::{InvalidDigest, Sha256Digest};
use crate::version::{Version, VersionParseError};

/// Errors that can be classified as transient.
pub trait Retryable {
    /// `true` when a later attempt could plausibly succeed.
    fn is_retryable(&self) -> bool;
}

/// Errors from a single manifest fetch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("manifest request timed out after {limit_ms}ms")]
    Timeout { limit_ms: u64 },

    #[error("manifest server returned HTTP {status}")]
    BadStatus { status: u16 },

    #[error("malformed manifest: {0}")]
    MalformedBody(String),

    #[error("manifest request failed: {0}")]
    Connection(String),
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::BadStatus { .. } | FetchError::Connection(_) => {
                true
            }
            FetchError::MalformedBody(_) => false,
        }
    }
}

impl From<VersionParseError> for FetchError {
    fn from(err: VersionParseError) -> Self {
        FetchError::MalformedBody(err.to_string())
    }
}

impl From<InvalidDigest> for FetchError {
    fn from(err: InvalidDigest) -> Self {
        FetchError::MalformedBody(err.to_string())
    }
}

/// Errors from a single package download.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DownloadError {
    #[error("package download timed out after {limit_ms}ms")]
    Timeout { limit_ms: u64 },

    #[error("package server returned HTTP {status}")]
    BadStatus { status: u16 },

    #[error("package exceeds size limit: {received} bytes > {limit} bytes")]
    TooLarge { limit: u64, received: u64 },

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch {
        expected: Sha256Digest,
        actual: Sha256Digest,
    },

    #[error("package request failed: {0}")]
    Connection(String),

    #[error("staging io error: {0}")]
    Io(String),
}

impl Retryable for DownloadError {
    fn is_retryable(&self) -> bool {
        match self {
            DownloadError::Timeout { .. }
            | DownloadError::BadStatus { .. }
            | DownloadError::Connection(_) => true,
            DownloadError::TooLarge { .. }
            | DownloadError::DigestMismatch { .. }
            | DownloadError::Io(_) => false,
        }
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(err: std::io::Error) -> Self {
        DownloadError::Io(err.to_string())
    }
}

/// Why a check cycle ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpdateError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    /// The client is below `min_required` but the advertised version does
    /// not reach it either.
    #[error(
        "inconsistent manifest: current {current} is below min_required {min_required} \
         but remote version {remote} does not reach it"
    )]
    InconsistentManifest {
        current: Version,
        remote: Version,
        min_required: Version,
    },

    #[error("update cycle exceeded its {ceiling_ms}ms ceiling")]
    CycleTimeout { ceiling_ms: u64 },

    #[error("staging directory error: {0}")]
    Staging(String),

    #[error("http client initialisation failed: {0}")]
    HttpClient(String),
}

impl UpdateError {
    /// `true` for failures that mean the server response itself was bad.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            UpdateError::Fetch(FetchError::MalformedBody(_)) | UpdateError::InconsistentManifest { .. }
        )
    }

    /// `true` for any timeout, per call or for the whole cycle.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            UpdateError::Fetch(FetchError::Timeout { .. })
                | UpdateError::Download(DownloadError::Timeout { .. })
                | UpdateError::CycleTimeout { .. }
        )
    }
}

/// Errors from the install hand-off.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("staged artifact missing at {0}")]
    ArtifactMissing(String),

    #[error("failed to launch installer {program}: {reason}")]
    Launch { program: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for controller operations.
pub type Result<T> = std::result::Result<T, UpdateError>;
