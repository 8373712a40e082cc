//! Remote version manifest: shape and single-attempt fetch.
//!
//! The manifest is a JSON object:
//!
//! ```json
//! {
//!   "version": "1.0.1",
//!   "sha256": "<64 hex chars>",
//!   "description": "Fixes the frobnicator",
//!   "release_date": "2024-05-01",
//!   "min_required": "1.0.0"
//! }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::digest::Sha256Digest;
use crate::error::FetchError;
use crate::http::{classify, Transport};
use crate::version::Version;

/// Manifests larger than this are rejected as malformed.
pub const MAX_MANIFEST_BYTES: usize = 1024 * 1024;

/// Latest-release description published by the update server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: Version,
    pub sha256: Sha256Digest,
    pub description: String,
    pub release_date: String,
    pub min_required: Version,
}

impl Manifest {
    /// Parse a manifest body. Any shape problem is `MalformedBody`.
    pub fn from_json(body: &[u8]) -> Result<Self, FetchError> {
        if body.len() > MAX_MANIFEST_BYTES {
            return Err(oversized(body.len() as u64));
        }
        serde_json::from_slice(body).map_err(|e| FetchError::MalformedBody(e.to_string()))
    }
}

/// Fetches the manifest with one GET per call. Retrying is the caller's job.
#[derive(Debug, Clone)]
pub struct ManifestFetcher {
    client: reqwest::Client,
}

impl ManifestFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// GET `url` and parse the body. `timeout` covers connect through the
    /// last body byte.
    pub async fn fetch(&self, url: &str, timeout: Duration) -> Result<Manifest, FetchError> {
        let limit_ms = timeout.as_millis() as u64;
        let transport = |e: reqwest::Error| match classify(&e) {
            Transport::Timeout => FetchError::Timeout { limit_ms },
            Transport::Other => FetchError::Connection(e.to_string()),
        };

        let mut response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::BadStatus {
                status: status.as_u16(),
            });
        }

        if let Some(advertised) = response.content_length() {
            if advertised > MAX_MANIFEST_BYTES as u64 {
                return Err(oversized(advertised));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(transport)? {
            if body.len() + chunk.len() > MAX_MANIFEST_BYTES {
                return Err(oversized((body.len() + chunk.len()) as u64));
            }
            body.extend_from_slice(&chunk);
        }
        Manifest::from_json(&body)
    }
}

fn oversized(bytes: u64) -> FetchError {
    FetchError::MalformedBody(format!(
        "manifest is {bytes} bytes (limit {MAX_MANIFEST_BYTES})"
    ))
}
