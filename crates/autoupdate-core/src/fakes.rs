//! In-memory fakes for the hand-off seam (testing only)
//!
//! `RecordingInstaller` satisfies the [`Installer`] contract without touching
//! processes or marker files.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::download::StagedArtifact;
use crate::error::InstallError;
use crate::installer::Installer;

// ---------------------------------------------------------------------------
// RecordingInstaller
// ---------------------------------------------------------------------------

/// Installer that remembers every artifact it was handed.
#[derive(Debug, Default)]
pub struct RecordingInstaller {
    applied: Mutex<Vec<StagedArtifact>>,
    fail_with: Option<String>,
}

impl RecordingInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    /// An installer whose every `apply` fails to launch with `reason`.
    /// Attempts are still recorded.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            applied: Mutex::new(Vec::new()),
            fail_with: Some(reason.into()),
        }
    }

    /// Snapshot of all hand-offs so far, oldest first.
    pub fn applied(&self) -> Vec<StagedArtifact> {
        self.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<StagedArtifact>> {
        self.applied.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl Installer for RecordingInstaller {
    async fn apply(&self, artifact: &StagedArtifact) -> Result<(), InstallError> {
        self.lock().push(artifact.clone());
        match &self.fail_with {
            Some(reason) => Err(InstallError::Launch {
                program: "recording-installer".to_string(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::Sha256Digest;
    use crate::version::Version;

    fn artifact() -> StagedArtifact {
        StagedArtifact {
            path: "/stage/update-1.0.1.zip".into(),
            digest: Sha256Digest::from_bytes(b"pkg"),
            size: 3,
            version: Version::new(1, 0, 1),
        }
    }

    #[tokio::test]
    async fn test_records_handoffs() {
        let installer = RecordingInstaller::new();
        installer.apply(&artifact()).await.unwrap();
        assert_eq!(installer.count(), 1);
        assert_eq!(installer.applied()[0].version, Version::new(1, 0, 1));
    }

    #[tokio::test]
    async fn test_failing_still_records() {
        let installer = RecordingInstaller::failing("no disk");
        assert!(installer.apply(&artifact()).await.is_err());
        assert_eq!(installer.count(), 1);
    }
}
