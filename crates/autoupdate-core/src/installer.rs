//! Install hand-off.
//!
//! The controller's job ends once a verified artifact is staged. At shutdown
//! it passes that artifact to an [`Installer`]; how the host binary actually
//! gets replaced is up to the implementation.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::digest::Sha256Digest;
use crate::download::StagedArtifact;
use crate::error::InstallError;
use crate::version::Version;

/// Receives the staged artifact at shutdown.
#[async_trait]
pub trait Installer: Send + Sync {
    /// Apply (or schedule) the install of `artifact`.
    async fn apply(&self, artifact: &StagedArtifact) -> Result<(), InstallError>;
}

fn ensure_present(artifact: &StagedArtifact) -> Result<(), InstallError> {
    if artifact.path.is_file() {
        Ok(())
    } else {
        Err(InstallError::ArtifactMissing(
            artifact.path.display().to_string(),
        ))
    }
}

// ---------------------------------------------------------------------------
// CommandInstaller
// ---------------------------------------------------------------------------

/// Launches an external installer program and returns without waiting.
///
/// The program is invoked as `<program> <args..> <artifact path> <sha256>
/// <version>` so it can re-verify the package after the host exits.
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandInstaller {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    fn command(&self, artifact: &StagedArtifact) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .arg(&artifact.path)
            .arg(artifact.digest.as_str())
            .arg(artifact.version.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false);
        cmd
    }
}

#[async_trait]
impl Installer for CommandInstaller {
    async fn apply(&self, artifact: &StagedArtifact) -> Result<(), InstallError> {
        ensure_present(artifact)?;
        let child = self
            .command(artifact)
            .spawn()
            .map_err(|e| InstallError::Launch {
                program: self.program.display().to_string(),
                reason: e.to_string(),
            })?;
        info!(
            program = %self.program.display(),
            pid = child.id().unwrap_or_default(),
            "installer launched"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// DeferredInstaller
// ---------------------------------------------------------------------------

/// Marker describing an install that should happen on next launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingInstall {
    pub path: PathBuf,
    pub sha256: Sha256Digest,
    pub size: u64,
    pub version: Version,
    pub staged_at: DateTime<Utc>,
}

/// Records the artifact in a JSON marker file for the next launch to pick up.
#[derive(Debug, Clone)]
pub struct DeferredInstaller {
    marker_path: PathBuf,
}

impl DeferredInstaller {
    pub fn new(marker_path: impl Into<PathBuf>) -> Self {
        Self {
            marker_path: marker_path.into(),
        }
    }

    pub fn marker_path(&self) -> &Path {
        &self.marker_path
    }

    /// Read and remove the marker. `Ok(None)` when nothing is pending.
    ///
    /// A marker whose package no longer matches its recorded digest is
    /// discarded and reported as `ArtifactMissing`.
    pub async fn take_pending(&self) -> Result<Option<PendingInstall>, InstallError> {
        let bytes = match tokio::fs::read(&self.marker_path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        tokio::fs::remove_file(&self.marker_path).await?;

        let pending: PendingInstall = serde_json::from_slice(&bytes)?;
        match Sha256Digest::of_file(&pending.path).await {
            Ok(actual) if actual == pending.sha256 => Ok(Some(pending)),
            _ => Err(InstallError::ArtifactMissing(
                pending.path.display().to_string(),
            )),
        }
    }
}

#[async_trait]
impl Installer for DeferredInstaller {
    async fn apply(&self, artifact: &StagedArtifact) -> Result<(), InstallError> {
        ensure_present(artifact)?;
        let pending = PendingInstall {
            path: artifact.path.clone(),
            sha256: artifact.digest.clone(),
            size: artifact.size,
            version: artifact.version,
            staged_at: Utc::now(),
        };
        if let Some(parent) = self.marker_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(&pending)?;
        tokio::fs::write(&self.marker_path, json).await?;
        info!(marker = %self.marker_path.display(), "install deferred to next launch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(dir: &Path, content: &[u8]) -> StagedArtifact {
        let path = dir.join("update-1.0.1.zip");
        std::fs::write(&path, content).unwrap();
        StagedArtifact {
            path,
            digest: Sha256Digest::from_bytes(content),
            size: content.len() as u64,
            version: Version::new(1, 0, 1),
        }
    }

    #[tokio::test]
    async fn test_deferred_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = stage(dir.path(), b"package");
        let installer = DeferredInstaller::new(dir.path().join("state/pending-update.json"));

        installer.apply(&artifact).await.unwrap();
        assert!(installer.marker_path().exists());

        let pending = installer.take_pending().await.unwrap().unwrap();
        assert_eq!(pending.path, artifact.path);
        assert_eq!(pending.sha256, artifact.digest);
        assert_eq!(pending.version, Version::new(1, 0, 1));

        // Consumed.
        assert!(installer.take_pending().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deferred_rejects_tampered_package() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = stage(dir.path(), b"package");
        let installer = DeferredInstaller::new(dir.path().join("pending-update.json"));
        installer.apply(&artifact).await.unwrap();

        std::fs::write(&artifact.path, b"tampered").unwrap();
        let err = installer.take_pending().await.unwrap_err();
        assert!(matches!(err, InstallError::ArtifactMissing(_)));
        assert!(!installer.marker_path().exists());
    }

    #[tokio::test]
    async fn test_apply_requires_artifact_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut artifact = stage(dir.path(), b"x");
        artifact.path = dir.path().join("gone.zip");

        let deferred = DeferredInstaller::new(dir.path().join("m.json"));
        assert!(matches!(
            deferred.apply(&artifact).await,
            Err(InstallError::ArtifactMissing(_))
        ));

        let command = CommandInstaller::new("true");
        assert!(matches!(
            command.apply(&artifact).await,
            Err(InstallError::ArtifactMissing(_))
        ));
    }

    #[tokio::test]
    async fn test_command_installer_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = stage(dir.path(), b"x");
        let installer = CommandInstaller::new(dir.path().join("no-such-installer"));
        let err = installer.apply(&artifact).await.unwrap_err();
        assert!(matches!(err, InstallError::Launch { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_installer_passes_artifact_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = stage(dir.path(), b"x");
        let out = dir.path().join("args.txt");
        let installer = CommandInstaller::new("sh").with_args([
            "-c".to_string(),
            format!("echo \"$@\" > {}", out.display()),
            "installer".to_string(),
        ]);

        installer.apply(&artifact).await.unwrap();

        // The child is detached; poll briefly for its output.
        let mut content = String::new();
        for _ in 0..50 {
            if let Ok(c) = std::fs::read_to_string(&out) {
                if !c.is_empty() {
                    content = c;
                    break;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(content.contains(artifact.digest.as_str()));
        assert!(content.contains("1.0.1"));
    }
}
