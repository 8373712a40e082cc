//! SHA-256 content digests for update packages.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

/// Error returned when a string is not a valid SHA-256 hex digest.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid sha256 digest: {0:?}")]
pub struct InvalidDigest(pub String);

/// SHA-256 digest as 64 lowercase hex characters.
///
/// The inner field is private so the string is always valid: it is either
/// produced by hashing or validated (and lowercased) via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sha256Digest(String);

impl Sha256Digest {
    /// Hex length of a SHA-256 digest.
    pub const HEX_LEN: usize = 64;

    /// Compute the digest of in-memory bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self::from_hasher(hasher)
    }

    /// Finish an incremental hasher.
    pub fn from_hasher(hasher: Sha256) -> Self {
        Sha256Digest(hex::encode(hasher.finalize()))
    }

    /// Hash a file on disk without loading it whole.
    pub async fn of_file(path: &Path) -> std::io::Result<Self> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self::from_hasher(hasher))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars) for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl TryFrom<String> for Sha256Digest {
    type Error = InvalidDigest;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s.len() != Self::HEX_LEN || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(InvalidDigest(s));
        }
        Ok(Sha256Digest(s.to_ascii_lowercase()))
    }
}

impl std::str::FromStr for Sha256Digest {
    type Err = InvalidDigest;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_string())
    }
}

impl From<Sha256Digest> for String {
    fn from(d: Sha256Digest) -> Self {
        d.0
    }
}

impl std::fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes_known_value() {
        // sha256("hello world")
        let d = Sha256Digest::from_bytes(b"hello world");
        assert_eq!(
            d.as_str(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(d.short(), "b94d27b9934d");
    }

    #[test]
    fn test_try_from_lowercases() {
        let upper = "B94D27B9934D3E08A52E52D7DA7DABFAC484EFE37A5380EE9088F7ACE2EFCDE9";
        let d = Sha256Digest::try_from(upper.to_string()).unwrap();
        assert_eq!(d, Sha256Digest::from_bytes(b"hello world"));
    }

    #[test]
    fn test_try_from_rejects_bad_input() {
        assert!(Sha256Digest::try_from("abc".to_string()).is_err());
        assert!(Sha256Digest::try_from("z".repeat(64)).is_err());
        assert!(Sha256Digest::try_from("a".repeat(65)).is_err());
    }

    #[tokio::test]
    async fn test_of_file_matches_from_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        let data = vec![0x5Au8; 200_000];
        std::fs::write(&path, &data).unwrap();

        let d = Sha256Digest::of_file(&path).await.unwrap();
        assert_eq!(d, Sha256Digest::from_bytes(&data));
    }
}
