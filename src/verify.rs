//! Streaming SHA-256 verification of downloaded images.

use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Catalogs that have no real checksum yet publish this placeholder.
pub const CHECKSUM_PLACEHOLDER: &str = "...";

/// Read buffer for hashing; large enough to keep multi-gigabyte images moving.
const HASH_BUFFER_SIZE: usize = 128 * 1024;

#[derive(Debug, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The digest matched the catalog's expected value.
    Verified,
    /// No usable expected checksum; integrity was not confirmed.
    Skipped,
    /// The digest differed. Callers must treat this as fatal.
    Mismatch { expected: String, actual: String },
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("failed to read `{path}`: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("verification task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Verify `path` against an expected hex-encoded SHA-256 digest.
///
/// An absent, empty, or placeholder checksum yields [`VerifyOutcome::Skipped`],
/// never an error. The expected value is compared case-insensitively against
/// the lowercase hex digest of the file.
pub async fn verify_file(
    path: &Path,
    expected: Option<&str>,
) -> Result<VerifyOutcome, VerifyError> {
    let expected = match expected {
        Some(sum) if !sum.is_empty() && sum != CHECKSUM_PLACEHOLDER => sum.to_ascii_lowercase(),
        _ => {
            debug!(path = %path.display(), "No expected checksum, skipping verification");
            return Ok(VerifyOutcome::Skipped);
        }
    };

    let owned_path = path.to_path_buf();
    let actual = tokio::task::spawn_blocking(move || hash_file_sync(&owned_path)).await??;

    if actual == expected {
        info!(path = %path.display(), "Checksum verified");
        Ok(VerifyOutcome::Verified)
    } else {
        Ok(VerifyOutcome::Mismatch { expected, actual })
    }
}

/// Hash a file with SHA-256, streaming in chunks so whole images are never
/// held in memory.
fn hash_file_sync(path: &Path) -> Result<String, VerifyError> {
    let file = std::fs::File::open(path).map_err(|e| VerifyError::Read {
        path: path.display().to_string(),
        source: e,
    })?;

    let mut reader = std::io::BufReader::with_capacity(HASH_BUFFER_SIZE, file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; HASH_BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer).map_err(|e| VerifyError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    // SHA-256 of the literal bytes b"hello world".
    const HELLO_WORLD_SHA256: &str =
        "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[tokio::test]
    async fn absent_checksum_is_skipped() {
        let outcome = verify_file(Path::new("does-not-matter"), None).await.unwrap();
        assert_eq!(outcome, VerifyOutcome::Skipped);
    }

    #[tokio::test]
    async fn empty_checksum_is_skipped() {
        let outcome = verify_file(Path::new("does-not-matter"), Some(""))
            .await
            .unwrap();
        assert_eq!(outcome, VerifyOutcome::Skipped);
    }

    #[tokio::test]
    async fn placeholder_checksum_is_skipped() {
        let outcome = verify_file(Path::new("does-not-matter"), Some(CHECKSUM_PLACEHOLDER))
            .await
            .unwrap();
        assert_eq!(outcome, VerifyOutcome::Skipped);
    }

    #[tokio::test]
    async fn matching_digest_is_verified() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("image.iso");
        std::fs::write(&path, b"hello world").unwrap();

        let outcome = verify_file(&path, Some(HELLO_WORLD_SHA256)).await.unwrap();
        assert_eq!(outcome, VerifyOutcome::Verified);
    }

    #[tokio::test]
    async fn uppercase_expected_digest_still_verifies() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("image.iso");
        std::fs::write(&path, b"hello world").unwrap();

        let upper = HELLO_WORLD_SHA256.to_ascii_uppercase();
        let outcome = verify_file(&path, Some(&upper)).await.unwrap();
        assert_eq!(outcome, VerifyOutcome::Verified);
    }

    #[tokio::test]
    async fn mutated_content_is_a_mismatch() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("image.iso");
        // One byte away from the content the expected digest was taken over.
        std::fs::write(&path, b"hello worle").unwrap();

        match verify_file(&path, Some(HELLO_WORLD_SHA256)).await.unwrap() {
            VerifyOutcome::Mismatch { expected, actual } => {
                assert_eq!(expected, HELLO_WORLD_SHA256);
                assert_ne!(actual, expected);
            }
            other => panic!("expected Mismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreadable_file_is_a_read_error() {
        let result = verify_file(Path::new("/no/such/file.iso"), Some(HELLO_WORLD_SHA256)).await;
        assert!(matches!(result, Err(VerifyError::Read { .. })));
    }
}
