//! SHA-1 verification of files on disk

use crate::error::SyncError;
use fastsync_types::Checksum;
use sha1::{Digest, Sha1};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Hash the full current content of a file
pub async fn hash_file(path: &Path) -> Result<Checksum, SyncError> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(Checksum::from_digest(&hasher.finalize()))
}

/// Hash the file and fail with `ChecksumMismatch` if it differs from `expected`
pub async fn verify_file(path: &Path, expected: &Checksum) -> Result<(), SyncError> {
    let actual = hash_file(path).await?;
    if &actual != expected {
        return Err(SyncError::ChecksumMismatch {
            expected: expected.clone(),
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_known_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.pbo");
        tokio::fs::write(&path, b"hello").await.unwrap();

        let checksum = hash_file(&path).await.unwrap();
        assert_eq!(checksum.as_str(), "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
    }

    #[tokio::test]
    async fn test_hash_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        tokio::fs::write(&path, b"").await.unwrap();

        let checksum = hash_file(&path).await.unwrap();
        assert_eq!(checksum.as_str(), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[tokio::test]
    async fn test_verify_reports_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.pbo");
        tokio::fs::write(&path, b"hellO").await.unwrap();

        let expected: Checksum = "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d".parse().unwrap();
        let err = verify_file(&path, &expected).await.unwrap_err();
        assert!(err.is_corruption());
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = hash_file(&dir.path().join("nope")).await.unwrap_err();
        assert!(matches!(err, SyncError::Io(_)));
    }
}
