//! Error types for FastSync core

use fastsync_types::{Checksum, FailureKind};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the sync engine
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Failed to load {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Path escapes the local root: {0}")]
    PathEscapesRoot(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Transfer interrupted: {0}")]
    Stream(std::io::Error),

    #[error("Server error: {status} for {url}")]
    ServerError { status: u16, url: String },

    #[error("Range starting at byte {offset} not satisfiable, local copy is stale")]
    RangeNotSatisfiable { offset: u64 },

    #[error("Server answered a range starting at byte {actual}, requested {expected}")]
    UnexpectedRange { expected: u64, actual: u64 },

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: Checksum, actual: Checksum },

    #[error("Giving up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<SyncError> },

    #[error("Task was cancelled")]
    Cancelled,

    #[error("Task queue is full")]
    QueueFull,

    #[error("Task queue is closed")]
    QueueClosed,
}

impl SyncError {
    /// Corruption is the only failure a task recovers from, by deleting the
    /// local file and starting over
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            SyncError::RangeNotSatisfiable { .. }
                | SyncError::UnexpectedRange { .. }
                | SyncError::ChecksumMismatch { .. }
        )
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            SyncError::Config { .. } | SyncError::InvalidSettings(_) | SyncError::InvalidUrl(_) => {
                FailureKind::Config
            }
            SyncError::PathEscapesRoot(_) => FailureKind::PathSecurity,
            SyncError::Io(_) | SyncError::QueueFull | SyncError::QueueClosed => FailureKind::Io,
            SyncError::Network(_) | SyncError::Stream(_) | SyncError::ServerError { .. } => {
                FailureKind::Network
            }
            SyncError::RangeNotSatisfiable { .. }
            | SyncError::UnexpectedRange { .. }
            | SyncError::ChecksumMismatch { .. } => FailureKind::Corruption,
            SyncError::RetriesExhausted { last, .. } => last.kind(),
            SyncError::Cancelled => FailureKind::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_corruption_is_recoverable() {
        assert!(SyncError::RangeNotSatisfiable { offset: 3 }.is_corruption());
        assert!(SyncError::UnexpectedRange {
            expected: 2,
            actual: 0
        }
        .is_corruption());
        assert!(!SyncError::ServerError {
            status: 404,
            url: "http://x/a".into()
        }
        .is_corruption());
        assert!(!SyncError::PathEscapesRoot("../a".into()).is_corruption());
    }

    #[test]
    fn exhausted_retries_keep_the_underlying_kind() {
        let err = SyncError::RetriesExhausted {
            attempts: 4,
            last: Box::new(SyncError::RangeNotSatisfiable { offset: 0 }),
        };
        assert_eq!(err.kind(), FailureKind::Corruption);
        assert!(!err.is_corruption());
    }
}
