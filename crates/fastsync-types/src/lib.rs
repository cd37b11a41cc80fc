//! Shared types for FastSync
//!
//! This crate contains the data structures shared between the sync engine
//! and the CLI: manifests, configuration, settings and run results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

/// Length in bytes of a SHA-1 digest.
pub const DIGEST_LEN: usize = 20;

// ============================================================================
// Manifest Types
// ============================================================================

/// The list of files to synchronize from a single server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    /// Base URL every entry path is resolved against
    pub server: Url,
    pub files: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(server: Url) -> Self {
        Self {
            version: 1,
            server,
            files: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// A single file of a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Path relative to both the server base URL and the local root
    pub path: String,
    #[serde(rename = "check")]
    pub checksum: Checksum,
}

impl ManifestEntry {
    pub fn new(path: impl Into<String>, checksum: Checksum) -> Self {
        Self {
            path: path.into(),
            checksum,
        }
    }
}

/// Lowercase hex encoding of a SHA-1 digest
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Checksum(String);

/// Rejected checksum text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChecksumError {
    #[error("checksum must be {expected} hex characters, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("checksum contains a non-hex character: {0:?}")]
    NotHex(String),
}

impl Checksum {
    /// Encode a raw digest
    pub fn from_digest(digest: &[u8]) -> Self {
        debug_assert_eq!(digest.len(), DIGEST_LEN);
        Self(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Checksum {
    type Err = ChecksumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != DIGEST_LEN * 2 {
            return Err(ChecksumError::Length {
                expected: DIGEST_LEN * 2,
                actual: s.len(),
            });
        }
        if !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ChecksumError::NotHex(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }
}

impl TryFrom<String> for Checksum {
    type Error = ChecksumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Checksum> for String {
    fn from(checksum: Checksum) -> Self {
        checksum.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Configuration Types
// ============================================================================

/// Local configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory every manifest path is written under
    pub armapath: PathBuf,
}

/// Engine tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Number of workers draining the task queue
    pub workers: usize,
    /// Maximum number of tasks transferring at the same time
    pub max_concurrent_downloads: usize,
    /// Capacity of the task queue between the producer and the workers
    pub queue_capacity: usize,
    /// How many times a corrupted file is deleted and fetched again
    pub max_restarts: u32,
    /// Throughput sampling period in milliseconds
    pub report_interval_ms: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            workers: num_cpus::get() * 3,
            max_concurrent_downloads: 2,
            queue_capacity: 64,
            max_restarts: 3,
            report_interval_ms: 1000,
            connect_timeout_secs: 30,
            user_agent: format!("FastSync/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// Terminal success of a single task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum TaskOutcome {
    /// The local file already matched its checksum
    Skipped,
    /// The file was fetched (possibly resumed) and verified
    Downloaded {
        /// Bytes received during the final attempt
        bytes: u64,
        /// Local length the final attempt resumed from
        resumed_from: u64,
        /// Corruption restarts before the final attempt
        restarts: u32,
    },
}

/// Failure categories of the sync engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Config,
    PathSecurity,
    Io,
    Network,
    Corruption,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Config => "config",
            FailureKind::PathSecurity => "path security",
            FailureKind::Io => "io",
            FailureKind::Network => "network",
            FailureKind::Corruption => "corruption",
            FailureKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// A task that ended without a verified file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFailure {
    pub path: String,
    pub kind: FailureKind,
    pub message: String,
}

/// Aggregate result of a sync run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSummary {
    pub total: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: Vec<TaskFailure>,
    /// Bytes received over the network during the run
    pub bytes_transferred: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncSummary {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            total: 0,
            downloaded: 0,
            skipped: 0,
            failed: Vec::new(),
            bytes_transferred: 0,
            started_at,
            finished_at: started_at,
        }
    }

    /// Fold one successful task into the totals
    pub fn record_outcome(&mut self, outcome: &TaskOutcome) {
        self.total += 1;
        match outcome {
            TaskOutcome::Skipped => self.skipped += 1,
            TaskOutcome::Downloaded { bytes, .. } => {
                self.downloaded += 1;
                self.bytes_transferred += bytes;
            }
        }
    }

    pub fn record_failure(&mut self, failure: TaskFailure) {
        self.total += 1;
        self.failed.push(failure);
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn elapsed_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}
