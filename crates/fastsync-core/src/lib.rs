//! FastSync Core - Sync Engine
//!
//! This crate brings a local directory in line with a manifest served over
//! HTTP. It handles resumable transfers, checksum verification, corruption
//! recovery and throughput reporting.

mod engine;
mod error;
mod index;
mod storage;

pub use engine::*;
pub use error::*;
pub use index::*;
pub use storage::*;

use chrono::Utc;
use fastsync_types::{Manifest, SyncSettings, SyncSummary, TaskFailure};
use reqwest::Client;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The main FastSync instance
pub struct FastSync {
    settings: SyncSettings,
    /// HTTP client shared by every task
    client: Client,
    /// Bytes received across all transfers since the last sample
    meter: RateMeter,
    /// Session-wide cancellation, parent of every task token
    cancel: CancellationToken,
}

impl FastSync {
    /// Create a new instance, validating the settings
    pub fn new(settings: SyncSettings) -> Result<Self, SyncError> {
        if settings.workers == 0 {
            return Err(SyncError::InvalidSettings("workers must be at least 1".into()));
        }
        if settings.max_concurrent_downloads == 0 {
            return Err(SyncError::InvalidSettings(
                "max concurrent downloads must be at least 1".into(),
            ));
        }
        if settings.queue_capacity == 0 {
            return Err(SyncError::InvalidSettings(
                "queue capacity must be at least 1".into(),
            ));
        }
        if settings.report_interval_ms == 0 {
            return Err(SyncError::InvalidSettings(
                "report interval must be positive".into(),
            ));
        }

        let client = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .build()
            .map_err(|e| SyncError::InvalidSettings(e.to_string()))?;

        Ok(Self {
            settings,
            client,
            meter: RateMeter::new(),
            cancel: CancellationToken::new(),
        })
    }

    /// Cancelling this token stops every task of the current run
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Synchronize every manifest entry into `local_root`.
    ///
    /// Throughput lines go to `out` once per report interval until all tasks
    /// have finished. Individual task failures are collected in the summary;
    /// only an unusable manifest fails the whole run.
    pub async fn run<W: Write>(
        &self,
        manifest: Manifest,
        local_root: &Path,
        out: W,
    ) -> Result<SyncSummary, SyncError> {
        if manifest.server.cannot_be_a_base() {
            return Err(SyncError::InvalidUrl(manifest.server.to_string()));
        }

        let started_at = Utc::now();
        info!(
            "Syncing {} files from {} into {} ({} workers, {} concurrent downloads)",
            manifest.len(),
            manifest.server,
            local_root.display(),
            self.settings.workers,
            self.settings.max_concurrent_downloads
        );

        let ctx = TaskContext::new(
            self.client.clone(),
            self.meter.clone(),
            self.settings.max_concurrent_downloads,
            self.settings.max_restarts,
        );
        let scheduler = Scheduler::new(self.settings.workers, self.settings.queue_capacity, ctx);

        // Producer runs alongside the workers and closes the queue by
        // dropping its submitter once every entry is enqueued
        let submitter = scheduler.submitter();
        let server = manifest.server.clone();
        let root = local_root.to_path_buf();
        let cancel = self.cancel.clone();
        let producer = tokio::spawn(async move {
            let mut submitted = 0usize;
            for entry in manifest.files {
                let task = DownloadTask::new(entry, server.clone(), root.clone())
                    .with_cancellation(cancel.child_token());
                if submitter.submit(task).await.is_err() {
                    break;
                }
                submitted += 1;
            }
            submitted
        });

        let mut reporter = Reporter::new(
            self.meter.clone(),
            Duration::from_millis(self.settings.report_interval_ms),
            out,
        );
        let reports = reporter.run_until(scheduler.join()).await;

        match producer.await {
            Ok(submitted) => debug!("Producer submitted {} tasks", submitted),
            Err(e) => warn!("Producer terminated abnormally: {}", e),
        }

        let mut summary = SyncSummary::new(started_at);
        for report in reports {
            match report.result {
                Ok(outcome) => summary.record_outcome(&outcome),
                Err(e) => summary.record_failure(TaskFailure {
                    path: report.path,
                    kind: e.kind(),
                    message: e.to_string(),
                }),
            }
        }
        summary.failed.sort_by(|a, b| a.path.cmp(&b.path));
        summary.finished_at = Utc::now();

        info!(
            "Sync finished: {} downloaded, {} up to date, {} failed",
            summary.downloaded,
            summary.skipped,
            summary.failed.len()
        );

        Ok(summary)
    }
}
