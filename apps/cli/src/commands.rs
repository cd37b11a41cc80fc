//! CLI command implementations

use crate::output::{print_output, IndexReport, SummaryView};
use crate::OutputFormat;
use anyhow::{Context, Result};
use fastsync_core::{build_manifest, load_config, load_manifest, save_manifest, FastSync};
use fastsync_types::SyncSettings;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::warn;
use url::Url;

/// Exit status after Ctrl-C
const EXIT_INTERRUPTED: u8 = 130;

pub struct SyncArgs {
    pub manifest: PathBuf,
    pub config: PathBuf,
    pub max_downloads: usize,
    pub workers: Option<usize>,
    pub queue_capacity: Option<usize>,
    pub max_restarts: Option<u32>,
    pub strict: bool,
}

impl SyncArgs {
    fn settings(&self) -> SyncSettings {
        let defaults = SyncSettings::default();
        SyncSettings {
            max_concurrent_downloads: self.max_downloads,
            workers: self.workers.unwrap_or(defaults.workers),
            queue_capacity: self.queue_capacity.unwrap_or(defaults.queue_capacity),
            max_restarts: self.max_restarts.unwrap_or(defaults.max_restarts),
            ..defaults
        }
    }
}

// ============================================================================
// Sync
// ============================================================================

pub async fn sync(args: SyncArgs, format: OutputFormat) -> Result<ExitCode> {
    // Nothing runs until both files load
    let config = load_config(&args.config).await?;
    let manifest = load_manifest(&args.manifest).await?;

    let sync = FastSync::new(args.settings())?;

    let cancel = sync.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling remaining transfers");
            cancel.cancel();
        }
    });

    // Keep stdout clean for the JSON document
    let summary = match format {
        OutputFormat::Human => {
            sync.run(manifest, &config.armapath, std::io::stdout())
                .await?
        }
        OutputFormat::Json => {
            sync.run(manifest, &config.armapath, std::io::stderr())
                .await?
        }
    };

    print_output(&SummaryView(&summary), format)?;

    if sync.cancellation_token().is_cancelled() {
        return Ok(ExitCode::from(EXIT_INTERRUPTED));
    }
    if args.strict && !summary.is_success() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// Index
// ============================================================================

pub async fn index(dir: &Path, server: Url, output: &Path, format: OutputFormat) -> Result<()> {
    let manifest = build_manifest(dir, server)
        .await
        .with_context(|| format!("Failed to index {}", dir.display()))?;
    save_manifest(output, &manifest).await?;

    let report = IndexReport {
        files: manifest.len(),
        server: manifest.server.to_string(),
        output: output.display().to_string(),
    };
    print_output(&report, format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let args = SyncArgs {
            manifest: PathBuf::from("m.json"),
            config: PathBuf::from("c.json"),
            max_downloads: 4,
            workers: None,
            queue_capacity: Some(8),
            max_restarts: Some(0),
            strict: false,
        };

        let settings = args.settings();
        let defaults = SyncSettings::default();
        assert_eq!(settings.max_concurrent_downloads, 4);
        assert_eq!(settings.workers, defaults.workers);
        assert_eq!(settings.queue_capacity, 8);
        assert_eq!(settings.max_restarts, 0);
        assert_eq!(settings.report_interval_ms, defaults.report_interval_ms);
    }
}
