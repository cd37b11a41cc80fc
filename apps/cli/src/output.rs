//! Output formatting utilities

use crate::OutputFormat;
use console::style;
use fastsync_types::SyncSummary;
use serde::Serialize;
use std::fmt;

/// Print output in the specified format
pub fn print_output<T: Serialize + fmt::Display>(
    value: &T,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Human => {
            println!("{}", value);
        }
    }
    Ok(())
}

/// Format bytes as human-readable
pub fn format_bytes(bytes: u64) -> String {
    human_bytes::human_bytes(bytes as f64)
}

/// Format elapsed seconds as human-readable
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        return format!("{:.1}s", seconds);
    }

    let total = seconds.round() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else {
        format!("{}m {}s", minutes, secs)
    }
}

/// Final report of a sync run
#[derive(Serialize)]
#[serde(transparent)]
pub struct SummaryView<'a>(pub &'a SyncSummary);

impl fmt::Display for SummaryView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary = self.0;
        let icon = if summary.is_success() {
            style("✓").green().bold()
        } else {
            style("✗").red().bold()
        };

        writeln!(
            f,
            "{} Synced {} files in {}",
            icon,
            style(summary.total).bold(),
            format_duration(summary.elapsed_secs())
        )?;
        writeln!(
            f,
            "  Downloaded: {} ({})",
            summary.downloaded,
            format_bytes(summary.bytes_transferred)
        )?;
        writeln!(f, "  Up to date: {}", summary.skipped)?;
        write!(f, "  Failed:     {}", summary.failed.len())?;

        if !summary.failed.is_empty() {
            use tabled::{Table, Tabled};

            #[derive(Tabled)]
            struct FailureRow {
                path: String,
                kind: String,
                error: String,
            }

            let rows: Vec<FailureRow> = summary
                .failed
                .iter()
                .map(|failure| FailureRow {
                    path: failure.path.clone(),
                    kind: failure.kind.to_string(),
                    error: failure.message.clone(),
                })
                .collect();

            write!(f, "\n\n{}", Table::new(rows))?;
        }

        Ok(())
    }
}

/// Result of writing a manifest
#[derive(Serialize)]
pub struct IndexReport {
    pub files: usize,
    pub server: String,
    pub output: String,
}

impl fmt::Display for IndexReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Indexed {} files for {} into {}",
            style("✓").green().bold(),
            style(self.files).bold(),
            style(&self.server).cyan(),
            self.output
        )
    }
}
