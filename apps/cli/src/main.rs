//! FastSync CLI - Manifest-driven file synchronization
//!
//! Brings a local directory in line with a remote manifest, fetching only
//! what is missing or damaged.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use url::Url;

/// FastSync - Resumable, verified file sync
#[derive(Parser)]
#[command(name = "fastsync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Output format
    #[arg(long, default_value = "human")]
    output: OutputFormat,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum OutputFormat {
    Human,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize the local root with a manifest
    Sync {
        /// Manifest listing the files to sync
        #[arg(short, long, env = "FASTSYNC_MANIFEST")]
        manifest: PathBuf,

        /// Config file naming the local root
        #[arg(short, long, env = "FASTSYNC_CONFIG")]
        config: PathBuf,

        /// Max transfers in flight at once
        #[arg(long, default_value_t = 2)]
        max_downloads: usize,

        /// Worker count (defaults to three per CPU)
        #[arg(long)]
        workers: Option<usize>,

        /// Tasks that may wait in the queue
        #[arg(long)]
        queue_capacity: Option<usize>,

        /// Restarts allowed per file after corruption
        #[arg(long)]
        max_restarts: Option<u32>,

        /// Exit with status 1 if any file failed
        #[arg(long)]
        strict: bool,
    },

    /// Generate a manifest from a local directory
    Index {
        /// Directory to index
        dir: PathBuf,

        /// Server base URL the files will be served from
        #[arg(short, long)]
        server: Url,

        /// Where to write the manifest
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries throughput and results
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    // Execute command
    let code = match cli.command {
        Commands::Sync {
            manifest,
            config,
            max_downloads,
            workers,
            queue_capacity,
            max_restarts,
            strict,
        } => {
            let args = commands::SyncArgs {
                manifest,
                config,
                max_downloads,
                workers,
                queue_capacity,
                max_restarts,
                strict,
            };
            commands::sync(args, cli.output).await?
        }

        Commands::Index {
            dir,
            server,
            output,
        } => {
            commands::index(&dir, server, &output, cli.output).await?;
            ExitCode::SUCCESS
        }

        Commands::Completions { shell } => {
            use clap::CommandFactory;
            clap_complete::generate(shell, &mut Cli::command(), "fastsync", &mut std::io::stdout());
            ExitCode::SUCCESS
        }
    };

    Ok(code)
}
