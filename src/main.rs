//! # docpipe CLI
//!
//! Loads a CSV dataset into the document store, runs its fixed battery of
//! aggregation analyses, and writes a plain-text run log (plus a JSON
//! export for the telemetry dataset).
//!
//! ## Usage
//!
//! ```bash
//! docpipe --config ./config/docpipe.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docpipe init` | Create the store database and schema |
//! | `docpipe run <telemetry\|sales\|all>` | Ingest, aggregate and report |
//! | `docpipe stats` | Record counts per configured collection |
//!
//! ## Examples
//!
//! ```bash
//! # Load lorawan_uplink_devices.csv and write Results/task1_output.txt
//! docpipe run telemetry
//!
//! # Re-report the orders already in the store
//! docpipe run sales --skip-ingest
//!
//! # Check that the source parses without touching the store
//! docpipe run all --dry-run
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docpipe::config;
use docpipe::datasets::DatasetKind;
use docpipe::migrate;
use docpipe::run::{self, RunOptions};
use docpipe::stats;

/// docpipe: CSV to document store to aggregation report.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Without it, `./config/docpipe.toml` is used when present and the
/// built-in defaults otherwise.
#[derive(Parser)]
#[command(
    name = "docpipe",
    about = "Load CSV datasets into a document store and report fixed aggregations",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the store schema. Safe to run repeatedly.
    Init,

    /// Run a dataset pipeline: ingest, aggregate, report.
    Run {
        /// Dataset to run: `telemetry`, `sales`, or `all`.
        dataset: String,

        /// Parse the source and print the record count without writing
        /// to the store or the results directory.
        #[arg(long)]
        dry_run: bool,

        /// Skip ingestion and report over the collection's current contents.
        #[arg(long)]
        skip_ingest: bool,
    },

    /// Show record counts per configured collection.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::resolve_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Run {
            dataset,
            dry_run,
            skip_ingest,
        } => {
            let kinds = DatasetKind::parse_selection(&dataset)?;
            run::run_datasets(
                &cfg,
                &kinds,
                RunOptions {
                    dry_run,
                    skip_ingest,
                },
            )
            .await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
