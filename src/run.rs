//! Dataset pipeline orchestration.
//!
//! Drives one dataset end to end: load the source file into its collection,
//! run the analysis battery, and stream each result into the run log. The
//! steps are strictly sequential and the run log is written even when some
//! analyses fail.

use std::io::Write;

use anyhow::{bail, Result};
use tracing::{error, info, warn};

use crate::aggregate::run_analysis;
use crate::config::Config;
use crate::datasets::{Dataset, DatasetKind};
use crate::db;
use crate::error::IngestError;
use crate::loader;
use crate::migrate;
use crate::report::Reporter;
use crate::store::sqlite::SqliteStore;
use crate::store::{Collection, DocumentStore};

/// Flags from `docpipe run`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    pub skip_ingest: bool,
}

/// What happened during one pipeline run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Records inserted, or `None` when ingestion was skipped or failed.
    pub inserted: Option<u64>,
    pub analyses: usize,
    /// Names of the analyses that failed.
    pub failed: Vec<String>,
}

/// Run every selected dataset, even after one fails, and report all
/// failures together.
pub async fn run_datasets(config: &Config, kinds: &[DatasetKind], opts: RunOptions) -> Result<()> {
    let mut failures = Vec::new();
    for kind in kinds {
        if let Err(e) = run_dataset(config, *kind, opts).await {
            error!(dataset = %kind, error = %format!("{:#}", e), "dataset run failed");
            failures.push(format!("{}: {:#}", kind, e));
        }
    }
    if !failures.is_empty() {
        bail!(
            "{} of {} datasets failed: {}",
            failures.len(),
            kinds.len(),
            failures.join("; ")
        );
    }
    Ok(())
}

pub async fn run_dataset(config: &Config, kind: DatasetKind, opts: RunOptions) -> Result<()> {
    let dataset = kind.build(config);

    if opts.dry_run {
        let parsed = loader::read_source(&dataset.source)?;
        println!(
            "{}: {} records parsed from {} ({})",
            kind,
            parsed.records.len(),
            dataset.source.path.display(),
            parsed.encoding
        );
        println!("Dry run: nothing written.");
        return Ok(());
    }

    std::fs::create_dir_all(&config.output.dir)?;
    println!(
        "Running {}... Output will be saved to {}",
        kind,
        dataset.log_path.display()
    );

    let mut reporter = Reporter::create(&dataset.log_path)?;

    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    let store = SqliteStore::new(pool);

    let outcome = run_pipeline(&store, &dataset, &mut reporter, opts.skip_ingest).await;
    let flushed = reporter.finish();
    store.close().await;

    let summary = outcome?;
    flushed?;
    ensure_analyses_succeeded(kind, &summary)?;

    println!("{} completed.", kind);
    Ok(())
}

fn ensure_analyses_succeeded(kind: DatasetKind, summary: &RunSummary) -> Result<()> {
    if !summary.failed.is_empty() {
        bail!(
            "{} of {} analyses failed for {}: {}",
            summary.failed.len(),
            summary.analyses,
            kind,
            summary.failed.join(", ")
        );
    }
    Ok(())
}

/// Ingest (unless skipped) and run every analysis of `dataset` against
/// `store`, writing the run log through `reporter`.
///
/// Recoverable ingestion errors are written to the log and the analyses
/// still run over whatever the collection holds. Store failures during
/// ingestion abort the run.
pub async fn run_pipeline<W: Write>(
    store: &dyn DocumentStore,
    dataset: &Dataset,
    reporter: &mut Reporter<W>,
    skip_ingest: bool,
) -> Result<RunSummary> {
    let collection = Collection::new(store, &dataset.collection);
    let mut summary = RunSummary {
        analyses: dataset.analyses.len(),
        ..RunSummary::default()
    };

    if skip_ingest {
        info!(collection = %dataset.collection, "skipping ingestion");
    } else {
        if dataset.announce_loading {
            reporter.line("Loading data...")?;
        }
        match loader::load(&dataset.source, &collection).await {
            Ok(result) => {
                reporter.line(&format!(
                    "Inserted {} records into '{}'.",
                    result.count, dataset.collection.name
                ))?;
                summary.inserted = Some(result.count);
            }
            Err(e) if e.is_recoverable() => {
                warn!(collection = %dataset.collection, error = %e, "ingestion failed");
                reporter.line(&ingest_message(&e))?;
            }
            Err(e) => return Err(e.into()),
        }
    }

    for analysis in &dataset.analyses {
        let outcome = run_analysis(&collection, &analysis.spec).await;
        if let Err(e) = &outcome {
            warn!(analysis = %analysis.spec.name, error = %e, "analysis failed");
            summary.failed.push(analysis.spec.name.clone());
        }
        reporter.section(&analysis.section, &outcome, analysis.export.as_deref())?;
    }

    info!(
        dataset = %dataset.kind,
        analyses = summary.analyses,
        failed = summary.failed.len(),
        "pipeline finished"
    );
    Ok(summary)
}

fn ingest_message(err: &IngestError) -> String {
    match err {
        IngestError::MissingSource(_) => err.to_string(),
        other => format!("Error ingesting data: {}", other),
    }
}
