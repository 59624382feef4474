use std::path::PathBuf;

use thiserror::Error;

/// Failures while loading a source file into a collection.
///
/// Everything except [`IngestError::Store`] is recovered by the runner:
/// the condition goes to the run log and aggregation proceeds over
/// whatever the collection already holds.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("File {} not found.", .0.display())]
    MissingSource(PathBuf),

    #[error("could not decode {} with any of: {encodings}", path.display())]
    Decode { path: PathBuf, encodings: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("missing required columns: {}", missing.join(", "))]
    MissingColumns { missing: Vec<String> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0:#}")]
    Store(anyhow::Error),
}

impl IngestError {
    /// Whether the run may continue past this failure.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, IngestError::Store(_))
    }
}
