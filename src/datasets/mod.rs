//! The two fixed dataset pipelines.
//!
//! A [`Dataset`] bundles everything one `docpipe run <name>` needs: where
//! the source file is and how to type it, which collection it lands in,
//! where the run log goes, and the ordered battery of analyses with their
//! log layout.
//!
//! | Dataset | Source | Collection | Log |
//! |---------|--------|------------|-----|
//! | [`telemetry`] | LoRaWAN uplink CSV | `lorawan_db.uplinks` | `task1_output.txt` |
//! | [`sales`] | E-commerce orders CSV | `ecommerce_db.orders` | `task2_output.txt` |

pub mod sales;
pub mod telemetry;

use std::fmt;
use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::config::Config;
use crate::loader::SourceSpec;
use crate::models::CollectionId;
use crate::pipeline::AnalysisSpec;
use crate::report::Section;

/// Which pipeline to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    Telemetry,
    Sales,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 2] = [DatasetKind::Telemetry, DatasetKind::Sales];

    pub fn name(self) -> &'static str {
        match self {
            DatasetKind::Telemetry => "telemetry",
            DatasetKind::Sales => "sales",
        }
    }

    /// Parse a CLI dataset argument. `all` expands to every dataset.
    pub fn parse_selection(arg: &str) -> Result<Vec<DatasetKind>> {
        match arg {
            "telemetry" => Ok(vec![DatasetKind::Telemetry]),
            "sales" => Ok(vec![DatasetKind::Sales]),
            "all" => Ok(DatasetKind::ALL.to_vec()),
            other => bail!(
                "Unknown dataset: '{}'. Available: telemetry, sales, all",
                other
            ),
        }
    }

    pub fn build(self, config: &Config) -> Dataset {
        match self {
            DatasetKind::Telemetry => telemetry::dataset(config),
            DatasetKind::Sales => sales::dataset(config),
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One analysis with its place in the run log.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub spec: AnalysisSpec,
    pub section: Section,
    /// Where record results are exported, if anywhere.
    pub export: Option<PathBuf>,
}

impl Analysis {
    pub fn new(spec: AnalysisSpec, section: Section) -> Self {
        Self {
            spec,
            section,
            export: None,
        }
    }

    pub fn export_to(mut self, path: PathBuf) -> Self {
        self.export = Some(path);
        self
    }
}

#[derive(Debug, Clone)]
pub struct Dataset {
    pub kind: DatasetKind,
    pub source: SourceSpec,
    pub collection: CollectionId,
    pub log_path: PathBuf,
    /// Write `Loading data...` at the top of the log before ingesting.
    pub announce_loading: bool,
    pub analyses: Vec<Analysis>,
}
