//! Runs a dataset's fixed battery of analyses against a collection.
//!
//! Each analysis is validated, handed to the store, and post-processed by
//! any [`Derivation`] it declares. Isolating failures is left to the
//! caller, which logs each one and moves on to the next analysis.

use anyhow::Result;
use tracing::debug;

use crate::models::{Document, Group, Value};
use crate::pipeline::{AnalysisSpec, Derivation, Query};
use crate::store::Collection;

/// The result set of one analysis.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutput {
    Groups(Vec<Group>),
    Records(Vec<Document>),
}

impl AnalysisOutput {
    pub fn len(&self) -> usize {
        match self {
            AnalysisOutput::Groups(g) => g.len(),
            AnalysisOutput::Records(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub async fn run_analysis(
    collection: &Collection<'_>,
    spec: &AnalysisSpec,
) -> Result<AnalysisOutput> {
    debug!(analysis = %spec.name, collection = %collection.id(), "running analysis");
    match &spec.query {
        Query::Aggregate { pipeline, derive } => {
            pipeline.validate()?;
            let mut groups = collection.aggregate(pipeline).await?;
            if let Some(derivation) = derive {
                apply_derivation(derivation, &mut groups);
            }
            Ok(AnalysisOutput::Groups(groups))
        }
        Query::Find(query) => Ok(AnalysisOutput::Records(collection.find(query).await?)),
    }
}

pub fn apply_derivation(derivation: &Derivation, groups: &mut [Group]) {
    match derivation {
        Derivation::Growth { metric, alias } => {
            let mut prev: Option<f64> = None;
            for group in groups.iter_mut() {
                let current = group.get(metric).as_f64();
                let value = match (prev, current) {
                    (Some(p), Some(c)) => growth_percent(p, c),
                    _ => None,
                };
                group
                    .values
                    .insert(alias.clone(), value.map(Value::Float).unwrap_or(Value::Missing));
                prev = current;
            }
        }
    }
}

/// Percentage change from `prev` to `current`.
///
/// Only defined when `prev` is strictly positive; a zero or negative base
/// yields `None` and is reported as not applicable.
pub fn growth_percent(prev: f64, current: f64) -> Option<f64> {
    if prev > 0.0 {
        Some((current - prev) / prev * 100.0)
    } else {
        None
    }
}
