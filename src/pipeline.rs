//! Declarative analysis specifications.
//!
//! An analysis is either an aggregation [`Pipeline`] (group → post-filter →
//! sort → limit → optional rollup) or a [`FindQuery`] (filter + projection).
//! Stores execute these; the aggregator only validates and dispatches them,
//! so the set of analyses per dataset is plain data.

use anyhow::{bail, Result};

use crate::models::Value;

/// Expression producing one part of a group key.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyExpr {
    /// The raw value of a field.
    Field(String),
    /// Calendar year of a timestamp field.
    Year(String),
    /// Calendar month (1-12) of a timestamp field.
    Month(String),
}

impl KeyExpr {
    pub fn field(&self) -> &str {
        match self {
            KeyExpr::Field(f) | KeyExpr::Year(f) | KeyExpr::Month(f) => f,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyPart {
    pub alias: String,
    pub expr: KeyExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    Count,
    /// Sum of numeric values; missing and non-numeric values are skipped,
    /// an all-missing group sums to 0.
    Sum(String),
    /// Mean of numeric values; missing values are excluded from the
    /// denominator, an all-missing group averages to missing.
    Avg(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub alias: String,
    pub accumulator: Accumulator,
}

/// Numeric threshold predicate on one field: `field > value`.
///
/// Only numeric values can match; text and missing values never do.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: String,
    pub value: f64,
}

impl Predicate {
    pub fn gt(field: impl Into<String>, value: f64) -> Self {
        Self {
            field: field.into(),
            value,
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        value
            .as_f64()
            .map(|v| v > self.value)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub alias: String,
    pub direction: Direction,
}

/// Second-level grouping: regroup the first-stage groups by the key alias
/// `by`, collecting the remaining fields of each group into a list named
/// `into`.
#[derive(Debug, Clone, PartialEq)]
pub struct Rollup {
    pub by: String,
    pub into: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    pub keys: Vec<KeyPart>,
    pub metrics: Vec<Metric>,
    pub having: Option<Predicate>,
    pub sort: Vec<SortKey>,
    pub limit: Option<usize>,
    pub rollup: Option<Rollup>,
}

impl Pipeline {
    /// Start a pipeline grouped by a single field, keyed under the field's
    /// own name.
    pub fn group_by(field: &str) -> Self {
        Self::default().key(field, KeyExpr::Field(field.to_string()))
    }

    pub fn key(mut self, alias: &str, expr: KeyExpr) -> Self {
        self.keys.push(KeyPart {
            alias: alias.to_string(),
            expr,
        });
        self
    }

    pub fn count(self, alias: &str) -> Self {
        self.metric(alias, Accumulator::Count)
    }

    pub fn sum(self, alias: &str, field: &str) -> Self {
        self.metric(alias, Accumulator::Sum(field.to_string()))
    }

    pub fn avg(self, alias: &str, field: &str) -> Self {
        self.metric(alias, Accumulator::Avg(field.to_string()))
    }

    fn metric(mut self, alias: &str, accumulator: Accumulator) -> Self {
        self.metrics.push(Metric {
            alias: alias.to_string(),
            accumulator,
        });
        self
    }

    pub fn having(mut self, predicate: Predicate) -> Self {
        self.having = Some(predicate);
        self
    }

    pub fn sort_asc(self, alias: &str) -> Self {
        self.sort_by(alias, Direction::Asc)
    }

    pub fn sort_desc(self, alias: &str) -> Self {
        self.sort_by(alias, Direction::Desc)
    }

    fn sort_by(mut self, alias: &str, direction: Direction) -> Self {
        self.sort.push(SortKey {
            alias: alias.to_string(),
            direction,
        });
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn rollup(mut self, by: &str, into: &str) -> Self {
        self.rollup = Some(Rollup {
            by: by.to_string(),
            into: into.to_string(),
        });
        self
    }

    /// All first-stage output aliases, keys first.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.keys
            .iter()
            .map(|k| k.alias.as_str())
            .chain(self.metrics.iter().map(|m| m.alias.as_str()))
    }

    /// Check that every alias referenced by a later stage exists and that
    /// aliases are unique.
    pub fn validate(&self) -> Result<()> {
        if self.keys.is_empty() {
            bail!("pipeline must group by at least one key");
        }
        let aliases: Vec<&str> = self.aliases().collect();
        for (i, alias) in aliases.iter().enumerate() {
            if alias.is_empty() {
                bail!("empty alias in pipeline");
            }
            if aliases[..i].contains(alias) {
                bail!("duplicate alias '{}' in pipeline", alias);
            }
        }
        if let Some(having) = &self.having {
            if !aliases.contains(&having.field.as_str()) {
                bail!("post-group filter references unknown alias '{}'", having.field);
            }
        }
        for key in &self.sort {
            if !aliases.contains(&key.alias.as_str()) {
                bail!("sort references unknown alias '{}'", key.alias);
            }
        }
        if let Some(rollup) = &self.rollup {
            if !self.keys.iter().any(|k| k.alias == rollup.by) {
                bail!("rollup key '{}' is not a group key", rollup.by);
            }
            if aliases.contains(&rollup.into.as_str()) {
                bail!("rollup list name '{}' collides with an alias", rollup.into);
            }
        }
        Ok(())
    }
}

/// Filter-and-project query with no grouping.
#[derive(Debug, Clone, PartialEq)]
pub struct FindQuery {
    pub filter: Predicate,
    /// Fields kept on each match, in this order. Fields absent from a
    /// record are omitted rather than emitted as null.
    pub projection: Vec<String>,
}

/// Post-processing applied by the aggregator to a pipeline's output.
#[derive(Debug, Clone, PartialEq)]
pub enum Derivation {
    /// Percentage change of `metric` versus the previous group, stored
    /// under `alias`. The first group, and any group whose predecessor is
    /// not strictly positive, gets a missing value.
    Growth { metric: String, alias: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Aggregate {
        pipeline: Pipeline,
        derive: Option<Derivation>,
    },
    Find(FindQuery),
}

/// A named analysis in a dataset's fixed battery.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSpec {
    pub name: String,
    pub query: Query,
}

impl AnalysisSpec {
    pub fn aggregate(name: &str, pipeline: Pipeline) -> Self {
        Self {
            name: name.to_string(),
            query: Query::Aggregate {
                pipeline,
                derive: None,
            },
        }
    }

    pub fn find(name: &str, filter: Predicate, projection: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            query: Query::Find(FindQuery {
                filter,
                projection: projection.iter().map(|s| s.to_string()).collect(),
            }),
        }
    }

    pub fn derive(mut self, derivation: Derivation) -> Self {
        if let Query::Aggregate { derive, .. } = &mut self.query {
            *derive = Some(derivation);
        }
        self
    }
}
