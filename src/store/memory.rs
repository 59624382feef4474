//! In-memory [`DocumentStore`] implementation for tests.
//!
//! Collections live in a `HashMap` behind `std::sync::RwLock`. Pipelines are
//! evaluated directly over the stored documents with the same semantics the
//! SQLite backend compiles to SQL.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{CollectionId, Document, Group, Value, MISSING};
use crate::pipeline::{Accumulator, Direction, FindQuery, KeyExpr, Pipeline, SortKey};

use super::{project, with_object_id, DocumentStore};

/// In-memory store for tests.
pub struct MemoryStore {
    collections: RwLock<HashMap<CollectionId, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("memory store lock poisoned")
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn clear(&self, collection: &CollectionId) -> Result<u64> {
        let mut colls = self.collections.write().map_err(poisoned)?;
        Ok(colls
            .remove(collection)
            .map(|docs| docs.len() as u64)
            .unwrap_or(0))
    }

    async fn insert_many(&self, collection: &CollectionId, docs: &[Document]) -> Result<u64> {
        let mut colls = self.collections.write().map_err(poisoned)?;
        let stored = colls.entry(collection.clone()).or_default();
        stored.extend(docs.iter().map(|d| with_object_id(d).1));
        Ok(docs.len() as u64)
    }

    async fn replace_all(&self, collection: &CollectionId, docs: &[Document]) -> Result<u64> {
        let fresh: Vec<Document> = docs.iter().map(|d| with_object_id(d).1).collect();
        let mut colls = self.collections.write().map_err(poisoned)?;
        colls.insert(collection.clone(), fresh);
        Ok(docs.len() as u64)
    }

    async fn count(&self, collection: &CollectionId) -> Result<u64> {
        let colls = self.collections.read().map_err(poisoned)?;
        Ok(colls.get(collection).map(|d| d.len() as u64).unwrap_or(0))
    }

    async fn aggregate(
        &self,
        collection: &CollectionId,
        pipeline: &Pipeline,
    ) -> Result<Vec<Group>> {
        pipeline.validate()?;
        let colls = self.collections.read().map_err(poisoned)?;
        let docs = colls.get(collection).map(Vec::as_slice).unwrap_or(&[]);
        Ok(evaluate(docs, pipeline))
    }

    async fn find(&self, collection: &CollectionId, query: &FindQuery) -> Result<Vec<Document>> {
        let colls = self.collections.read().map_err(poisoned)?;
        let docs = colls.get(collection).map(Vec::as_slice).unwrap_or(&[]);
        Ok(docs
            .iter()
            .filter(|d| {
                d.get(&query.filter.field)
                    .map(|v| query.filter.matches(v))
                    .unwrap_or(false)
            })
            .map(|d| project(d, &query.projection))
            .collect())
    }
}

enum AccState {
    Count(i64),
    Sum(f64),
    Avg { sum: f64, n: u64 },
}

impl AccState {
    fn new(acc: &Accumulator) -> Self {
        match acc {
            Accumulator::Count => AccState::Count(0),
            Accumulator::Sum(_) => AccState::Sum(0.0),
            Accumulator::Avg(_) => AccState::Avg { sum: 0.0, n: 0 },
        }
    }

    fn add(&mut self, acc: &Accumulator, doc: &Document) {
        match (self, acc) {
            (AccState::Count(c), Accumulator::Count) => *c += 1,
            (AccState::Sum(s), Accumulator::Sum(field)) => {
                if let Some(v) = numeric(doc, field) {
                    *s += v;
                }
            }
            (AccState::Avg { sum, n }, Accumulator::Avg(field)) => {
                if let Some(v) = numeric(doc, field) {
                    *sum += v;
                    *n += 1;
                }
            }
            _ => {}
        }
    }

    fn finish(self) -> Value {
        match self {
            AccState::Count(c) => Value::Int(c),
            AccState::Sum(s) => Value::Float(s),
            AccState::Avg { n: 0, .. } => Value::Missing,
            AccState::Avg { sum, n } => Value::Float(sum / n as f64),
        }
    }
}

fn numeric(doc: &Document, field: &str) -> Option<f64> {
    doc.get(field).and_then(Value::as_f64)
}

fn key_value(doc: &Document, expr: &KeyExpr) -> Value {
    let raw = doc.get(expr.field()).unwrap_or(&MISSING);
    match expr {
        KeyExpr::Field(_) => raw.clone(),
        KeyExpr::Year(_) => raw.year(),
        KeyExpr::Month(_) => raw.month(),
    }
}

/// Run `pipeline` over `docs`. Groups come out in first-seen order unless
/// the pipeline sorts them; the sort is stable.
pub fn evaluate(docs: &[Document], pipeline: &Pipeline) -> Vec<Group> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut keys: Vec<Vec<Value>> = Vec::new();
    let mut states: Vec<Vec<AccState>> = Vec::new();

    for doc in docs {
        let key: Vec<Value> = pipeline
            .keys
            .iter()
            .map(|k| key_value(doc, &k.expr))
            .collect();
        let token = key
            .iter()
            .map(Value::group_token)
            .collect::<Vec<_>>()
            .join("\u{1f}");
        let slot = *index.entry(token).or_insert_with(|| {
            keys.push(key);
            states.push(
                pipeline
                    .metrics
                    .iter()
                    .map(|m| AccState::new(&m.accumulator))
                    .collect(),
            );
            keys.len() - 1
        });
        for (state, metric) in states[slot].iter_mut().zip(&pipeline.metrics) {
            state.add(&metric.accumulator, doc);
        }
    }

    let mut groups: Vec<Group> = keys
        .into_iter()
        .zip(states)
        .map(|(key, state)| {
            let mut group = Group::default();
            for (part, value) in pipeline.keys.iter().zip(key) {
                group.values.insert(part.alias.clone(), value);
            }
            for (metric, st) in pipeline.metrics.iter().zip(state) {
                group.values.insert(metric.alias.clone(), st.finish());
            }
            group
        })
        .collect();

    if let Some(having) = &pipeline.having {
        groups.retain(|g| having.matches(g.get(&having.field)));
    }
    if !pipeline.sort.is_empty() {
        groups.sort_by(|a, b| compare(a, b, &pipeline.sort));
    }
    if let Some(limit) = pipeline.limit {
        groups.truncate(limit);
    }
    match &pipeline.rollup {
        Some(rollup) => roll_up(groups, &rollup.by),
        None => groups,
    }
}

fn compare(a: &Group, b: &Group, sort: &[SortKey]) -> std::cmp::Ordering {
    for key in sort {
        let ord = a.get(&key.alias).store_cmp(b.get(&key.alias));
        let ord = match key.direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        };
        if ord.is_ne() {
            return ord;
        }
    }
    std::cmp::Ordering::Equal
}

fn roll_up(groups: Vec<Group>, by: &str) -> Vec<Group> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<Group> = Vec::new();
    for mut group in groups {
        let outer = group.values.shift_remove(by).unwrap_or(Value::Missing);
        let slot = *index.entry(outer.group_token()).or_insert_with(|| {
            let mut parent = Group::default();
            parent.values.insert(by.to_string(), outer);
            out.push(parent);
            out.len() - 1
        });
        out[slot].children.push(group);
    }
    out
}
