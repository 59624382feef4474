//! SQLite-backed [`DocumentStore`] implementation.
//!
//! Every document is one row of the `documents` table with its fields in a
//! JSON `body`. Aggregation pipelines compile to a single SQL statement
//! built from `json_extract`, `GROUP BY`, `ORDER BY` and `LIMIT`; the
//! rollup stage nests the first-stage groups with `json_group_array`.
//!
//! Only JSON numbers take part in sums, averages and numeric filters, the
//! way a document store brackets comparisons by type.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::models::{document_from_json, CollectionId, Document, Group, Value};
use crate::pipeline::{Accumulator, Direction, FindQuery, KeyExpr, Pipeline, Predicate};

use super::{project, with_object_id, DocumentStore};

/// SQLite implementation of the [`DocumentStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// A value bound to a `?` placeholder, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
enum Bind {
    Text(String),
    Real(f64),
}

#[derive(Debug)]
struct CompiledQuery {
    sql: String,
    binds: Vec<Bind>,
}

impl CompiledQuery {
    async fn fetch_docs(&self, pool: &SqlitePool) -> Result<Vec<String>> {
        let mut query = sqlx::query(&self.sql);
        for bind in &self.binds {
            query = match bind {
                Bind::Text(s) => query.bind(s.clone()),
                Bind::Real(v) => query.bind(*v),
            };
        }
        let rows = query.fetch_all(pool).await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("doc").map_err(Into::into))
            .collect()
    }
}

/// Quote a string as an SQL literal.
fn literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Quote an alias as an SQL identifier.
fn ident(alias: &str) -> String {
    format!("\"{}\"", alias.replace('"', "\"\""))
}

/// JSON path literal for a top-level field, e.g. `'$."Order Date"'`.
fn json_path(field: &str) -> Result<String> {
    if field.contains('"') || field.contains('\\') {
        bail!("field name not addressable in the store: {:?}", field);
    }
    Ok(literal(&format!("$.\"{}\"", field)))
}

fn numeric_expr(field: &str) -> Result<String> {
    let path = json_path(field)?;
    Ok(format!(
        "CASE WHEN json_type(body, {p}) IN ('integer', 'real') THEN json_extract(body, {p}) END",
        p = path
    ))
}

fn key_expr(expr: &KeyExpr) -> Result<String> {
    let path = json_path(expr.field())?;
    let calendar = |part: &str| {
        format!(
            "CASE WHEN json_type(body, {p}) = 'text' \
             THEN CAST(strftime('{part}', json_extract(body, {p})) AS INTEGER) END",
            p = path,
            part = part
        )
    };
    Ok(match expr {
        KeyExpr::Field(_) => format!("json_extract(body, {})", path),
        KeyExpr::Year(_) => calendar("%Y"),
        KeyExpr::Month(_) => calendar("%m"),
    })
}

fn accumulator_expr(acc: &Accumulator) -> Result<String> {
    Ok(match acc {
        Accumulator::Count => "COUNT(*)".to_string(),
        Accumulator::Sum(field) => format!("TOTAL({})", numeric_expr(field)?),
        Accumulator::Avg(field) => format!("AVG({})", numeric_expr(field)?),
    })
}

/// Numeric comparison against an already-computed column.
fn column_predicate(predicate: &Predicate, binds: &mut Vec<Bind>) -> String {
    binds.push(Bind::Real(predicate.value));
    let col = ident(&predicate.field);
    format!(
        "typeof({c}) IN ('integer', 'real') AND {c} > ?",
        c = col
    )
}

fn json_object(columns: &[&str], prefix: &str) -> String {
    let pairs: Vec<String> = columns
        .iter()
        .map(|c| format!("{}, {}{}", literal(c), prefix, ident(c)))
        .collect();
    format!("json_object({})", pairs.join(", "))
}

fn compile_pipeline(collection: &CollectionId, pipeline: &Pipeline) -> Result<CompiledQuery> {
    pipeline.validate()?;

    let mut binds = vec![
        Bind::Text(collection.database.clone()),
        Bind::Text(collection.name.clone()),
    ];

    let mut select = Vec::new();
    for key in &pipeline.keys {
        select.push(format!("{} AS {}", key_expr(&key.expr)?, ident(&key.alias)));
    }
    for metric in &pipeline.metrics {
        select.push(format!(
            "{} AS {}",
            accumulator_expr(&metric.accumulator)?,
            ident(&metric.alias)
        ));
    }
    let positions: Vec<String> = (1..=pipeline.keys.len()).map(|i| i.to_string()).collect();
    let grouped = format!(
        "SELECT {} FROM documents WHERE db_name = ? AND collection = ? GROUP BY {}",
        select.join(", "),
        positions.join(", ")
    );

    let mut tail = String::new();
    if let Some(having) = &pipeline.having {
        tail.push_str(" WHERE ");
        tail.push_str(&column_predicate(having, &mut binds));
    }
    if !pipeline.sort.is_empty() {
        let order: Vec<String> = pipeline
            .sort
            .iter()
            .map(|k| {
                let dir = match k.direction {
                    Direction::Asc => "ASC",
                    Direction::Desc => "DESC",
                };
                format!("{} {}", ident(&k.alias), dir)
            })
            .collect();
        tail.push_str(" ORDER BY ");
        tail.push_str(&order.join(", "));
    }
    if let Some(limit) = pipeline.limit {
        tail.push_str(&format!(" LIMIT {}", limit));
    }

    let aliases: Vec<&str> = pipeline.aliases().collect();
    let sql = match &pipeline.rollup {
        None => format!(
            "SELECT {} AS doc FROM ({}) AS g{}",
            json_object(&aliases, "g."),
            grouped,
            tail
        ),
        Some(rollup) => {
            let inner: Vec<&str> = aliases
                .iter()
                .copied()
                .filter(|a| *a != rollup.by)
                .collect();
            format!(
                "SELECT json_object({by_lit}, s.{by}, {into_lit}, json_group_array({children})) AS doc \
                 FROM (SELECT * FROM ({grouped}) AS g{tail}) AS s GROUP BY s.{by}",
                by_lit = literal(&rollup.by),
                by = ident(&rollup.by),
                into_lit = literal(&rollup.into),
                children = json_object(&inner, "s."),
                grouped = grouped,
                tail = tail
            )
        }
    };
    Ok(CompiledQuery { sql, binds })
}

fn compile_find(collection: &CollectionId, query: &FindQuery) -> Result<CompiledQuery> {
    let path = json_path(&query.filter.field)?;
    let sql = format!(
        "SELECT body AS doc FROM documents WHERE db_name = ? AND collection = ? \
         AND json_type(body, {p}) IN ('integer', 'real') AND json_extract(body, {p}) > ? \
         ORDER BY rowid",
        p = path
    );
    Ok(CompiledQuery {
        sql,
        binds: vec![
            Bind::Text(collection.database.clone()),
            Bind::Text(collection.name.clone()),
            Bind::Real(query.filter.value),
        ],
    })
}

fn group_from_json(value: &serde_json::Value, children_key: Option<&str>) -> Group {
    let mut group = Group::default();
    if let serde_json::Value::Object(map) = value {
        for (k, v) in map {
            match (children_key, v) {
                (Some(key), serde_json::Value::Array(items)) if k == key => {
                    group.children = items.iter().map(|i| group_from_json(i, None)).collect();
                }
                _ => {
                    group.values.insert(k.clone(), Value::from_json(v));
                }
            }
        }
    }
    group
}

/// Restore first-stage alias order; `json_object` output is keyed, not ordered.
fn reorder(group: Group, aliases: &[&str]) -> Group {
    let mut values = group.values;
    let mut ordered = indexmap::IndexMap::with_capacity(values.len());
    for alias in aliases {
        if let Some(v) = values.shift_remove(*alias) {
            ordered.insert(alias.to_string(), v);
        }
    }
    ordered.extend(values);
    Group {
        values: ordered,
        children: group
            .children
            .into_iter()
            .map(|c| reorder(c, aliases))
            .collect(),
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn clear(&self, collection: &CollectionId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM documents WHERE db_name = ? AND collection = ?")
            .bind(&collection.database)
            .bind(&collection.name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_many(&self, collection: &CollectionId, docs: &[Document]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        for doc in docs {
            insert_one(&mut tx, collection, doc).await?;
        }
        tx.commit().await?;
        Ok(docs.len() as u64)
    }

    async fn replace_all(&self, collection: &CollectionId, docs: &[Document]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM documents WHERE db_name = ? AND collection = ?")
            .bind(&collection.database)
            .bind(&collection.name)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        for doc in docs {
            insert_one(&mut tx, collection, doc).await?;
        }

        tx.commit().await?;
        debug!(
            collection = %collection,
            removed,
            inserted = docs.len(),
            "replaced collection contents"
        );
        Ok(docs.len() as u64)
    }

    async fn count(&self, collection: &CollectionId) -> Result<u64> {
        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM documents WHERE db_name = ? AND collection = ?",
        )
        .bind(&collection.database)
        .bind(&collection.name)
        .fetch_one(&self.pool)
        .await?;
        Ok(n as u64)
    }

    async fn aggregate(
        &self,
        collection: &CollectionId,
        pipeline: &Pipeline,
    ) -> Result<Vec<Group>> {
        let compiled = compile_pipeline(collection, pipeline)?;
        debug!(sql = %compiled.sql, "aggregate");
        let rows = compiled.fetch_docs(&self.pool).await?;
        let children_key = pipeline.rollup.as_ref().map(|r| r.into.as_str());
        let aliases: Vec<&str> = pipeline.aliases().collect();
        rows.iter()
            .map(|doc| {
                let json: serde_json::Value = serde_json::from_str(doc)
                    .with_context(|| format!("malformed aggregate row: {}", doc))?;
                Ok(reorder(group_from_json(&json, children_key), &aliases))
            })
            .collect()
    }

    async fn find(&self, collection: &CollectionId, query: &FindQuery) -> Result<Vec<Document>> {
        let compiled = compile_find(collection, query)?;
        let rows = compiled.fetch_docs(&self.pool).await?;
        rows.iter()
            .map(|body| {
                let json: serde_json::Value = serde_json::from_str(body)
                    .with_context(|| "malformed document body in store")?;
                Ok(project(&document_from_json(&json), &query.projection))
            })
            .collect()
    }
}

async fn insert_one(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    collection: &CollectionId,
    doc: &Document,
) -> Result<()> {
    let (id, stored) = with_object_id(doc);
    let body = serde_json::to_string(&stored)?;
    sqlx::query("INSERT INTO documents (id, db_name, collection, body) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(&collection.database)
        .bind(&collection.name)
        .bind(&body)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
