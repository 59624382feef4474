//! Core data models used throughout docpipe.
//!
//! These types represent the records, collection identities, and aggregate
//! groups that flow through the ingest → aggregate → report pipeline.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Serialize, Serializer};

/// A typed field value, decided once at load time.
///
/// `Missing` stands in for empty cells and values that failed numeric or
/// timestamp coercion. It is stored as JSON `null`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Missing,
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

/// One row of a source file: field name → typed value, in column order.
pub type Document = IndexMap<String, Value>;

pub static MISSING: Value = Value::Missing;

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Numeric view of the value. Only `Int` and `Float` are numbers;
    /// text that happens to look numeric is not.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn year(&self) -> Value {
        match self {
            Value::Timestamp(ts) => Value::Int(i64::from(ts.year())),
            _ => Value::Missing,
        }
    }

    pub fn month(&self) -> Value {
        match self {
            Value::Timestamp(ts) => Value::Int(i64::from(ts.month())),
            _ => Value::Missing,
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Missing => 0,
            Value::Int(_) | Value::Float(_) => 1,
            Value::Text(_) => 2,
            Value::Timestamp(_) => 3,
        }
    }

    /// Total order used by the store for sorting mixed values:
    /// missing < number < text < timestamp.
    pub fn store_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (a, b) if a.type_rank() == 1 && b.type_rank() == 1 => {
                let (x, y) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
            (a, b) => a.type_rank().cmp(&b.type_rank()),
        }
    }

    /// Canonical token for exact-match grouping. Numerically equal ints
    /// and floats share a token.
    pub fn group_token(&self) -> String {
        match self {
            Value::Missing => "m".to_string(),
            Value::Int(_) | Value::Float(_) => {
                let n = self.as_f64().unwrap_or(0.0);
                // -0.0 and 0.0 group together
                let n = if n == 0.0 { 0.0 } else { n };
                format!("n:{}", n.to_bits())
            }
            Value::Text(s) => format!("s:{}", s),
            Value::Timestamp(ts) => format!("t:{}", ts.timestamp_millis()),
        }
    }

    /// Convert a JSON value read back from the store.
    ///
    /// Strings stay text; the store does not tag timestamps.
    pub fn from_json(value: &serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Missing,
            serde_json::Value::Bool(b) => Value::Int(i64::from(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Missing),
            },
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Missing => serializer.serialize_none(),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Value::Float(_) => serializer.serialize_none(),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Timestamp(ts) => serializer.serialize_str(&format_timestamp(ts)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => f.write_str("null"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => f.write_str(s),
            Value::Timestamp(ts) => f.write_str(&format_timestamp(ts)),
        }
    }
}

/// Convert a JSON object read back from the store into a [`Document`].
pub fn document_from_json(value: &serde_json::Value) -> Document {
    match value {
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(k, v)| (k.clone(), Value::from_json(v)))
            .collect(),
        _ => Document::new(),
    }
}

/// Identity of a collection: a (database, collection) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionId {
    pub database: String,
    pub name: String,
}

impl CollectionId {
    pub fn new(database: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.name)
    }
}

/// One aggregated tuple: group key fields and derived metrics, by alias.
///
/// For a rollup, `values` holds only the outer key and `children` holds the
/// second-level groups.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Group {
    pub values: IndexMap<String, Value>,
    pub children: Vec<Group>,
}

impl Group {
    pub fn get(&self, alias: &str) -> &Value {
        self.values.get(alias).unwrap_or(&MISSING)
    }
}
