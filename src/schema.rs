//! Per-dataset column typing.
//!
//! A [`Schema`] names the columns a dataset depends on and how each is
//! normalized. Coercion never fails: values that do not parse become
//! [`Value::Missing`]. Columns the schema does not mention are inferred
//! per value (integer, float, or text).

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::models::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Number,
    /// Calendar timestamp. `day_first` resolves `01/02/2016`-style dates
    /// as 1 February rather than 2 January.
    Timestamp { day_first: bool },
    Inferred,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
    pub required: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &str, kind: ColumnKind) -> Self {
        self.columns.push(Column {
            name: name.to_string(),
            kind,
            required: true,
        });
        self
    }

    pub fn optional(mut self, name: &str, kind: ColumnKind) -> Self {
        self.columns.push(Column {
            name: name.to_string(),
            kind,
            required: false,
        });
        self
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn kind_of(&self, name: &str) -> ColumnKind {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.kind)
            .unwrap_or(ColumnKind::Inferred)
    }

    /// Required columns absent from `headers`.
    pub fn missing_columns<'a>(&self, headers: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let present: Vec<&str> = headers.into_iter().collect();
        self.columns
            .iter()
            .filter(|c| c.required && !present.contains(&c.name.as_str()))
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn coerce(&self, column: &str, raw: &str) -> Value {
        coerce(self.kind_of(column), raw)
    }
}

pub fn coerce(kind: ColumnKind, raw: &str) -> Value {
    match kind {
        ColumnKind::Text => {
            if raw.trim().is_empty() {
                Value::Missing
            } else {
                Value::Text(raw.to_string())
            }
        }
        ColumnKind::Number => parse_number(raw),
        ColumnKind::Timestamp { day_first } => parse_timestamp(raw, day_first),
        ColumnKind::Inferred => infer(raw),
    }
}

/// Integer when the text is an integer, float when it is a finite float,
/// otherwise missing.
pub fn parse_number(raw: &str) -> Value {
    let s = raw.trim();
    if s.is_empty() {
        return Value::Missing;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Value::Int(i);
    }
    match s.parse::<f64>() {
        Ok(f) if f.is_finite() => Value::Float(f),
        _ => Value::Missing,
    }
}

fn infer(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Missing;
    }
    match parse_number(raw) {
        Value::Missing => Value::Text(raw.to_string()),
        n => n,
    }
}

const YEAR_FIRST: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y/%m/%d",
];

const DAY_FIRST: &[&str] = &[
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d/%m/%Y",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%d/%m/%y %H:%M:%S",
    "%d/%m/%y %H:%M",
    "%d/%m/%y",
    "%d-%m-%y",
    "%d.%m.%y",
];

const MONTH_FIRST: &[&str] = &[
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y",
    "%m-%d-%Y %H:%M:%S",
    "%m-%d-%Y %H:%M",
    "%m-%d-%Y",
    "%m.%d.%Y",
    "%m/%d/%y %H:%M:%S",
    "%m/%d/%y %H:%M",
    "%m/%d/%y",
    "%m-%d-%y",
    "%m.%d.%y",
];

/// Parse a timestamp; naive values are taken as UTC.
///
/// Year-first forms are tried first, then the preferred day/month order,
/// then the other order, so `12/25/2016` still parses under `day_first`.
/// Two-digit years go through `%y` (`16` is 2016, `69` is 1969).
pub fn parse_timestamp(raw: &str, day_first: bool) -> Value {
    let s = raw.trim();
    if s.is_empty() {
        return Value::Missing;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Value::Timestamp(dt.with_timezone(&Utc));
    }
    let (preferred, other) = if day_first {
        (DAY_FIRST, MONTH_FIRST)
    } else {
        (MONTH_FIRST, DAY_FIRST)
    };
    YEAR_FIRST
        .iter()
        .chain(preferred)
        .chain(other)
        .find_map(|fmt| parse_naive(s, fmt))
        .map(|naive| Value::Timestamp(Utc.from_utc_datetime(&naive)))
        .unwrap_or(Value::Missing)
}

/// Date-only formats land on midnight. `%Y` also accepts one to three
/// digits, so years before 1000 are rejected and the `%y` forms get a turn.
fn parse_naive(s: &str, fmt: &str) -> Option<NaiveDateTime> {
    let naive = NaiveDateTime::parse_from_str(s, fmt).ok().or_else(|| {
        NaiveDate::parse_from_str(s, fmt)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
    })?;
    (naive.year() >= 1000).then_some(naive)
}
