//! Run log and structured export.
//!
//! The [`Reporter`] turns each analysis result into a text section of the
//! run log, in analysis order, and writes the JSON export for find-style
//! analyses. Row lines come from small templates:
//!
//! ```text
//! Device: {device_id}, Avg RSSI: {avg_rssi:.2}
//! {year:<6} | ${total_sales:money}    | {growth:growth<10}
//! ```
//!
//! A placeholder is `{name}` or `{name:spec}` where `spec` is an optional
//! kind (`.2`, `money`, `02`, `growth`) followed by an optional alignment
//! (`<N` or `>N`). `{{` and `}}` are literal braces.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::aggregate::AnalysisOutput;
use crate::models::{Document, Group, Value, MISSING};

/// How one analysis is laid out in the run log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Section {
    /// Rendered as `--- <title> ---` after a blank line.
    pub title: String,
    /// Static lines printed right after the header.
    pub preamble: Vec<String>,
    /// Printed before the rows; may use `{total}` and `{path}`.
    pub summary: Option<String>,
    /// Template for each top-level group.
    pub row: Option<String>,
    /// Template for each second-level group of a rollup.
    pub child_row: Option<String>,
    /// Show at most this many rows.
    pub preview: Option<usize>,
    /// Printed after the rows; may use `{total}`.
    pub footer: Option<String>,
}

impl Section {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }

    pub fn preamble(mut self, line: &str) -> Self {
        self.preamble.push(line.to_string());
        self
    }

    pub fn summary(mut self, template: &str) -> Self {
        self.summary = Some(template.to_string());
        self
    }

    pub fn row(mut self, template: &str) -> Self {
        self.row = Some(template.to_string());
        self
    }

    pub fn child_row(mut self, template: &str) -> Self {
        self.child_row = Some(template.to_string());
        self
    }

    pub fn preview(mut self, n: usize) -> Self {
        self.preview = Some(n);
        self
    }

    pub fn footer(mut self, template: &str) -> Self {
        self.footer = Some(template.to_string());
        self
    }
}

/// Writes the run log for one pipeline invocation.
pub struct Reporter<W: Write> {
    out: W,
}

impl Reporter<BufWriter<File>> {
    /// Create (or truncate) the log file at `path`.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create report log: {}", path.display()))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn line(&mut self, text: &str) -> Result<()> {
        writeln!(self.out, "{}", text)?;
        Ok(())
    }

    /// Render one analysis. For record results with an `export` path, the
    /// full record set is written there first.
    pub fn section(
        &mut self,
        section: &Section,
        outcome: &Result<AnalysisOutput>,
        export: Option<&Path>,
    ) -> Result<()> {
        self.line(&format!("\n--- {} ---", section.title))?;
        for line in &section.preamble {
            self.line(line)?;
        }

        let output = match outcome {
            Ok(output) => output,
            Err(e) => return self.line(&format!("Analysis failed: {:#}", e)),
        };

        if let (AnalysisOutput::Records(records), Some(path)) = (output, export) {
            write_export(path, records)?;
        }

        let total = Value::Int(output.len() as i64);
        let path = export
            .map(|p| Value::Text(p.display().to_string()))
            .unwrap_or(Value::Missing);
        let meta = |name: &str| match name {
            "total" => Some(&total),
            "path" => Some(&path),
            _ => None,
        };

        if let Some(summary) = &section.summary {
            self.line(&render(summary, meta))?;
        }

        if let AnalysisOutput::Groups(groups) = output {
            let shown = section.preview.unwrap_or(groups.len()).min(groups.len());
            for group in &groups[..shown] {
                self.group(section, group)?;
            }
        }

        if let Some(footer) = &section.footer {
            self.line(&render(footer, meta))?;
        }
        Ok(())
    }

    fn group(&mut self, section: &Section, group: &Group) -> Result<()> {
        if let Some(row) = &section.row {
            self.line(&render(row, |name| group.values.get(name)))?;
        }
        if let Some(child_row) = &section.child_row {
            for child in &group.children {
                self.line(&render(child_row, |name| child.values.get(name)))?;
            }
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Write `records` as a pretty JSON array (4-space indent), replacing any
/// previous file at `path`.
pub fn write_export(path: &Path, records: &[Document]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path)
        .with_context(|| format!("Failed to create export file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut writer, formatter);
    records.serialize(&mut ser)?;
    writer.flush()?;
    Ok(())
}

/// Fill a row template from `lookup`. Unknown names render as missing.
pub fn render<'a>(template: &str, lookup: impl Fn(&str) -> Option<&'a Value>) -> String {
    let mut out = String::with_capacity(template.len() + 16);
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut inner = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    inner.push(c);
                }
                let (name, spec) = match inner.split_once(':') {
                    Some((n, s)) => (n, s),
                    None => (inner.as_str(), ""),
                };
                let value = lookup(name).unwrap_or(&MISSING);
                out.push_str(&format_spec(value, spec));
            }
            c => out.push(c),
        }
    }
    out
}

fn format_spec(value: &Value, spec: &str) -> String {
    let (kind, align) = match spec.find(['<', '>']) {
        Some(i) => spec.split_at(i),
        None => (spec, ""),
    };
    let text = match kind {
        ".2" => value
            .as_f64()
            .map(|v| format!("{:.2}", v))
            .unwrap_or_else(|| "N/A".to_string()),
        "money" => value
            .as_f64()
            .map(format_money)
            .unwrap_or_else(|| "N/A".to_string()),
        "02" => match value {
            Value::Int(i) => format!("{:02}", i),
            other => other.to_string(),
        },
        "growth" => format_growth(value.as_f64()),
        _ => value.to_string(),
    };
    let width: usize = align.get(1..).and_then(|w| w.parse().ok()).unwrap_or(0);
    match align.chars().next() {
        Some('<') => format!("{:<width$}", text, width = width),
        Some('>') => format!("{:>width$}", text, width = width),
        _ => text,
    }
}

/// Two decimals with comma thousands separators, e.g. `1,234,567.89`.
pub fn format_money(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, frac)
}

/// Signed percentage with two decimals, or `N/A`.
pub fn format_growth(growth: Option<f64>) -> String {
    match growth {
        Some(g) => format!("{:+.2}%", g),
        None => "N/A".to_string(),
    }
}
