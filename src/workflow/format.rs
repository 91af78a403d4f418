//! Deterministic response formatting.
//!
//! Used when the completion service is unavailable, when the merged set
//! exceeds the configured row cap, and for single-result fast paths. The
//! output is a pure function of the input rows, so running it twice on
//! the same results yields identical text.

use std::collections::BTreeSet;
use std::fmt::Write;

use serde_json::{Map, Value};

/// Row count at or below which a markdown table is rendered.
const TABLE_ROW_LIMIT: usize = 20;

/// The deterministic output shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// Short prose (no results, or a single record as key/value lines).
    Text,
    /// Pretty-printed JSON.
    Json,
    /// Markdown table (alias kept distinct for explicit hints).
    Table,
    /// Markdown table.
    Markdown,
    /// Aggregate summary: totals, per-source counts, field union.
    Summary,
}

impl ResponseFormat {
    /// Parses an explicit format hint out of free text (e.g. plan notes
    /// containing `format=json` or just the word `summary`).
    #[must_use]
    pub fn from_hint(notes: &str) -> Option<Self> {
        let lower = notes.to_lowercase();
        for (needle, format) in [
            ("json", Self::Json),
            ("markdown", Self::Markdown),
            ("table", Self::Table),
            ("summary", Self::Summary),
            ("text", Self::Text),
        ] {
            if lower.contains(needle) {
                return Some(format);
            }
        }
        None
    }

    /// Chooses a format from the row count: 0 → text, 1 → text,
    /// ≤ 20 → markdown table, more → summary.
    #[must_use]
    pub const fn for_rows(count: usize) -> Self {
        match count {
            0 | 1 => Self::Text,
            2..=TABLE_ROW_LIMIT => Self::Markdown,
            _ => Self::Summary,
        }
    }
}

/// Renders a scalar cell value without JSON string quoting.
fn render_cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Union of field names across rows, provenance first stripped, in
/// first-seen order.
fn field_union(rows: &[Map<String, Value>]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut fields = Vec::new();
    for row in rows {
        for key in row.keys() {
            if key != "_source" && key != "_sources" && seen.insert(key.clone()) {
                fields.push(key.clone());
            }
        }
    }
    fields
}

fn render_text(rows: &[Map<String, Value>]) -> String {
    match rows {
        [] => "No results were found for this request.".to_string(),
        [row] => {
            let mut out = String::new();
            for (key, value) in row {
                if key == "_source" || key == "_sources" {
                    continue;
                }
                let _ = writeln!(out, "{key}: {}", render_cell(value));
            }
            out.trim_end().to_string()
        }
        many => render_markdown(many),
    }
}

fn render_json(rows: &[Map<String, Value>]) -> String {
    serde_json::to_string_pretty(rows).unwrap_or_default()
}

fn render_markdown(rows: &[Map<String, Value>]) -> String {
    if rows.is_empty() {
        return render_text(rows);
    }
    let fields = field_union(rows);
    let mut out = String::new();
    let _ = writeln!(out, "| {} |", fields.join(" | "));
    let _ = writeln!(
        out,
        "|{}|",
        fields.iter().map(|_| " --- ").collect::<Vec<_>>().join("|")
    );
    for row in rows {
        let cells: Vec<String> = fields
            .iter()
            .map(|f| row.get(f).map(render_cell).unwrap_or_default())
            .collect();
        let _ = writeln!(out, "| {} |", cells.join(" | "));
    }
    out.trim_end().to_string()
}

fn render_summary(rows: &[Map<String, Value>]) -> String {
    let mut per_source: Vec<(String, usize)> = Vec::new();
    for row in rows {
        let tags: Vec<String> = match (row.get("_source"), row.get("_sources")) {
            (Some(Value::String(s)), _) => vec![s.clone()],
            (_, Some(Value::Array(list))) => list
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => vec!["unknown".to_string()],
        };
        for tag in tags {
            match per_source.iter_mut().find(|(name, _)| *name == tag) {
                Some((_, count)) => *count += 1,
                None => per_source.push((tag, 1)),
            }
        }
    }

    let mut out = String::new();
    let _ = writeln!(out, "Total records: {}", rows.len());
    if !per_source.is_empty() {
        let _ = writeln!(out, "By source:");
        for (tag, count) in per_source {
            let _ = writeln!(out, "- {tag}: {count}");
        }
    }
    let _ = write!(out, "Fields: {}", field_union(rows).join(", "));
    out
}

/// Renders rows in the given format.
#[must_use]
pub fn render(rows: &[Map<String, Value>], format: ResponseFormat) -> String {
    match format {
        ResponseFormat::Text => render_text(rows),
        ResponseFormat::Json => render_json(rows),
        ResponseFormat::Table | ResponseFormat::Markdown => render_markdown(rows),
        ResponseFormat::Summary => render_summary(rows),
    }
}

/// Renders rows with the format chosen from the row count, unless an
/// explicit hint overrides the choice.
#[must_use]
pub fn render_auto(rows: &[Map<String, Value>], hint: Option<&str>) -> String {
    let format = hint
        .and_then(ResponseFormat::from_hint)
        .unwrap_or_else(|| ResponseFormat::for_rows(rows.len()));
    render(rows, format)
}
