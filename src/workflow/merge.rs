//! Cross-source merging of agent results.
//!
//! Strategy detection looks for an ID-like column shared by every
//! source; when one exists, rows are joined on it with outer semantics
//! and provenance tracking, otherwise they are concatenated with a
//! per-row source tag. The output is always deduplicated on the full
//! field set, preserving first occurrence.

use std::collections::BTreeSet;

use serde_json::{Map, Value};
use tracing::debug;

/// How a set of sources was combined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Rows were joined on the named ID-like column.
    Join(String),
    /// Rows were concatenated with per-row provenance.
    Concat,
}

impl MergeStrategy {
    /// Short form for prompts and logs.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Join(_) => "join",
            Self::Concat => "concat",
        }
    }
}

/// Returns `true` for column names that look like identifiers: `id`
/// (case-insensitive), a `_id`/`_key`/`_no`/`_number` suffix, or a
/// `uuid`/`guid` substring.
#[must_use]
pub fn is_id_column(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower == "id"
        || lower.ends_with("_id")
        || lower.ends_with("_key")
        || lower.ends_with("_no")
        || lower.ends_with("_number")
        || lower.contains("uuid")
        || lower.contains("guid")
}

/// Detects the merge strategy for the given sources.
///
/// The join column is the lexicographically first ID-like name present
/// in the first row of every non-empty source. Fewer than two non-empty
/// sources always concat.
#[must_use]
pub fn detect_strategy(sources: &[(String, Vec<Map<String, Value>>)]) -> MergeStrategy {
    let non_empty: Vec<&Vec<Map<String, Value>>> = sources
        .iter()
        .map(|(_, rows)| rows)
        .filter(|rows| !rows.is_empty())
        .collect();
    if non_empty.len() < 2 {
        return MergeStrategy::Concat;
    }

    let mut shared: Option<BTreeSet<String>> = None;
    for rows in non_empty {
        let columns: BTreeSet<String> = rows[0].keys().cloned().collect();
        shared = Some(match shared {
            Some(acc) => acc.intersection(&columns).cloned().collect(),
            None => columns,
        });
    }

    shared
        .unwrap_or_default()
        .into_iter()
        .find(|name| is_id_column(name))
        .map_or(MergeStrategy::Concat, MergeStrategy::Join)
}

/// Stable string key for a join value.
fn value_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Joins rows from all sources on the given column.
///
/// Within a bucket, records merge by keyed union: later sources never
/// overwrite an earlier non-null field; conflicting non-null values are
/// kept under `<field>__<source_tag>`. Every joined row carries a
/// `_sources` list; rows missing the join column are retained with a
/// `_source` tag (outer semantics).
fn merge_by_join(
    sources: &[(String, Vec<Map<String, Value>>)],
    column: &str,
) -> Vec<Map<String, Value>> {
    // Bucket order follows first appearance so output is deterministic.
    let mut order: Vec<String> = Vec::new();
    let mut buckets: std::collections::HashMap<String, Map<String, Value>> =
        std::collections::HashMap::new();
    let mut bucket_sources: std::collections::HashMap<String, Vec<String>> =
        std::collections::HashMap::new();
    let mut unjoined: Vec<Map<String, Value>> = Vec::new();

    for (tag, rows) in sources {
        for row in rows {
            let Some(join_value) = row.get(column) else {
                let mut tagged = row.clone();
                tagged.insert("_source".to_string(), Value::String(tag.clone()));
                unjoined.push(tagged);
                continue;
            };
            let key = value_key(join_value);
            let merged = buckets.entry(key.clone()).or_insert_with(|| {
                order.push(key.clone());
                Map::new()
            });
            let contributors = bucket_sources.entry(key).or_default();
            if !contributors.contains(tag) {
                contributors.push(tag.clone());
            }

            for (field, value) in row {
                match merged.get(field) {
                    None => {
                        merged.insert(field.clone(), value.clone());
                    }
                    Some(existing) if existing.is_null() && !value.is_null() => {
                        merged.insert(field.clone(), value.clone());
                    }
                    Some(existing) => {
                        if existing != value && !value.is_null() {
                            merged.insert(format!("{field}__{tag}"), value.clone());
                        }
                    }
                }
            }
        }
    }

    let mut output = Vec::with_capacity(order.len() + unjoined.len());
    for key in order {
        let mut row = buckets.remove(&key).unwrap_or_default();
        let contributors = bucket_sources.remove(&key).unwrap_or_default();
        row.insert(
            "_sources".to_string(),
            Value::Array(contributors.into_iter().map(Value::String).collect()),
        );
        output.push(row);
    }
    output.extend(unjoined);
    output
}

/// Concatenates all rows, tagging each with its source.
fn merge_by_concat(sources: &[(String, Vec<Map<String, Value>>)]) -> Vec<Map<String, Value>> {
    let mut output = Vec::new();
    for (tag, rows) in sources {
        for row in rows {
            let mut tagged = row.clone();
            tagged.insert("_source".to_string(), Value::String(tag.clone()));
            output.push(tagged);
        }
    }
    output
}

/// Removes duplicate rows on the full field set (provenance fields
/// excluded), preserving first occurrence.
#[must_use]
pub fn deduplicate(rows: Vec<Map<String, Value>>) -> Vec<Map<String, Value>> {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut unique = Vec::with_capacity(rows.len());
    for row in rows {
        let key_fields: Map<String, Value> = row
            .iter()
            .filter(|(k, _)| *k != "_source" && *k != "_sources")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let key = serde_json::to_string(&key_fields).unwrap_or_default();
        if seen.insert(key) {
            unique.push(row);
        }
    }
    unique
}

/// Merges rows from all sources, returning the deduplicated output and
/// the strategy applied.
#[must_use]
pub fn merge_sources(
    sources: &[(String, Vec<Map<String, Value>>)],
) -> (Vec<Map<String, Value>>, MergeStrategy) {
    let strategy = detect_strategy(sources);
    debug!(
        sources = sources.len(),
        strategy = strategy.as_str(),
        "merging results"
    );
    let merged = match &strategy {
        MergeStrategy::Join(column) => merge_by_join(sources, column),
        MergeStrategy::Concat => merge_by_concat(sources),
    };
    (deduplicate(merged), strategy)
}
