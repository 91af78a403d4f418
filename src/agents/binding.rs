//! Argument binding for tool invocations.
//!
//! When the model declines to pick a tool (or the gateway is down),
//! arguments are bound from the step's parameter hints augmented by
//! simple extraction from the query text: identifier tokens, ISO dates,
//! and status words.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::registry::{ParameterSpec, SemanticType};

/// Opaque identifier tokens (`U7X42A`, `CUST_00123`).
static ID_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][A-Z0-9_]{5,}\b").unwrap_or_else(|_| unreachable!()));

/// ISO calendar dates (`2025-01-03`).
static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").unwrap_or_else(|_| unreachable!()));

/// Status words commonly used to filter records.
const STATUS_WORDS: &[&str] = &[
    "open", "closed", "pending", "active", "resolved", "new", "high", "medium", "low", "critical",
];

/// First identifier token in the text, if any.
#[must_use]
pub(crate) fn extract_id(text: &str) -> Option<String> {
    ID_TOKEN.find(text).map(|m| m.as_str().to_string())
}

/// First ISO date in the text, if any.
#[must_use]
pub(crate) fn extract_date(text: &str) -> Option<String> {
    ISO_DATE.find(text).map(|m| m.as_str().to_string())
}

/// First status word in the text, if any.
#[must_use]
pub(crate) fn extract_status(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    STATUS_WORDS
        .iter()
        .find(|w| {
            lower
                .split(|c: char| !c.is_alphanumeric())
                .any(|t| t == **w)
        })
        .map(|w| (*w).to_string())
}

/// Binds arguments for a tool's parameter schema from step hints and
/// query text.
///
/// Resolution per parameter: explicit hint → name/type-driven extraction
/// from the query → declared default. Parameters that resolve to nothing
/// are omitted; the tool decides whether a missing required parameter is
/// a `BadRequest`.
#[must_use]
pub(crate) fn bind_arguments(
    parameters: &[ParameterSpec],
    hints: &Map<String, Value>,
    query: &str,
) -> Map<String, Value> {
    let mut bound = Map::new();
    for spec in parameters {
        if let Some(value) = hints.get(&spec.name) {
            bound.insert(spec.name.clone(), value.clone());
            continue;
        }

        let name = spec.name.to_lowercase();
        let extracted = if spec.semantic_type == SemanticType::Date || name.contains("date") {
            extract_date(query)
        } else if name == "id" || name.ends_with("_id") || name.contains("entity") {
            extract_id(query).or_else(|| {
                // A hinted entity value satisfies any id-shaped parameter.
                hints.get("entity").and_then(|v| v.as_str()).map(str::to_string)
            })
        } else if name.contains("status") || name.contains("severity") || name.contains("priority")
        {
            extract_status(query)
        } else {
            None
        };

        if let Some(value) = extracted {
            bound.insert(spec.name.clone(), Value::String(value));
        } else if let Some(default) = &spec.default {
            bound.insert(spec.name.clone(), default.clone());
        }
    }
    bound
}

/// Drops the last optional argument from a binding, for schema-mismatch
/// retries. Returns `false` when nothing removable remains.
pub(crate) fn refine_arguments(
    parameters: &[ParameterSpec],
    arguments: &mut Map<String, Value>,
) -> bool {
    let removable = parameters
        .iter()
        .rev()
        .find(|p| !p.required && arguments.contains_key(&p.name));
    match removable {
        Some(spec) => {
            arguments.remove(&spec.name);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ParameterKind;

    fn params() -> Vec<ParameterSpec> {
        vec![
            ParameterSpec::required("status", ParameterKind::Query, SemanticType::String),
            ParameterSpec::optional("user_id", ParameterKind::Query, SemanticType::String),
            ParameterSpec::optional("since_date", ParameterKind::Query, SemanticType::Date),
            {
                let mut p =
                    ParameterSpec::optional("limit", ParameterKind::Query, SemanticType::Int);
                p.default = Some(Value::from(100));
                p
            },
        ]
    }

    #[test]
    fn test_extractors() {
        assert_eq!(extract_id("alerts for U7X42A please"), Some("U7X42A".to_string()));
        assert_eq!(extract_id("no ids here"), None);
        assert_eq!(
            extract_date("since 2025-01-03 onwards"),
            Some("2025-01-03".to_string())
        );
        assert_eq!(extract_status("show OPEN alerts"), Some("open".to_string()));
        assert_eq!(extract_status("reopened alerts"), None);
    }

    #[test]
    fn test_bind_from_query_and_defaults() {
        let bound = bind_arguments(
            &params(),
            &Map::new(),
            "open alerts for USER_123 since 2025-01-03",
        );
        assert_eq!(bound["status"], "open");
        assert_eq!(bound["user_id"], "USER_123");
        assert_eq!(bound["since_date"], "2025-01-03");
        assert_eq!(bound["limit"], 100);
    }

    #[test]
    fn test_hints_win_over_extraction() {
        let mut hints = Map::new();
        hints.insert("status".to_string(), Value::String("closed".to_string()));
        let bound = bind_arguments(&params(), &hints, "open alerts");
        assert_eq!(bound["status"], "closed");
    }

    #[test]
    fn test_entity_hint_fills_id_parameter() {
        let mut hints = Map::new();
        hints.insert("entity".to_string(), Value::String("U7".to_string()));
        let bound = bind_arguments(&params(), &hints, "alerts for that user");
        assert_eq!(bound["user_id"], "U7");
    }

    #[test]
    fn test_unresolvable_parameters_omitted() {
        let bound = bind_arguments(
            &[ParameterSpec::required(
                "status",
                ParameterKind::Query,
                SemanticType::String,
            )],
            &Map::new(),
            "nothing useful",
        );
        assert!(bound.is_empty());
    }

    #[test]
    fn test_refine_removes_optionals_last_first() {
        let params = params();
        let mut bound = bind_arguments(
            &params,
            &Map::new(),
            "open alerts for USER_123 since 2025-01-03",
        );
        assert!(refine_arguments(&params, &mut bound));
        assert!(!bound.contains_key("limit"));
        assert!(refine_arguments(&params, &mut bound));
        assert!(!bound.contains_key("since_date"));
        assert!(refine_arguments(&params, &mut bound));
        assert!(!bound.contains_key("user_id"));
        // Only the required parameter remains.
        assert!(!refine_arguments(&params, &mut bound));
        assert!(bound.contains_key("status"));
    }
}
