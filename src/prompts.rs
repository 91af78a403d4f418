//! System prompts and template builders for the planner, agents, and
//! consolidator.

use std::fmt::Write;

use serde_json::{Map, Value};

use crate::plan::Step;

/// System prompt for the planner's query analysis.
pub const PLANNER_SYSTEM_PROMPT: &str = r#"You are a query planner for a data assistant that can read from relational databases, REST services, and SOAP services.

Analyze the user's request against the available tools and respond with a single JSON object:

{
  "intent": "short verb phrase describing what the user wants",
  "entities": ["identifiers, names, or values mentioned in the request"],
  "required_sources": ["relational_db" | "rest_api" | "soap_api", ...],
  "requires_consolidation": true | false,
  "estimated_complexity": "low" | "med" | "high",
  "notes": "optional hints for formatting the final answer"
}

Rules:
- Only list sources that have a tool capable of answering part of the request.
- Set requires_consolidation to true when data from different sources must be merged.
- Order required_sources so that sources producing identifiers come before sources consuming them.
- Return ONLY the JSON object, no surrounding text."#;

/// System prompt for an agent's tool selection round.
pub const TOOL_SELECTION_SYSTEM_PROMPT: &str = r"You are a data retrieval agent. You are given one step of an execution plan and a set of candidate tools.

Choose exactly ONE tool and call it with arguments bound to its parameter schema. Lift argument values from the step description and the original query; apply a parameter's default when the request does not mention it. Do not invent values for required parameters that the request does not imply — prefer the tool whose required parameters you can actually bind.

If no candidate tool can answer the step, reply with the single word: none";

/// System prompt for the consolidator's formatting round.
pub const CONSOLIDATOR_SYSTEM_PROMPT: &str = r"You are a data consolidation assistant. You merge already-joined rows from multiple data sources into a coherent, well-formatted answer to the user's question.

Rules:
- Present the data clearly: a markdown table for lists, key/value lines for a single record, a short sentence for counts.
- Mention the contributing sources when rows carry provenance fields (_source, _sources).
- Analyze only what is visible in the rows; do not invent thresholds, policies, or context you were not given.
- If a partial-failure note is included, acknowledge that some data may be missing.";

/// Builds the planner's analysis message: query, optional context, and a
/// compact tool catalogue.
#[must_use]
pub fn build_analysis_prompt(
    query: &str,
    context: &Map<String, Value>,
    catalogue_lines: &[String],
) -> String {
    let mut prompt = String::with_capacity(256 + catalogue_lines.len() * 64);
    let _ = writeln!(prompt, "Request: {query}");
    if !context.is_empty() {
        let _ = writeln!(
            prompt,
            "Context: {}",
            serde_json::to_string(context).unwrap_or_default()
        );
    }
    prompt.push_str("\nAvailable tools:\n");
    for line in catalogue_lines {
        let _ = writeln!(prompt, "- {line}");
    }
    prompt
}

/// Builds the tool-selection message for one step.
#[must_use]
pub fn build_selection_prompt(step: &Step, query: &str) -> String {
    let mut prompt = String::with_capacity(128);
    let _ = writeln!(prompt, "Original request: {query}");
    let _ = writeln!(
        prompt,
        "Current step ({} of the plan): {}",
        step.step_number, step.description
    );
    if !step.parameter_hints.is_empty() {
        let _ = writeln!(
            prompt,
            "Known argument values: {}",
            serde_json::to_string(&step.parameter_hints).unwrap_or_default()
        );
    }
    prompt.push_str("Choose one tool and bind its arguments.");
    prompt
}

/// Builds the consolidation message: query, merged rows, strategy, and an
/// optional partial-failure note.
#[must_use]
pub fn build_consolidation_prompt(
    query: &str,
    rows: &[Map<String, Value>],
    strategy: &str,
    failure_note: Option<&str>,
) -> String {
    let mut prompt = String::with_capacity(256 + rows.len() * 64);
    let _ = writeln!(prompt, "User question: {query}");
    let _ = writeln!(prompt, "Merge strategy applied: {strategy}");
    if let Some(note) = failure_note {
        let _ = writeln!(prompt, "Partial-failure note: {note}");
    }
    let _ = writeln!(prompt, "\nMerged rows ({}):", rows.len());
    let _ = writeln!(
        prompt,
        "```json\n{}\n```",
        serde_json::to_string_pretty(rows).unwrap_or_default()
    );
    prompt.push_str("\nWrite the answer:");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::DataSourceClass;

    #[test]
    fn test_analysis_prompt_lists_tools() {
        let lines = vec![
            "list_alerts (rest_api): List alerts".to_string(),
            "alerts_by_user (relational_db): Query alerts".to_string(),
        ];
        let prompt = build_analysis_prompt("show alerts", &Map::new(), &lines);
        assert!(prompt.contains("Request: show alerts"));
        assert!(prompt.contains("- list_alerts (rest_api)"));
        assert!(!prompt.contains("Context:"));
    }

    #[test]
    fn test_analysis_prompt_includes_context() {
        let mut context = Map::new();
        context.insert("department".to_string(), Value::String("Eng".to_string()));
        let prompt = build_analysis_prompt("q", &context, &[]);
        assert!(prompt.contains("Context:"));
        assert!(prompt.contains("department"));
    }

    #[test]
    fn test_selection_prompt_carries_hints() {
        let step = Step::new(1, "get open alerts", DataSourceClass::RestApi)
            .with_hint("status", Value::String("open".to_string()));
        let prompt = build_selection_prompt(&step, "show open alerts");
        assert!(prompt.contains("get open alerts"));
        assert!(prompt.contains("\"status\":\"open\""));
    }

    #[test]
    fn test_consolidation_prompt_embeds_rows() {
        let mut row = Map::new();
        row.insert("alert_id".to_string(), Value::String("A1".to_string()));
        let prompt = build_consolidation_prompt("q", &[row], "join", Some("1 of 2 steps failed"));
        assert!(prompt.contains("Merge strategy applied: join"));
        assert!(prompt.contains("alert_id"));
        assert!(prompt.contains("Partial-failure note"));
    }
}
