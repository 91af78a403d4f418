//! Tool descriptors and the tool capability boundary.
//!
//! A [`Tool`] is an opaque capability with a typed [`ToolDescriptor`] and
//! a single `invoke` operation. Agents never introspect concrete tool
//! types; drivers for the actual wire protocols live outside this crate.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;
use crate::plan::DataSourceClass;

/// Where a parameter is carried in the backend request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    /// URL path segment.
    Path,
    /// URL query parameter.
    Query,
    /// Request body field.
    Body,
    /// HTTP header.
    Header,
    /// Positional argument (SQL bind, SOAP operation argument).
    Positional,
}

/// Coarse value type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    /// Free text.
    String,
    /// Integer.
    Int,
    /// Decimal number.
    Decimal,
    /// Boolean.
    Bool,
    /// Calendar date.
    Date,
    /// Nested object.
    Object,
}

/// One entry of a tool's ordered parameter schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Parameter name.
    pub name: String,
    /// Where the parameter is carried.
    pub kind: ParameterKind,
    /// Coarse value type.
    pub semantic_type: SemanticType,
    /// Whether the tool requires this parameter.
    pub required: bool,
    /// Default value applied when the parameter is unbound.
    #[serde(default)]
    pub default: Option<Value>,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
}

impl ParameterSpec {
    /// Creates a required parameter.
    #[must_use]
    pub fn required(name: impl Into<String>, kind: ParameterKind, ty: SemanticType) -> Self {
        Self {
            name: name.into(),
            kind,
            semantic_type: ty,
            required: true,
            default: None,
            description: String::new(),
        }
    }

    /// Creates an optional parameter.
    #[must_use]
    pub fn optional(name: impl Into<String>, kind: ParameterKind, ty: SemanticType) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, ty)
        }
    }
}

/// Coarse verbs a tool supports, inferred from its description when not
/// provided explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Retrieves records.
    Read,
    /// Mutates backend state.
    Write,
    /// Computes counts/sums/groupings.
    Aggregate,
    /// Fetches a single record by identifier.
    LookupById,
    /// Free-text or filtered search.
    Search,
}

/// Immutable entry in the tool registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique identifier across the registry.
    pub name: String,
    /// Free text used for semantic ranking. Should enumerate the words a
    /// user might say.
    pub description: String,
    /// Backend family. Immutable after registration.
    pub data_source_class: DataSourceClass,
    /// Ordered parameter schema.
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    /// Explicit ranking keywords folded into the ranking text.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Coarse verbs this tool supports.
    #[serde(default)]
    pub capabilities: BTreeSet<Capability>,
    /// Tiebreaker between equally-ranked tools (higher wins).
    #[serde(default)]
    pub priority: i32,
}

impl ToolDescriptor {
    /// Creates a descriptor with empty parameters and keywords.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        class: DataSourceClass,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            data_source_class: class,
            parameters: Vec::new(),
            keywords: Vec::new(),
            capabilities: BTreeSet::new(),
            priority: 0,
        }
    }

    /// Sets the parameter schema.
    #[must_use]
    pub fn with_parameters(mut self, parameters: Vec<ParameterSpec>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Sets the explicit keywords.
    #[must_use]
    pub fn with_keywords(mut self, keywords: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the priority tiebreaker.
    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the capabilities explicitly.
    #[must_use]
    pub fn with_capabilities(mut self, caps: impl IntoIterator<Item = Capability>) -> Self {
        self.capabilities = caps.into_iter().collect();
        self
    }

    /// The text ranked against queries: description + name + keywords.
    #[must_use]
    pub fn ranking_text(&self) -> String {
        let mut text = String::with_capacity(
            self.description.len() + self.name.len() + self.keywords.len() * 8 + 2,
        );
        text.push_str(&self.description);
        text.push(' ');
        text.push_str(&self.name);
        for kw in &self.keywords {
            text.push(' ');
            text.push_str(kw);
        }
        text
    }

    /// Infers capability verbs from the description when none were set.
    pub(crate) fn infer_capabilities(&mut self) {
        if !self.capabilities.is_empty() {
            return;
        }
        let text = format!("{} {}", self.description, self.name).to_lowercase();
        let rules: [(&str, Capability); 10] = [
            ("list", Capability::Read),
            ("get", Capability::Read),
            ("show", Capability::Read),
            ("fetch", Capability::Read),
            ("create", Capability::Write),
            ("update", Capability::Write),
            ("delete", Capability::Write),
            ("count", Capability::Aggregate),
            ("by id", Capability::LookupById),
            ("search", Capability::Search),
        ];
        for (needle, cap) in rules {
            if text.contains(needle) {
                self.capabilities.insert(cap);
            }
        }
        if self.capabilities.is_empty() {
            self.capabilities.insert(Capability::Read);
        }
    }

    /// Builds the JSON-Schema object exposed to the LLM for tool-calling.
    #[must_use]
    pub fn parameter_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for p in &self.parameters {
            let ty = match p.semantic_type {
                SemanticType::String | SemanticType::Date => "string",
                SemanticType::Int => "integer",
                SemanticType::Decimal => "number",
                SemanticType::Bool => "boolean",
                SemanticType::Object => "object",
            };
            let mut prop = Map::new();
            prop.insert("type".to_string(), Value::String(ty.to_string()));
            if !p.description.is_empty() {
                prop.insert(
                    "description".to_string(),
                    Value::String(p.description.clone()),
                );
            }
            if let Some(default) = &p.default {
                prop.insert("default".to_string(), default.clone());
            }
            properties.insert(p.name.clone(), Value::Object(prop));
            if p.required {
                required.push(Value::String(p.name.clone()));
            }
        }
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false
        })
    }
}

/// What a tool returns on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Normalized result rows (string-keyed records). May be empty.
    pub rows: Vec<Map<String, Value>>,
    /// The tool's raw return, retained for the consolidator when the
    /// structure is unknown.
    pub raw: Value,
    /// Provenance tag, equal to the tool name.
    pub source_tag: String,
}

impl ToolResult {
    /// Wraps rows with the given provenance tag, keeping the rows as the
    /// raw value.
    #[must_use]
    pub fn from_rows(rows: Vec<Map<String, Value>>, source_tag: impl Into<String>) -> Self {
        let raw = Value::Array(rows.iter().cloned().map(Value::Object).collect());
        Self {
            rows,
            raw,
            source_tag: source_tag.into(),
        }
    }
}

/// An invocable backend capability.
///
/// Implementations own their wire protocol and connection pooling; the
/// orchestration core only sees the descriptor and `invoke`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The tool's immutable descriptor.
    fn descriptor(&self) -> &ToolDescriptor;

    /// Invokes the tool with bound arguments.
    ///
    /// Implementations must observe `cancel` at their suspension points
    /// and return promptly once it fires.
    ///
    /// # Errors
    ///
    /// Returns a [`ToolError`] describing the backend failure.
    async fn invoke(
        &self,
        arguments: Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<ToolResult, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "list_alerts",
            "List alerts filtered by status. Keywords: alerts, open, severity.",
            DataSourceClass::RestApi,
        )
        .with_parameters(vec![
            ParameterSpec::required("status", ParameterKind::Query, SemanticType::String),
            ParameterSpec::optional("limit", ParameterKind::Query, SemanticType::Int),
        ])
        .with_keywords(["alerts", "incidents"])
    }

    #[test]
    fn test_ranking_text_folds_keywords() {
        let text = descriptor().ranking_text();
        assert!(text.contains("list_alerts"));
        assert!(text.contains("incidents"));
    }

    #[test]
    fn test_capability_inference() {
        let mut d = descriptor();
        d.infer_capabilities();
        assert!(d.capabilities.contains(&Capability::Read));

        let mut d = ToolDescriptor::new("x", "Count rows by group", DataSourceClass::RelationalDb);
        d.infer_capabilities();
        assert!(d.capabilities.contains(&Capability::Aggregate));

        // Explicit capabilities are never overwritten.
        let mut d = descriptor().with_capabilities([Capability::Write]);
        d.infer_capabilities();
        assert_eq!(d.capabilities.len(), 1);
        assert!(d.capabilities.contains(&Capability::Write));
    }

    #[test]
    fn test_parameter_json_schema() {
        let schema = descriptor().parameter_json_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["status"]["type"], "string");
        assert_eq!(schema["properties"]["limit"]["type"], "integer");
        assert_eq!(schema["required"], serde_json::json!(["status"]));
    }

    #[test]
    fn test_tool_result_from_rows() {
        let mut row = Map::new();
        row.insert("alert_id".to_string(), Value::String("A1".to_string()));
        let result = ToolResult::from_rows(vec![row], "list_alerts");
        assert_eq!(result.source_tag, "list_alerts");
        assert_eq!(result.rows.len(), 1);
        assert!(result.raw.is_array());
    }
}
