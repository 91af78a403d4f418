//! Normalization of provider-specific completion shapes.
//!
//! A text payload may live under several structural paths depending on
//! the provider. Extraction is an ordered list of named extractors tried
//! in sequence, with whole-response serialization as the final fallback;
//! supporting a new provider shape means appending an entry, not adding a
//! branch. Every place the core needs plain text from a completion goes
//! through [`extract_text`].

use serde_json::{Map, Value};

use super::message::ToolCall;

/// One structural path a text payload may live under.
type Extractor = fn(&Value) -> Option<String>;

/// The ordered extraction table. Earlier entries win.
pub(crate) const EXTRACTORS: &[(&str, Extractor)] = &[
    ("content_blocks", extract_content_blocks),
    ("choices_message", extract_choices_message),
    ("content_string", extract_content_string),
    ("message_content", extract_message_content),
    ("text_field", extract_text_field),
];

/// Content-block sequence: `content[0].text`.
fn extract_content_blocks(response: &Value) -> Option<String> {
    response
        .get("content")?
        .as_array()?
        .first()?
        .get("text")?
        .as_str()
        .map(str::to_string)
}

/// Choice sequence: `choices[0].message.content`.
fn extract_choices_message(response: &Value) -> Option<String> {
    response
        .get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

/// Top-level string content: `content`.
fn extract_content_string(response: &Value) -> Option<String> {
    response.get("content")?.as_str().map(str::to_string)
}

/// Nested message content: `message.content`.
fn extract_message_content(response: &Value) -> Option<String> {
    response
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

/// Top-level text: `text`.
fn extract_text_field(response: &Value) -> Option<String> {
    response.get("text")?.as_str().map(str::to_string)
}

/// Extracts plain text from a raw provider response, trying each known
/// structural path in order and falling back to serializing the whole
/// response.
#[must_use]
pub fn extract_text(response: &Value) -> String {
    for (name, extractor) in EXTRACTORS {
        if let Some(text) = extractor(response) {
            tracing::trace!(path = name, "completion text extracted");
            return text;
        }
    }
    tracing::warn!("unknown completion shape, serializing whole response");
    serde_json::to_string_pretty(response).unwrap_or_default()
}

/// Decodes a tool-call arguments value that may be an object or a
/// JSON-encoded string of one.
fn decode_arguments(value: Option<&Value>) -> Map<String, Value> {
    match value {
        Some(Value::Object(map)) => map.clone(),
        Some(Value::String(s)) => serde_json::from_str::<Value>(s)
            .ok()
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default(),
        _ => Map::new(),
    }
}

/// Extracts tool calls from a raw provider response.
///
/// Recognizes the choice-sequence shape (`choices[0].message.tool_calls`
/// with `function.name` / `function.arguments`) and the content-block
/// shape (blocks of `type: "tool_use"` with `name` / `input`). An
/// unrecognized shape yields no calls.
#[must_use]
pub fn extract_tool_calls(response: &Value) -> Vec<ToolCall> {
    if let Some(calls) = response
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("tool_calls"))
        .and_then(|t| t.as_array())
    {
        return calls
            .iter()
            .filter_map(|call| {
                let function = call.get("function")?;
                let name = function.get("name")?.as_str()?.to_string();
                Some(ToolCall {
                    tool_name: name,
                    arguments: decode_arguments(function.get("arguments")),
                })
            })
            .collect();
    }

    if let Some(blocks) = response.get("content").and_then(|c| c.as_array()) {
        return blocks
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("tool_use"))
            .filter_map(|b| {
                let name = b.get("name")?.as_str()?.to_string();
                Some(ToolCall {
                    tool_name: name,
                    arguments: decode_arguments(b.get("input")),
                })
            })
            .collect();
    }

    Vec::new()
}
