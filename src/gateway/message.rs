//! Provider-agnostic message types for completion requests.
//!
//! These types decouple the planner, agents, and consolidator from any
//! specific completion SDK. Providers translate them into their own wire
//! shapes and hand back the raw response for normalization.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Role of a chat message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// User input.
    User,
    /// Assistant response.
    Assistant,
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the sender.
    pub role: Role,
    /// Message content.
    pub content: String,
}

/// Creates a system message.
#[must_use]
pub fn system_message(content: &str) -> ChatMessage {
    ChatMessage {
        role: Role::System,
        content: content.to_string(),
    }
}

/// Creates a user message.
#[must_use]
pub fn user_message(content: &str) -> ChatMessage {
    ChatMessage {
        role: Role::User,
        content: content.to_string(),
    }
}

/// A tool exposed to the model for tool-calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Tool name.
    pub name: String,
    /// What the tool does.
    pub description: String,
    /// JSON Schema object describing the tool's parameters.
    pub parameters: Value,
}

/// A completion request (provider-agnostic).
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// Model override; providers fall back to their configured default.
    pub model: Option<String>,
    /// Ordered conversation messages.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Request JSON-formatted output.
    pub json_mode: bool,
    /// Tools available to the model.
    pub tools: Vec<ToolSchema>,
}

impl CompletionRequest {
    /// Builds a request from system + user messages.
    #[must_use]
    pub fn from_prompts(system: &str, user: &str) -> Self {
        Self {
            messages: vec![system_message(system), user_message(user)],
            ..Self::default()
        }
    }

    /// Sets the temperature.
    #[must_use]
    pub const fn with_temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    /// Sets the maximum tokens to generate.
    #[must_use]
    pub const fn with_max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }

    /// Requests JSON output.
    #[must_use]
    pub const fn with_json_mode(mut self) -> Self {
        self.json_mode = true;
        self
    }

    /// Exposes tools to the model.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        self.tools = tools;
        self
    }
}

/// A tool invocation requested by the model, with decoded arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    /// Name of the tool to invoke.
    pub tool_name: String,
    /// Arguments bound to the tool's parameter schema.
    pub arguments: Map<String, Value>,
}

/// A normalized completion.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Plain text, extracted via the gateway's ordered extraction.
    pub text: String,
    /// Tool calls requested by the model, in order.
    pub tool_calls: Vec<ToolCall>,
}
