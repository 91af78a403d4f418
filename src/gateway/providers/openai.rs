//! `OpenAI`-compatible provider using the `async-openai` crate.
//!
//! Supports any API that follows the `OpenAI` chat completion spec
//! (`OpenAI`, Azure, local proxies) via the base URL override. The raw
//! response is handed back as JSON for the gateway's ordered extraction.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, ChatCompletionTool, ChatCompletionToolType,
    CreateChatCompletionRequest, FunctionObject, ResponseFormat,
};
use async_trait::async_trait;
use serde_json::Value;

use super::super::message::{ChatMessage, CompletionRequest, Role};
use super::super::provider::LlmProvider;
use crate::error::GatewayError;

/// Default model used when a request carries no override.
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// `OpenAI`-compatible completion provider.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    default_model: String,
}

impl OpenAiProvider {
    /// Creates a provider with the given API key, optional base URL, and
    /// optional default model.
    #[must_use]
    pub fn new(api_key: &str, base_url: Option<&str>, default_model: Option<&str>) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(url) = base_url {
            config = config.with_api_base(url);
        }
        Self {
            client: Client::with_config(config),
            default_model: default_model.unwrap_or(DEFAULT_MODEL).to_string(),
        }
    }

    /// Converts our message type to the SDK type.
    fn convert_message(msg: &ChatMessage) -> ChatCompletionRequestMessage {
        match msg.role {
            Role::System => {
                ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                    content: ChatCompletionRequestSystemMessageContent::Text(msg.content.clone()),
                    name: None,
                })
            }
            Role::User | Role::Assistant => {
                ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                    content: ChatCompletionRequestUserMessageContent::Text(msg.content.clone()),
                    name: None,
                })
            }
        }
    }

    /// Builds the SDK request from our generic request.
    fn build_request(&self, request: &CompletionRequest) -> CreateChatCompletionRequest {
        let messages: Vec<_> = request.messages.iter().map(Self::convert_message).collect();

        let response_format = if request.json_mode {
            Some(ResponseFormat::JsonObject)
        } else {
            None
        };

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|t| ChatCompletionTool {
                        r#type: ChatCompletionToolType::Function,
                        function: FunctionObject {
                            name: t.name.clone(),
                            description: Some(t.description.clone()),
                            parameters: Some(t.parameters.clone()),
                            strict: None,
                        },
                    })
                    .collect(),
            )
        };

        CreateChatCompletionRequest {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.default_model.clone()),
            messages,
            temperature: request.temperature.filter(|&t| t != 0.0),
            max_completion_tokens: request.max_tokens,
            response_format,
            tools,
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("default_model", &self.default_model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Value, GatewayError> {
        let sdk_request = self.build_request(request);

        let response = self
            .client
            .chat()
            .create(sdk_request)
            .await
            .map_err(|e| GatewayError::Request {
                message: e.to_string(),
                status: None,
            })?;

        serde_json::to_value(&response).map_err(|e| GatewayError::Request {
            message: format!("response serialization failed: {e}"),
            status: None,
        })
    }
}
