//! Uniform completion surface over multiple providers.
//!
//! The [`LlmGateway`] wraps a single [`LlmProvider`], normalizes the raw
//! response through the ordered extraction in [`extract`], and honors a
//! caller-supplied cancellation token. It is stateless at the request
//! level and shared across all concurrent sessions.

mod extract;
mod message;
mod provider;
pub mod providers;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

pub use extract::{extract_text, extract_tool_calls};
pub use message::{
    ChatMessage, Completion, CompletionRequest, Role, ToolCall, ToolSchema, system_message,
    user_message,
};
pub use provider::LlmProvider;

use crate::error::GatewayError;

/// The uniform request/response surface consumed by the planner, agents,
/// and consolidator.
pub struct LlmGateway {
    provider: Arc<dyn LlmProvider>,
}

impl LlmGateway {
    /// Creates a gateway over the given provider.
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    /// Executes a completion and normalizes the response.
    ///
    /// Returns promptly with [`GatewayError::Cancelled`] when `cancel`
    /// fires, even if the provider call is still in flight.
    ///
    /// # Errors
    ///
    /// Propagates provider failures as [`GatewayError::Request`].
    pub async fn complete(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<Completion, GatewayError> {
        if cancel.is_cancelled() {
            return Err(GatewayError::Cancelled);
        }

        let raw = tokio::select! {
            () = cancel.cancelled() => return Err(GatewayError::Cancelled),
            result = self.provider.complete(request) => result?,
        };

        let text = extract::extract_text(&raw);
        let tool_calls = extract::extract_tool_calls(&raw);
        debug!(
            provider = self.provider.name(),
            text_len = text.len(),
            tool_calls = tool_calls.len(),
            "completion normalized"
        );
        Ok(Completion { text, tool_calls })
    }
}

impl std::fmt::Debug for LlmGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmGateway")
            .field("provider", &self.provider.name())
            .finish()
    }
}
