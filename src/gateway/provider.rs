//! Pluggable completion provider trait.
//!
//! Implementations translate the provider-agnostic
//! [`CompletionRequest`](super::message::CompletionRequest) into their
//! SDK's wire shape and return the **raw** response as JSON. The gateway
//! applies the ordered extraction of [`super::extract`] so provider-shape
//! knowledge never leaks into the planner, agents, or consolidator.

use async_trait::async_trait;
use serde_json::Value;

use super::message::CompletionRequest;
use crate::error::GatewayError;

/// A completion backend.
///
/// Implementations handle transport, authentication, and retries for one
/// provider while presenting a uniform interface. They must be fully
/// reentrant: the gateway is shared across all concurrent sessions.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logging (e.g. `"openai"`).
    fn name(&self) -> &'static str;

    /// Executes a completion request and returns the provider's raw
    /// response serialized to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Request`] on transport or API failures.
    async fn complete(&self, request: &CompletionRequest) -> Result<Value, GatewayError>;
}
