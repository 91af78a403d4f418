//! REST agent: executes steps against HTTP service tools.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{DataSourceAgent, ToolRunner};
use crate::gateway::LlmGateway;
use crate::plan::{AgentType, Step};
use crate::registry::ToolRegistry;
use crate::state::{AgentResult, AgentState};

/// Agent for REST service tools.
///
/// Transport retries are the tool's concern; HTTP-class failures surface
/// as upstream errors on the result.
pub struct RestAgent {
    runner: ToolRunner,
}

impl RestAgent {
    /// Creates the agent over the shared registry and gateway.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, gateway: Arc<LlmGateway>) -> Self {
        Self {
            runner: ToolRunner::new(registry, gateway),
        }
    }
}

#[async_trait]
impl DataSourceAgent for RestAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Rest
    }

    async fn execute(
        &self,
        step: &Step,
        state: &AgentState,
        cancel: &CancellationToken,
    ) -> AgentResult {
        self.runner
            .run_step(AgentType::Rest, step, state, cancel, 0)
            .await
    }
}
