//! SOAP agent: executes steps against SOAP service tools.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{DataSourceAgent, ToolRunner};
use crate::gateway::LlmGateway;
use crate::plan::{AgentType, Step};
use crate::registry::ToolRegistry;
use crate::state::{AgentResult, AgentState};

/// Agent for SOAP service tools.
///
/// The operation name is part of tool identity: one registered tool per
/// operation, no dynamic operation dispatch here.
pub struct SoapAgent {
    runner: ToolRunner,
}

impl SoapAgent {
    /// Creates the agent over the shared registry and gateway.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, gateway: Arc<LlmGateway>) -> Self {
        Self {
            runner: ToolRunner::new(registry, gateway),
        }
    }
}

#[async_trait]
impl DataSourceAgent for SoapAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Soap
    }

    async fn execute(
        &self,
        step: &Step,
        state: &AgentState,
        cancel: &CancellationToken,
    ) -> AgentResult {
        self.runner
            .run_step(AgentType::Soap, step, state, cancel, 0)
            .await
    }
}
