//! SQL agent: executes steps against relational database tools.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{DataSourceAgent, ToolRunner};
use crate::gateway::LlmGateway;
use crate::plan::{AgentType, Step};
use crate::registry::ToolRegistry;
use crate::state::{AgentResult, AgentState};

/// Additional attempts allowed when an ad-hoc query trips a
/// schema-mismatch error.
const SCHEMA_RETRIES: usize = 2;

/// Agent for relational database tools.
///
/// Rows are emitted in the order the tool returns them; key ordering
/// within each row is irrelevant. When a tool reports a schema mismatch
/// (ad-hoc query against an unknown result schema), the agent retries
/// with refined arguments at most twice.
pub struct SqlAgent {
    runner: ToolRunner,
}

impl SqlAgent {
    /// Creates the agent over the shared registry and gateway.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, gateway: Arc<LlmGateway>) -> Self {
        Self {
            runner: ToolRunner::new(registry, gateway),
        }
    }
}

#[async_trait]
impl DataSourceAgent for SqlAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Sql
    }

    async fn execute(
        &self,
        step: &Step,
        state: &AgentState,
        cancel: &CancellationToken,
    ) -> AgentResult {
        self.runner
            .run_step(AgentType::Sql, step, state, cancel, SCHEMA_RETRIES)
            .await
    }
}
