//! Workflow driver: the compiled graph and its execution loop.
//!
//! Nodes are fixed (supervisor, three agents, consolidator); edges are
//! conditional through [`route`](super::router::route). One run executes
//! nodes sequentially on the caller's task under a per-node timeout, an
//! overall deadline, and a supervisor-visit cap, emitting ordered
//! progress events through a bounded channel — a full channel pauses
//! execution rather than dropping events.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::consolidator::Consolidator;
use super::router::{NodeName, route};
use super::supervisor::Supervisor;
use crate::agents::{DataSourceAgent, RestAgent, SoapAgent, SqlAgent};
use crate::config::{OrchestratorConfig, UnknownNodePolicy};
use crate::error::ErrorKind;
use crate::gateway::LlmGateway;
use crate::plan::AgentType;
use crate::planner::ExecutionPlanner;
use crate::registry::ToolRegistry;
use crate::state::{AgentResult, AgentState};

/// Summary of what one node execution changed.
#[derive(Debug, Clone, Serialize)]
pub struct NodeUpdate {
    /// The node that ran.
    pub node: NodeName,
    /// The step it worked on, when applicable.
    pub step_number: Option<usize>,
    /// Whether the step succeeded, when applicable.
    pub ok: Option<bool>,
}

/// Progress events emitted by a run, in production order.
#[derive(Debug, Clone, Serialize)]
pub enum WorkflowEvent {
    /// A node finished executing.
    Node(NodeUpdate),
    /// The run finished; always the last event.
    Completed {
        /// The final response text.
        final_response: String,
    },
}

/// The compiled workflow graph.
pub struct WorkflowDriver {
    supervisor: Supervisor,
    agents: HashMap<AgentType, Arc<dyn DataSourceAgent>>,
    consolidator: Consolidator,
    config: OrchestratorConfig,
}

impl WorkflowDriver {
    /// Compiles the standard graph over the shared registry and gateway:
    /// supervisor → (sql | rest | soap) → supervisor → … → consolidator.
    #[must_use]
    pub fn new(
        registry: Arc<ToolRegistry>,
        gateway: Arc<LlmGateway>,
        config: OrchestratorConfig,
    ) -> Self {
        let planner = Arc::new(ExecutionPlanner::new(
            Arc::clone(&gateway),
            Arc::clone(&registry),
        ));
        let mut agents: HashMap<AgentType, Arc<dyn DataSourceAgent>> = HashMap::new();
        agents.insert(
            AgentType::Sql,
            Arc::new(SqlAgent::new(Arc::clone(&registry), Arc::clone(&gateway))),
        );
        agents.insert(
            AgentType::Rest,
            Arc::new(RestAgent::new(Arc::clone(&registry), Arc::clone(&gateway))),
        );
        agents.insert(
            AgentType::Soap,
            Arc::new(SoapAgent::new(Arc::clone(&registry), Arc::clone(&gateway))),
        );
        Self {
            supervisor: Supervisor::new(planner),
            agents,
            consolidator: Consolidator::new(gateway, config.llm_row_cap),
            config,
        }
    }

    /// Replaces the executor for one agent type (tests, partial
    /// deployments).
    #[must_use]
    pub fn with_agent(mut self, agent: Arc<dyn DataSourceAgent>) -> Self {
        self.agents.insert(agent.agent_type(), agent);
        self
    }

    /// Removes the executor for an agent type, leaving routing to the
    /// unknown-node policy.
    #[must_use]
    pub fn without_agent(mut self, agent_type: AgentType) -> Self {
        self.agents.remove(&agent_type);
        self
    }

    /// Runs one session's workflow to completion.
    ///
    /// Emits ordered [`WorkflowEvent`]s into `events`; the `Completed`
    /// event is always last on a finished run. A cancelled run (token
    /// fired or event receiver dropped) stops without emitting further
    /// events. Returns the final state.
    pub async fn run(
        &self,
        mut state: AgentState,
        events: mpsc::Sender<WorkflowEvent>,
        cancel: CancellationToken,
    ) -> AgentState {
        let deadline = Instant::now() + self.config.overall_deadline;
        let mut node = NodeName::Supervisor;
        let mut supervisor_visits = 0usize;

        loop {
            if cancel.is_cancelled() {
                info!("run cancelled");
                state.record_error(None, ErrorKind::Cancelled, "run cancelled");
                state.should_continue = false;
                return state;
            }

            if node != NodeName::End
                && node != NodeName::Consolidator
                && Instant::now() >= deadline
            {
                warn!("overall deadline exceeded, consolidating partial results");
                state.record_error(None, ErrorKind::DeadlineExceeded, "overall deadline exceeded");
                node = NodeName::Consolidator;
            }

            match node {
                NodeName::Supervisor => {
                    supervisor_visits += 1;
                    if supervisor_visits > self.config.max_iterations {
                        warn!(
                            visits = supervisor_visits,
                            cap = self.config.max_iterations,
                            "iteration cap exceeded"
                        );
                        state.record_error(
                            None,
                            ErrorKind::Internal,
                            "incomplete: iteration cap reached",
                        );
                        node = NodeName::Consolidator;
                        continue;
                    }

                    let ran = tokio::time::timeout(
                        self.config.node_timeout,
                        self.supervisor.run(&mut state, &cancel),
                    )
                    .await;
                    if ran.is_err() {
                        warn!("supervisor timed out");
                        state.record_error(None, ErrorKind::Timeout, "supervisor timed out");
                        state.should_continue = false;
                        state.next_agent = crate::state::RoutingTarget::End;
                    }

                    if !self
                        .emit(
                            &events,
                            NodeUpdate {
                                node: NodeName::Supervisor,
                                step_number: state.current_step().map(|s| s.step_number),
                                ok: None,
                            },
                        )
                        .await
                    {
                        cancel.cancel();
                        continue;
                    }
                    node = route(NodeName::Supervisor, &state);
                }

                NodeName::SqlAgent | NodeName::RestAgent | NodeName::SoapAgent => {
                    let Some(step) = state.current_step().cloned() else {
                        debug!(node = %node, "no step at cursor, returning to supervisor");
                        node = NodeName::Supervisor;
                        continue;
                    };

                    let Some(agent) = self.agents.get(&step.agent_type).map(Arc::clone) else {
                        match self.config.unknown_node_policy {
                            UnknownNodePolicy::End => {
                                warn!(agent = %step.agent_type, "no executor registered, skipping step");
                                state.complete_step(AgentResult::failed(
                                    &step,
                                    "(unregistered)",
                                    ErrorKind::ToolNotFound,
                                ));
                                node = route(node, &state);
                                continue;
                            }
                            UnknownNodePolicy::Error => {
                                warn!(agent = %step.agent_type, "no executor registered, aborting run");
                                state.record_error(
                                    Some(step.step_number),
                                    ErrorKind::Internal,
                                    "no executor for agent",
                                );
                                state.should_continue = false;
                                node = NodeName::End;
                                continue;
                            }
                        }
                    };

                    let result = self
                        .execute_agent(&*agent, &step, &state, &cancel)
                        .await;
                    let update = NodeUpdate {
                        node,
                        step_number: Some(result.step_number),
                        ok: Some(result.ok),
                    };
                    state.complete_step(result);

                    if !self.emit(&events, update).await {
                        cancel.cancel();
                        continue;
                    }
                    node = route(node, &state);
                }

                NodeName::Consolidator => {
                    let text = match tokio::time::timeout(
                        self.config.node_timeout,
                        AssertUnwindSafe(self.consolidator.run(&state, &cancel)).catch_unwind(),
                    )
                    .await
                    {
                        Ok(Ok(text)) => text,
                        Ok(Err(_)) => {
                            warn!("consolidator panicked");
                            state.record_error(None, ErrorKind::Internal, "consolidator panicked");
                            super::format::render_auto(&[], None)
                        }
                        Err(_) => {
                            warn!("consolidator timed out");
                            state.record_error(None, ErrorKind::Timeout, "consolidator timed out");
                            super::format::render_auto(&[], None)
                        }
                    };
                    state.set_final(text);

                    if !self
                        .emit(
                            &events,
                            NodeUpdate {
                                node: NodeName::Consolidator,
                                step_number: None,
                                ok: Some(true),
                            },
                        )
                        .await
                    {
                        cancel.cancel();
                        continue;
                    }
                    node = NodeName::End;
                }

                NodeName::End => {
                    state.should_continue = false;
                    // Runs that bypassed the consolidator (single step,
                    // no consolidation; empty plan) still owe an answer.
                    if state.final_response().is_none() {
                        let text = match tokio::time::timeout(
                            self.config.node_timeout,
                            self.consolidator.run(&state, &cancel),
                        )
                        .await
                        {
                            Ok(text) => text,
                            Err(_) => {
                                state.record_error(
                                    None,
                                    ErrorKind::Timeout,
                                    "consolidator timed out",
                                );
                                super::format::render_auto(&[], None)
                            }
                        };
                        state.set_final(text);
                    }
                    let final_response = state.final_response().unwrap_or_default().to_string();
                    info!(chars = final_response.len(), "run complete");
                    let _ = events
                        .send(WorkflowEvent::Completed { final_response })
                        .await;
                    return state;
                }
            }
        }
    }

    /// Executes one agent under the node timeout, converting panics and
    /// timeouts into failed results.
    async fn execute_agent(
        &self,
        agent: &dyn DataSourceAgent,
        step: &crate::plan::Step,
        state: &AgentState,
        cancel: &CancellationToken,
    ) -> AgentResult {
        let outcome = tokio::time::timeout(
            self.config.node_timeout,
            AssertUnwindSafe(agent.execute(step, state, cancel)).catch_unwind(),
        )
        .await;

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                warn!(step = step.step_number, "agent panicked");
                AgentResult::failed(step, "(panicked)", ErrorKind::Internal)
            }
            Err(_) => {
                warn!(step = step.step_number, "agent timed out");
                AgentResult::failed(step, "(timeout)", ErrorKind::Timeout)
            }
        }
    }

    /// Sends an event, returning `false` when the receiver is gone.
    async fn emit(&self, events: &mpsc::Sender<WorkflowEvent>, update: NodeUpdate) -> bool {
        events.send(WorkflowEvent::Node(update)).await.is_ok()
    }
}

impl std::fmt::Debug for WorkflowDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowDriver")
            .field("agents", &self.agents.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
