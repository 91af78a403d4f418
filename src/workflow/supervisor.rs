//! Supervisor node: lazily creates the plan, verifies step dependencies,
//! and sets the routing hint.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, PlannerError};
use crate::plan::{Plan, StepStatus};
use crate::planner::ExecutionPlanner;
use crate::state::{AgentState, RoutingTarget};

/// Entry node of every workflow run.
pub struct Supervisor {
    planner: Arc<ExecutionPlanner>,
}

impl Supervisor {
    /// Creates the supervisor over the shared planner.
    #[must_use]
    pub fn new(planner: Arc<ExecutionPlanner>) -> Self {
        Self { planner }
    }

    /// Runs one supervisor visit.
    ///
    /// On the first visit the plan is created and stored. Steps whose
    /// dependencies are not satisfied (no ok result for a listed step
    /// number) are marked failed and skipped over; the first dispatchable
    /// step becomes the routing hint. When the cursor passes the last
    /// step the hint is set to the consolidator; an empty plan ends the
    /// run.
    pub async fn run(&self, state: &mut AgentState, cancel: &CancellationToken) {
        if state.plan().is_none() {
            match self
                .planner
                .create_plan(&state.query.clone(), &state.context.clone(), cancel)
                .await
            {
                Ok(plan) => state.set_plan(plan),
                Err(PlannerError::EmptyCatalogue) => {
                    warn!("tool catalogue is empty, ending run");
                    state.record_error(None, ErrorKind::Plan, "empty plan: no tools registered");
                    state.set_plan(Plan::empty(&state.query));
                    state.next_agent = RoutingTarget::End;
                    state.should_continue = false;
                    return;
                }
                Err(e) => {
                    // The planner recovers everything else internally;
                    // reaching here means something unexpected broke.
                    warn!(error = %e, "planner failed irrecoverably");
                    state.record_error(None, ErrorKind::Plan, "planner failed");
                    state.set_plan(Plan::empty(&state.query));
                    state.next_agent = RoutingTarget::End;
                    state.should_continue = false;
                    return;
                }
            }
        }

        if state.plan().is_some_and(Plan::is_empty) {
            state.record_error(None, ErrorKind::Plan, "empty plan");
            state.next_agent = RoutingTarget::End;
            state.should_continue = false;
            return;
        }

        // Skip past steps whose dependencies cannot be satisfied.
        while let Some(step) = state.current_step() {
            let number = step.step_number;
            let agent = step.agent_type;
            let unmet: Vec<usize> = step
                .depends_on
                .iter()
                .copied()
                .filter(|&dep| !state.step_succeeded(dep))
                .collect();
            if unmet.is_empty() {
                let total = state.plan().map_or(0, Plan::len);
                info!(step = number, total, agent = %agent, "dispatching step");
                state.next_agent = RoutingTarget::Agent(agent);
                state.should_continue = true;
                state.mark_current(StepStatus::InFlight);
                return;
            }

            debug!(step = number, ?unmet, "dependencies unmet, failing step");
            state.mark_current(StepStatus::Failed);
            state.record_error(
                Some(number),
                ErrorKind::DependencyUnmet,
                format!("step {number} requires steps {unmet:?}"),
            );
            state.advance();
        }

        debug!("all steps dispatched, routing to consolidator");
        state.next_agent = RoutingTarget::Consolidate;
        state.should_continue = true;
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor").finish_non_exhaustive()
    }
}
