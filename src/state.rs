//! Per-run workflow state and its typed mutation helpers.
//!
//! All mutation happens on the driver task; agents receive `&AgentState`
//! snapshots. Result sequences are append-only and the step cursor is
//! monotone non-decreasing — the helpers are the only way to write, so
//! the invariants hold by construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ErrorKind;
use crate::plan::{AgentType, Plan, Step, StepStatus};

/// Where the supervisor wants the router to go next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoutingTarget {
    /// Dispatch the current step to an agent.
    Agent(AgentType),
    /// All steps done; merge and format.
    Consolidate,
    /// Nothing to do; finish the run.
    #[default]
    End,
}

/// The outcome of one agent executing one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    /// Which step produced this result.
    pub step_number: usize,
    /// Which agent executed it.
    pub agent_type: AgentType,
    /// The tool that was invoked (or selected, on failure).
    pub tool_name: String,
    /// Whether the invocation succeeded.
    pub ok: bool,
    /// Normalized result rows (string-keyed records).
    pub rows: Vec<Map<String, Value>>,
    /// Failure kind when `ok` is false.
    pub error: Option<ErrorKind>,
    /// Wall-clock execution time.
    pub latency_ms: u64,
}

impl AgentResult {
    /// Creates a failed result for a step that never reached a tool.
    #[must_use]
    pub fn failed(step: &Step, tool_name: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            step_number: step.step_number,
            agent_type: step.agent_type,
            tool_name: tool_name.into(),
            ok: false,
            rows: Vec::new(),
            error: Some(kind),
            latency_ms: 0,
        }
    }
}

/// An error recorded against the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedError {
    /// The step the error belongs to, when attributable.
    pub step_number: Option<usize>,
    /// Coarse failure kind.
    pub kind: ErrorKind,
    /// Short description (already redacted of backend detail).
    pub message: String,
    /// When the error was recorded.
    pub at: DateTime<Utc>,
}

/// Accumulating per-run state.
///
/// Created when the orchestrator receives a user message, mutated only
/// through the helpers below, destroyed when the run ends.
#[derive(Debug, Clone)]
pub struct AgentState {
    /// The user's query.
    pub query: String,
    /// Opaque context supplied by the caller (session context merged
    /// with any per-message context).
    pub context: Map<String, Value>,
    /// The plan, once the supervisor created it.
    plan: Option<Plan>,
    /// Index of the step the supervisor will dispatch next.
    current_step_index: usize,
    sql_results: Vec<AgentResult>,
    rest_results: Vec<AgentResult>,
    soap_results: Vec<AgentResult>,
    /// Routing hint set by the supervisor.
    pub next_agent: RoutingTarget,
    /// Once false, no further node executes.
    pub should_continue: bool,
    final_response: Option<String>,
    errors: Vec<RecordedError>,
}

impl AgentState {
    /// Creates the initial state for a new run.
    #[must_use]
    pub fn new(query: impl Into<String>, context: Map<String, Value>) -> Self {
        Self {
            query: query.into(),
            context,
            plan: None,
            current_step_index: 0,
            sql_results: Vec::new(),
            rest_results: Vec::new(),
            soap_results: Vec::new(),
            next_agent: RoutingTarget::End,
            should_continue: true,
            final_response: None,
            errors: Vec::new(),
        }
    }

    /// The plan, if the supervisor has created one.
    #[must_use]
    pub fn plan(&self) -> Option<&Plan> {
        self.plan.as_ref()
    }

    /// Stores the plan. May only be called once per run.
    pub fn set_plan(&mut self, plan: Plan) {
        debug_assert!(self.plan.is_none(), "plan set twice");
        debug!(plan_id = %plan.plan_id, steps = plan.len(), "plan stored");
        self.plan = Some(plan);
    }

    /// Index of the step the supervisor will dispatch next.
    #[must_use]
    pub const fn current_step_index(&self) -> usize {
        self.current_step_index
    }

    /// The step at the cursor, if any remain.
    #[must_use]
    pub fn current_step(&self) -> Option<&Step> {
        self.plan
            .as_ref()
            .and_then(|p| p.steps.get(self.current_step_index))
    }

    /// Returns `true` if the cursor has passed the last step.
    #[must_use]
    pub fn plan_complete(&self) -> bool {
        self.plan
            .as_ref()
            .is_none_or(|p| self.current_step_index >= p.len())
    }

    /// Advances the cursor by one step.
    pub fn advance(&mut self) {
        self.current_step_index += 1;
    }

    /// Sets the status of the step at the cursor.
    pub fn mark_current(&mut self, status: StepStatus) {
        let idx = self.current_step_index;
        if let Some(step) = self.plan.as_mut().and_then(|p| p.steps.get_mut(idx)) {
            step.status = status;
        }
    }

    /// Appends a result to the sequence for its agent type.
    pub fn append_result(&mut self, result: AgentResult) {
        debug!(
            step = result.step_number,
            agent = %result.agent_type,
            tool = %result.tool_name,
            ok = result.ok,
            rows = result.rows.len(),
            latency_ms = result.latency_ms,
            "result appended"
        );
        match result.agent_type {
            AgentType::Sql => self.sql_results.push(result),
            AgentType::Rest => self.rest_results.push(result),
            AgentType::Soap => self.soap_results.push(result),
        }
    }

    /// Records a step outcome: marks the current step done or failed,
    /// appends the result, records its error if any, and advances.
    pub fn complete_step(&mut self, result: AgentResult) {
        self.mark_current(if result.ok {
            StepStatus::Done
        } else {
            StepStatus::Failed
        });
        if let Some(kind) = result.error {
            self.record_error(
                Some(result.step_number),
                kind,
                format!("step {} via {}", result.step_number, result.tool_name),
            );
        }
        self.append_result(result);
        self.advance();
    }

    /// Results produced by the SQL agent, in append order.
    #[must_use]
    pub fn sql_results(&self) -> &[AgentResult] {
        &self.sql_results
    }

    /// Results produced by the REST agent, in append order.
    #[must_use]
    pub fn rest_results(&self) -> &[AgentResult] {
        &self.rest_results
    }

    /// Results produced by the SOAP agent, in append order.
    #[must_use]
    pub fn soap_results(&self) -> &[AgentResult] {
        &self.soap_results
    }

    /// All results across the three sequences, SQL then REST then SOAP.
    pub fn all_results(&self) -> impl Iterator<Item = &AgentResult> {
        self.sql_results
            .iter()
            .chain(self.rest_results.iter())
            .chain(self.soap_results.iter())
    }

    /// Returns `true` if the given step number has an ok result in some
    /// sequence.
    #[must_use]
    pub fn step_succeeded(&self, step_number: usize) -> bool {
        self.all_results()
            .any(|r| r.step_number == step_number && r.ok)
    }

    /// The final response, set by the consolidator.
    #[must_use]
    pub fn final_response(&self) -> Option<&str> {
        self.final_response.as_deref()
    }

    /// Stores the consolidator's final response.
    pub fn set_final(&mut self, text: impl Into<String>) {
        self.final_response = Some(text.into());
    }

    /// Records an error against the run.
    pub fn record_error(
        &mut self,
        step_number: Option<usize>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) {
        let message = message.into();
        debug!(?step_number, kind = %kind, %message, "error recorded");
        self.errors.push(RecordedError {
            step_number,
            kind,
            message,
            at: Utc::now(),
        });
    }

    /// Errors recorded so far, in order.
    #[must_use]
    pub fn errors(&self) -> &[RecordedError] {
        &self.errors
    }

    /// Returns `true` if any error of the given kind was recorded.
    #[must_use]
    pub fn has_error(&self, kind: ErrorKind) -> bool {
        self.errors.iter().any(|e| e.kind == kind)
    }
}
