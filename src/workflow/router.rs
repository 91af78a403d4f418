//! Routing: a pure, total function from state to the next node.

use serde::Serialize;

use crate::plan::AgentType;
use crate::state::{AgentState, RoutingTarget};

/// The nodes of the compiled workflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeName {
    /// Plans and dispatches steps.
    Supervisor,
    /// SQL agent node.
    SqlAgent,
    /// REST agent node.
    RestAgent,
    /// SOAP agent node.
    SoapAgent,
    /// Merges and formats results.
    Consolidator,
    /// Terminal node.
    End,
}

impl NodeName {
    /// The node serving the given agent type.
    #[must_use]
    pub const fn for_agent(agent: AgentType) -> Self {
        match agent {
            AgentType::Sql => Self::SqlAgent,
            AgentType::Rest => Self::RestAgent,
            AgentType::Soap => Self::SoapAgent,
        }
    }

    /// String form used in progress frames and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Supervisor => "supervisor",
            Self::SqlAgent => "sql_agent",
            Self::RestAgent => "rest_agent",
            Self::SoapAgent => "soap_agent",
            Self::Consolidator => "consolidator",
            Self::End => "end",
        }
    }
}

impl std::fmt::Display for NodeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the next node given the node that just ran and the state it
/// produced.
///
/// Total and deterministic: the same `(origin, state)` always yields the
/// same node.
///
/// - From the supervisor, the `next_agent` hint decides.
/// - From an agent: back to the supervisor while steps remain and the
///   run should continue; otherwise to the consolidator when the plan
///   requires consolidation, else straight to the end.
/// - From the consolidator (or the end itself): always the end.
#[must_use]
pub fn route(origin: NodeName, state: &AgentState) -> NodeName {
    match origin {
        NodeName::Supervisor => match state.next_agent {
            RoutingTarget::Agent(agent) => NodeName::for_agent(agent),
            RoutingTarget::Consolidate => NodeName::Consolidator,
            RoutingTarget::End => NodeName::End,
        },
        NodeName::SqlAgent | NodeName::RestAgent | NodeName::SoapAgent => {
            if state.should_continue && !state.plan_complete() {
                NodeName::Supervisor
            } else if state.plan().is_some_and(|p| p.requires_consolidation) {
                NodeName::Consolidator
            } else {
                NodeName::End
            }
        }
        NodeName::Consolidator | NodeName::End => NodeName::End,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    use crate::plan::{Complexity, DataSourceClass, Plan, Step};

    fn state_with_steps(count: usize, requires_consolidation: bool) -> AgentState {
        let steps: Vec<Step> = (1..=count)
            .map(|n| Step::new(n, format!("step {n}"), DataSourceClass::RestApi))
            .collect();
        let mut state = AgentState::new("q", Map::new());
        state.set_plan(Plan::new("q", steps, requires_consolidation, Complexity::Low));
        state
    }

    #[test]
    fn test_supervisor_routes_by_hint() {
        let mut state = state_with_steps(1, false);
        state.next_agent = RoutingTarget::Agent(AgentType::Sql);
        assert_eq!(route(NodeName::Supervisor, &state), NodeName::SqlAgent);

        state.next_agent = RoutingTarget::Consolidate;
        assert_eq!(route(NodeName::Supervisor, &state), NodeName::Consolidator);

        state.next_agent = RoutingTarget::End;
        assert_eq!(route(NodeName::Supervisor, &state), NodeName::End);
    }

    #[test]
    fn test_agent_returns_to_supervisor_while_steps_remain() {
        let mut state = state_with_steps(2, true);
        state.advance();
        assert_eq!(route(NodeName::RestAgent, &state), NodeName::Supervisor);
    }

    #[test]
    fn test_agent_to_consolidator_when_required() {
        let mut state = state_with_steps(2, true);
        state.advance();
        state.advance();
        assert_eq!(route(NodeName::RestAgent, &state), NodeName::Consolidator);
    }

    #[test]
    fn test_agent_to_end_without_consolidation() {
        let mut state = state_with_steps(1, false);
        state.advance();
        assert_eq!(route(NodeName::RestAgent, &state), NodeName::End);
    }

    #[test]
    fn test_agent_consolidates_when_continue_cleared_mid_plan() {
        // Steps remain but the run was told to stop: the consolidator
        // still gets whatever results exist.
        let mut state = state_with_steps(2, false);
        state.advance();
        state.should_continue = false;
        assert_eq!(route(NodeName::SqlAgent, &state), NodeName::Consolidator);
    }

    #[test]
    fn test_consolidator_always_ends() {
        let state = state_with_steps(1, true);
        assert_eq!(route(NodeName::Consolidator, &state), NodeName::End);
        assert_eq!(route(NodeName::End, &state), NodeName::End);
    }

    #[test]
    fn test_route_deterministic() {
        let mut state = state_with_steps(3, true);
        state.next_agent = RoutingTarget::Agent(AgentType::Soap);
        for _ in 0..5 {
            assert_eq!(route(NodeName::Supervisor, &state), NodeName::SoapAgent);
        }
    }
}
