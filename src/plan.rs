//! Plan data types: agent classes, steps, and the dependency-ordered
//! execution plan.
//!
//! A [`Plan`] is immutable once created except for per-step status; the
//! dependency graph over its steps must be acyclic with no forward
//! references.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The family of specialized agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    /// Executes against relational databases.
    Sql,
    /// Executes against REST services.
    Rest,
    /// Executes against SOAP services.
    Soap,
}

impl AgentType {
    /// The data-source class this agent serves (one-to-one).
    #[must_use]
    pub const fn data_source_class(self) -> DataSourceClass {
        match self {
            Self::Sql => DataSourceClass::RelationalDb,
            Self::Rest => DataSourceClass::RestApi,
            Self::Soap => DataSourceClass::SoapApi,
        }
    }

    /// Returns the node-name string used in progress frames and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sql => "sql_agent",
            Self::Rest => "rest_agent",
            Self::Soap => "soap_agent",
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A backend family a tool belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSourceClass {
    /// Relational databases (Postgres, Oracle, …).
    RelationalDb,
    /// REST/HTTP services.
    RestApi,
    /// SOAP services.
    SoapApi,
}

impl DataSourceClass {
    /// The agent that serves this class (one-to-one).
    #[must_use]
    pub const fn agent_type(self) -> AgentType {
        match self {
            Self::RelationalDb => AgentType::Sql,
            Self::RestApi => AgentType::Rest,
            Self::SoapApi => AgentType::Soap,
        }
    }

    /// Parses a class string (case-insensitive). Accepts the aliases the
    /// planner's analysis may emit.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "relational_db" | "postgresql" | "oracle" | "sql" | "database" => {
                Some(Self::RelationalDb)
            }
            "rest_api" | "rest" | "http" | "api" => Some(Self::RestApi),
            "soap_api" | "soap" => Some(Self::SoapApi),
            _ => None,
        }
    }

    /// Returns the canonical string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RelationalDb => "relational_db",
            Self::RestApi => "rest_api",
            Self::SoapApi => "soap_api",
        }
    }
}

impl std::fmt::Display for DataSourceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a single planned step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not yet dispatched.
    #[default]
    Pending,
    /// Currently executing on an agent.
    InFlight,
    /// Completed with an ok result.
    Done,
    /// Completed with a failure.
    Failed,
    /// Skipped (dependency unmet or run cut short).
    Skipped,
}

/// One planned action: a single agent invoking a single tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    /// 1-based ordinal within the plan.
    pub step_number: usize,
    /// What this step retrieves, used for tool ranking.
    pub description: String,
    /// Which agent executes this step.
    pub agent_type: AgentType,
    /// Backend family of the tool to use.
    pub data_source_class: DataSourceClass,
    /// Step numbers whose ok results must be present before this step
    /// runs. Must reference strictly earlier steps.
    #[serde(default)]
    pub depends_on: BTreeSet<usize>,
    /// Partially-bound arguments lifted from the query text.
    #[serde(default)]
    pub parameter_hints: Map<String, Value>,
    /// Current lifecycle status.
    #[serde(default)]
    pub status: StepStatus,
}

impl Step {
    /// Creates a pending step for the given class.
    #[must_use]
    pub fn new(step_number: usize, description: impl Into<String>, class: DataSourceClass) -> Self {
        Self {
            step_number,
            description: description.into(),
            agent_type: class.agent_type(),
            data_source_class: class,
            depends_on: BTreeSet::new(),
            parameter_hints: Map::new(),
            status: StepStatus::Pending,
        }
    }

    /// Adds dependencies on earlier step numbers.
    #[must_use]
    pub fn with_depends_on(mut self, deps: impl IntoIterator<Item = usize>) -> Self {
        self.depends_on.extend(deps);
        self
    }

    /// Adds a parameter hint.
    #[must_use]
    pub fn with_hint(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameter_hints.insert(name.into(), value);
        self
    }
}

/// Estimated complexity of a plan, ordered from lowest to highest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    /// Single-step, single-source.
    #[default]
    Low,
    /// Multi-step or filtered retrieval.
    Med,
    /// Multi-source with joins.
    High,
}

impl Complexity {
    /// Parses a complexity string (case-insensitive). Unknown values map
    /// to `Low`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "high" => Self::High,
            "med" | "medium" => Self::Med,
            _ => Self::Low,
        }
    }

    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Med => "med",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dependency-ordered execution plan.
///
/// Immutable once created except for `steps[i].status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    /// Unique plan identifier.
    pub plan_id: String,
    /// The originating user query.
    pub query: String,
    /// Steps in execution order.
    pub steps: Vec<Step>,
    /// Whether results from multiple steps must be merged.
    pub requires_consolidation: bool,
    /// Estimated complexity.
    #[serde(default)]
    pub estimated_complexity: Complexity,
    /// Free-text planner notes; may carry an explicit `format` hint for
    /// the consolidator.
    #[serde(default)]
    pub notes: Option<String>,
}

impl Plan {
    /// Creates a plan over the given steps, deciding consolidation from
    /// the step count and the caller's flag.
    #[must_use]
    pub fn new(
        query: impl Into<String>,
        steps: Vec<Step>,
        llm_flagged_consolidation: bool,
        estimated_complexity: Complexity,
    ) -> Self {
        let requires_consolidation = steps.len() > 1 || llm_flagged_consolidation;
        Self {
            plan_id: uuid::Uuid::new_v4().to_string(),
            query: query.into(),
            steps,
            requires_consolidation,
            estimated_complexity,
            notes: None,
        }
    }

    /// Creates an empty plan (used when the catalogue is empty).
    #[must_use]
    pub fn empty(query: impl Into<String>) -> Self {
        Self::new(query, Vec::new(), false, Complexity::Low)
    }

    /// Returns `true` if the plan has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Validates the dependency graph: every `depends_on` entry must
    /// reference a strictly earlier step (which also rules out
    /// self-references and cycles, since steps are numbered in order).
    ///
    /// # Errors
    ///
    /// Returns the offending `(step_number, dependency)` pair.
    pub fn validate_dag(&self) -> Result<(), (usize, usize)> {
        for (idx, step) in self.steps.iter().enumerate() {
            let expected = idx + 1;
            if step.step_number != expected {
                return Err((step.step_number, expected));
            }
            for &dep in &step.depends_on {
                if dep == 0 || dep >= step.step_number {
                    return Err((step.step_number, dep));
                }
            }
        }
        Ok(())
    }
}
