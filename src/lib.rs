//! Multi-agent query orchestration core.
//!
//! `conflux` answers natural-language questions by planning and executing
//! queries against a heterogeneous set of backends (relational databases,
//! REST services, SOAP services) and consolidating the partial results
//! into a single answer.
//!
//! The crate is organized around a graph-structured workflow:
//!
//! 1. A **supervisor** lazily asks the [`planner`] to turn the query into
//!    a dependency-ordered [`plan::Plan`] over the tool catalogue held by
//!    the [`registry`].
//! 2. A **router** dispatches each [`plan::Step`] to the specialized
//!    [`agents`] for its data-source class. Agents select a tool via the
//!    [`gateway`] (tool-calling), bind arguments, invoke, and append an
//!    [`state::AgentResult`] to the per-run [`state::AgentState`].
//! 3. A **consolidator** merges results by inferred join keys and formats
//!    the final response, falling back to deterministic rendering when the
//!    completion service is unavailable.
//! 4. The [`workflow`] driver runs one session to completion under
//!    per-node timeouts and an overall deadline, streaming progress events
//!    to the [`session`] transport (JSON frames over a WebSocket).
//!
//! Backends, completion providers, and descriptor loaders are external
//! collaborators consumed through the [`registry::Tool`],
//! [`gateway::LlmProvider`], and [`registry::Embedder`] traits.

pub mod agents;
pub mod config;
pub mod error;
pub mod gateway;
pub mod plan;
pub mod planner;
pub mod prompts;
pub mod registry;
pub mod session;
pub mod state;
pub mod workflow;

pub use config::OrchestratorConfig;
pub use error::ErrorKind;
pub use gateway::LlmGateway;
pub use plan::{AgentType, DataSourceClass, Plan, Step};
pub use planner::ExecutionPlanner;
pub use registry::{Tool, ToolDescriptor, ToolRegistry, ToolResult};
pub use state::{AgentResult, AgentState};
pub use workflow::WorkflowDriver;
