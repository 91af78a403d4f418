//! Specialized data-source agents.
//!
//! One agent per backend family (SQL, REST, SOAP), all sharing the same
//! contract: ask the registry for candidate tools, let the model pick one
//! via tool-calling, bind arguments, invoke, and normalize the return
//! into an [`AgentResult`]. Agents never panic the workflow — every
//! failure path produces an `ok: false` result.

mod binding;
mod rest;
mod soap;
mod sql;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub use rest::RestAgent;
pub use soap::SoapAgent;
pub use sql::SqlAgent;

use crate::error::{ErrorKind, ToolError};
use crate::gateway::{CompletionRequest, LlmGateway, ToolSchema};
use crate::plan::{AgentType, Step};
use crate::prompts::{TOOL_SELECTION_SYSTEM_PROMPT, build_selection_prompt};
use crate::registry::{ToolDescriptor, ToolRegistry, ToolResult};
use crate::state::{AgentResult, AgentState};

/// How many ranked candidates are exposed to the model.
const TOP_K: usize = 5;

/// A node that executes one plan step against a tool of its data-source
/// class.
#[async_trait]
pub trait DataSourceAgent: Send + Sync {
    /// Which agent family this is.
    fn agent_type(&self) -> AgentType;

    /// Executes the step against a snapshot of the run state.
    ///
    /// Never fails: errors are carried inside the returned result.
    async fn execute(
        &self,
        step: &Step,
        state: &AgentState,
        cancel: &CancellationToken,
    ) -> AgentResult;
}

/// Shared select → bind → invoke → normalize machinery used by all three
/// agents.
pub(crate) struct ToolRunner {
    registry: Arc<ToolRegistry>,
    gateway: Arc<LlmGateway>,
}

impl ToolRunner {
    pub(crate) fn new(registry: Arc<ToolRegistry>, gateway: Arc<LlmGateway>) -> Self {
        Self { registry, gateway }
    }

    /// Runs one step. `schema_retries` is the number of additional
    /// attempts permitted when the tool reports a schema mismatch.
    pub(crate) async fn run_step(
        &self,
        agent_type: AgentType,
        step: &Step,
        state: &AgentState,
        cancel: &CancellationToken,
        schema_retries: usize,
    ) -> AgentResult {
        let start = Instant::now();
        let class = agent_type.data_source_class();
        let ranking_query = format!("{} {}", step.description, state.query);
        let candidates = self.registry.rank(&ranking_query, Some(class));

        if candidates.is_empty() {
            warn!(agent = %agent_type, step = step.step_number, "no candidate tools");
            return AgentResult::failed(step, "(none)", ErrorKind::ToolNotFound);
        }
        let candidates: Vec<Arc<ToolDescriptor>> = candidates
            .into_iter()
            .take(TOP_K)
            .map(|(d, _)| d)
            .collect();

        let (descriptor, mut arguments) =
            self.select_tool(step, state, &candidates, cancel).await;

        let tool = match self.registry.get(&descriptor.name) {
            Ok(tool) => tool,
            Err(e) => {
                warn!(tool = %descriptor.name, error = %e, "selected tool vanished");
                return AgentResult::failed(step, &*descriptor.name, ErrorKind::Internal);
            }
        };

        let mut attempts = 0usize;
        let invocation = loop {
            attempts += 1;
            match tool.invoke(arguments.clone(), cancel).await {
                Ok(result) => break Ok(result),
                Err(ToolError::SchemaMismatch { message }) if attempts <= schema_retries => {
                    debug!(
                        tool = %descriptor.name,
                        attempt = attempts,
                        %message,
                        "schema mismatch, refining arguments"
                    );
                    if !binding::refine_arguments(&descriptor.parameters, &mut arguments) {
                        break Err(ToolError::SchemaMismatch { message });
                    }
                }
                Err(e) => break Err(e),
            }
        };

        #[allow(clippy::cast_possible_truncation)]
        let latency_ms = start.elapsed().as_millis() as u64;

        match invocation {
            Ok(result) => {
                let rows = normalize_rows(&result);
                debug!(
                    agent = %agent_type,
                    tool = %result.source_tag,
                    rows = rows.len(),
                    latency_ms,
                    "step executed"
                );
                AgentResult {
                    step_number: step.step_number,
                    agent_type,
                    tool_name: result.source_tag,
                    ok: true,
                    rows,
                    error: None,
                    latency_ms,
                }
            }
            Err(e) => {
                let kind = if cancel.is_cancelled() {
                    ErrorKind::Cancelled
                } else {
                    e.kind()
                };
                warn!(agent = %agent_type, tool = %descriptor.name, error = %e, "step failed");
                AgentResult {
                    step_number: step.step_number,
                    agent_type,
                    tool_name: descriptor.name.clone(),
                    ok: false,
                    rows: Vec::new(),
                    error: Some(kind),
                    latency_ms,
                }
            }
        }
    }

    /// Asks the model to choose a tool and bind arguments. Declines (no
    /// usable tool call) and gateway failures fall back to the top-ranked
    /// candidate with hint/regex binding.
    async fn select_tool(
        &self,
        step: &Step,
        state: &AgentState,
        candidates: &[Arc<ToolDescriptor>],
        cancel: &CancellationToken,
    ) -> (Arc<ToolDescriptor>, Map<String, Value>) {
        let schemas: Vec<ToolSchema> = candidates
            .iter()
            .map(|d| ToolSchema {
                name: d.name.clone(),
                description: d.description.clone(),
                parameters: d.parameter_json_schema(),
            })
            .collect();

        let request = CompletionRequest::from_prompts(
            TOOL_SELECTION_SYSTEM_PROMPT,
            &build_selection_prompt(step, &state.query),
        )
        .with_temperature(0.0)
        .with_tools(schemas);

        match self.gateway.complete(&request, cancel).await {
            Ok(completion) => {
                for call in completion.tool_calls {
                    if let Some(descriptor) =
                        candidates.iter().find(|d| d.name == call.tool_name)
                    {
                        // The model's bindings win; unresolved parameters
                        // are filled from hints, query text, and defaults.
                        let mut arguments = binding::bind_arguments(
                            &descriptor.parameters,
                            &step.parameter_hints,
                            &state.query,
                        );
                        for (name, value) in call.arguments {
                            arguments.insert(name, value);
                        }
                        return (Arc::clone(descriptor), arguments);
                    }
                }
                debug!(step = step.step_number, "model declined, using top candidate");
            }
            Err(e) => {
                debug!(error = %e, "selection completion failed, using top candidate");
            }
        }

        let descriptor = Arc::clone(&candidates[0]);
        let arguments =
            binding::bind_arguments(&descriptor.parameters, &step.parameter_hints, &state.query);
        (descriptor, arguments)
    }
}

/// Normalizes a tool's return into string-keyed rows.
///
/// Prefers the tool's own `rows`; otherwise derives rows from the raw
/// value (array of objects, single object, or a scalar wrapped under
/// `value`).
#[must_use]
fn normalize_rows(result: &ToolResult) -> Vec<Map<String, Value>> {
    if !result.rows.is_empty() {
        return result.rows.clone();
    }
    match &result.raw {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Object(map) => map.clone(),
                other => {
                    let mut row = Map::new();
                    row.insert("value".to_string(), other.clone());
                    row
                }
            })
            .collect(),
        Value::Object(map) => vec![map.clone()],
        Value::Null => Vec::new(),
        other => {
            let mut row = Map::new();
            row.insert("value".to_string(), other.clone());
            vec![row]
        }
    }
}
