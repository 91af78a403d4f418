//! Consolidator node: merges heterogeneous results and formats the final
//! response.
//!
//! Formatting goes through the LLM when the merged set is small enough;
//! the deterministic renderer covers the fallback paths (service down,
//! row cap exceeded) and the single-result fast path.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::format;
use super::merge::{self, MergeStrategy};
use crate::gateway::{CompletionRequest, LlmGateway};
use crate::plan::Plan;
use crate::prompts::{CONSOLIDATOR_SYSTEM_PROMPT, build_consolidation_prompt};
use crate::state::AgentState;

/// Terminal node that produces the final response text.
pub struct Consolidator {
    gateway: Arc<LlmGateway>,
    /// Merged row count above which the LLM is skipped.
    llm_row_cap: usize,
}

impl Consolidator {
    /// Creates the consolidator over the shared gateway.
    #[must_use]
    pub fn new(gateway: Arc<LlmGateway>, llm_row_cap: usize) -> Self {
        Self {
            gateway,
            llm_row_cap,
        }
    }

    /// Produces the final response for the run.
    ///
    /// Never fails: every error path falls through to deterministic
    /// formatting.
    pub async fn run(&self, state: &AgentState, cancel: &CancellationToken) -> String {
        let format_hint = state.plan().and_then(|p| p.notes.as_deref());
        let sources: Vec<(String, Vec<Map<String, Value>>)> = state
            .all_results()
            .filter(|r| r.ok && !r.rows.is_empty())
            .map(|r| (r.tool_name.clone(), r.rows.clone()))
            .collect();

        let requires_consolidation = state
            .plan()
            .is_some_and(|p: &Plan| p.requires_consolidation);
        let failure_note = Self::failure_note(state);

        // Single-source fast path: one ok result, no consolidation asked.
        if !requires_consolidation {
            let ok_results: Vec<_> = state.all_results().filter(|r| r.ok).collect();
            if ok_results.len() == 1 {
                debug!("single result, formatting deterministically");
                let text = format::render_auto(&ok_results[0].rows, format_hint);
                return Self::append_note(text, failure_note.as_deref());
            }
        }

        if sources.is_empty() {
            debug!("no usable rows to consolidate");
            let text = format::render_auto(&[], format_hint);
            return Self::append_note(text, failure_note.as_deref());
        }

        let (rows, strategy) = merge::merge_sources(&sources);
        info!(
            rows = rows.len(),
            strategy = strategy.as_str(),
            "results merged"
        );

        let text = if rows.len() > self.llm_row_cap {
            debug!(cap = self.llm_row_cap, "row cap exceeded, deterministic formatting");
            format::render_auto(&rows, format_hint)
        } else {
            match self
                .format_with_llm(state, &rows, &strategy, failure_note.as_deref(), cancel)
                .await
            {
                Some(text) if !text.trim().is_empty() => return text,
                _ => {
                    warn!("LLM formatting unavailable, deterministic fallback");
                    format::render_auto(&rows, format_hint)
                }
            }
        };
        Self::append_note(text, failure_note.as_deref())
    }

    /// Asks the LLM to phrase the answer over the merged rows.
    async fn format_with_llm(
        &self,
        state: &AgentState,
        rows: &[Map<String, Value>],
        strategy: &MergeStrategy,
        failure_note: Option<&str>,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let request = CompletionRequest::from_prompts(
            CONSOLIDATOR_SYSTEM_PROMPT,
            &build_consolidation_prompt(&state.query, rows, strategy.as_str(), failure_note),
        )
        .with_temperature(0.3)
        .with_max_tokens(2000);

        match self.gateway.complete(&request, cancel).await {
            Ok(completion) => Some(completion.text),
            Err(e) => {
                warn!(error = %e, "consolidation completion failed");
                None
            }
        }
    }

    /// Builds the redacted partial-failure note: kind + short
    /// description, never raw backend text.
    fn failure_note(state: &AgentState) -> Option<String> {
        let errors = state.errors();
        if errors.is_empty() {
            return None;
        }
        let total = state.plan().map_or(0, Plan::len);
        let kinds: Vec<&str> = {
            let mut seen = Vec::new();
            for e in errors {
                let label = e.kind.user_message();
                if !seen.contains(&label) {
                    seen.push(label);
                }
            }
            seen
        };
        if total == 0 {
            return Some(format!("the request could not be planned ({})", kinds.join("; ")));
        }
        Some(format!(
            "partial data: {} of {total} steps reported problems ({})",
            errors.len().min(total),
            kinds.join("; ")
        ))
    }

    fn append_note(text: String, note: Option<&str>) -> String {
        match note {
            Some(note) => format!("{text}\n\nNote: {note}."),
            None => text,
        }
    }
}

impl std::fmt::Debug for Consolidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consolidator")
            .field("llm_row_cap", &self.llm_row_cap)
            .finish_non_exhaustive()
    }
}
