//! Execution planner: turns `(query, context, tool catalogue)` into a
//! dependency-ordered plan.
//!
//! Analysis goes through the LLM gateway first; an unreachable service or
//! an unparseable response falls back to deterministic keyword
//! heuristics, so a plan is always produced as long as the catalogue has
//! at least one tool.

use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::PlannerError;
use crate::gateway::{CompletionRequest, LlmGateway};
use crate::plan::{Complexity, DataSourceClass, Plan, Step};
use crate::prompts::{PLANNER_SYSTEM_PROMPT, build_analysis_prompt};
use crate::registry::ToolRegistry;

/// Tokens that look like opaque identifiers (`CUST_00123`, `A9X2B7`).
static ID_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][A-Z0-9_]{5,}\b").unwrap_or_else(|_| unreachable!()));

/// Read-intent keywords.
const READ_WORDS: &[&str] = &["list", "show", "find", "search", "get", "display", "which"];
/// Nouns suggesting a relational source.
const DB_WORDS: &[&str] = &["alert", "case", "record", "database", "table", "row", "count"];
/// Nouns suggesting a REST source.
const REST_WORDS: &[&str] = &["user", "department", "team", "endpoint", "api", "profile"];
/// Nouns suggesting a SOAP source.
const SOAP_WORDS: &[&str] = &["customer", "payment", "account", "invoice", "soap"];

/// The analysis document produced by the LLM (or the heuristic path).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct QueryAnalysis {
    /// Short verb phrase describing the request.
    #[serde(default)]
    pub intent: String,
    /// Identifiers, names, or values lifted from the request.
    #[serde(default)]
    pub entities: Vec<String>,
    /// Data-source classes needed, in execution order.
    #[serde(default)]
    pub required_sources: Vec<String>,
    /// Whether cross-source merging is needed.
    #[serde(default)]
    pub requires_consolidation: bool,
    /// Complexity estimate as a string (`low`/`med`/`high`).
    #[serde(default)]
    pub estimated_complexity: String,
    /// Free-text hints for the consolidator.
    #[serde(default)]
    pub notes: Option<String>,
}

/// Creates execution plans from natural-language queries.
pub struct ExecutionPlanner {
    gateway: Arc<LlmGateway>,
    registry: Arc<ToolRegistry>,
}

impl ExecutionPlanner {
    /// Creates a planner over the shared gateway and registry.
    #[must_use]
    pub fn new(gateway: Arc<LlmGateway>, registry: Arc<ToolRegistry>) -> Self {
        Self { gateway, registry }
    }

    /// Creates a plan for the query.
    ///
    /// # Errors
    ///
    /// Returns [`PlannerError::EmptyCatalogue`] when no tools are
    /// registered. LLM and parse failures are recovered heuristically and
    /// never surface.
    pub async fn create_plan(
        &self,
        query: &str,
        context: &serde_json::Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<Plan, PlannerError> {
        if self.registry.is_empty() {
            return Err(PlannerError::EmptyCatalogue);
        }

        let analysis = match self.analyze(query, context, cancel).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(error = %e, "analysis failed, using heuristics");
                self.heuristic_analysis(query)
            }
        };
        debug!(?analysis, "query analyzed");

        let steps = self.generate_steps(query, &analysis);
        let mut plan = Plan::new(
            query,
            steps,
            analysis.requires_consolidation,
            Complexity::parse(&analysis.estimated_complexity),
        );
        plan.notes = analysis.notes.clone();

        if plan.is_empty() || plan.validate_dag().is_err() {
            warn!(plan_id = %plan.plan_id, "invalid or empty plan, falling back to single step");
            plan = self.single_step_fallback(query);
        }

        info!(
            plan_id = %plan.plan_id,
            steps = plan.len(),
            consolidation = plan.requires_consolidation,
            complexity = %plan.estimated_complexity,
            "plan created"
        );
        Ok(plan)
    }

    /// Asks the LLM for the analysis document.
    async fn analyze(
        &self,
        query: &str,
        context: &serde_json::Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<QueryAnalysis, PlannerError> {
        let catalogue = self.registry.catalogue_lines();
        let request = CompletionRequest::from_prompts(
            PLANNER_SYSTEM_PROMPT,
            &build_analysis_prompt(query, context, &catalogue),
        )
        .with_temperature(0.0)
        .with_json_mode();

        let completion = self.gateway.complete(&request, cancel).await.map_err(|e| {
            PlannerError::LlmUnavailable {
                message: e.to_string(),
            }
        })?;

        Self::parse_analysis(&completion.text)
    }

    /// Parses the analysis JSON, stripping markdown code fences.
    fn parse_analysis(content: &str) -> Result<QueryAnalysis, PlannerError> {
        let trimmed = content.trim();
        let json_str = if trimmed.starts_with("```") {
            trimmed
                .trim_start_matches("```json")
                .trim_start_matches("```")
                .trim_end_matches("```")
                .trim()
        } else {
            trimmed
        };

        serde_json::from_str(json_str).map_err(|e| PlannerError::ParseFailed {
            message: e.to_string(),
            content: content.to_string(),
        })
    }

    /// Produces the analysis document by keyword rules when the LLM path
    /// is unavailable.
    fn heuristic_analysis(&self, query: &str) -> QueryAnalysis {
        let lower = query.to_lowercase();
        let contains_any = |words: &[&str]| words.iter().any(|w| lower.contains(w));

        let intent = if ID_TOKEN.is_match(query) {
            "lookup".to_string()
        } else if contains_any(READ_WORDS) {
            "read".to_string()
        } else {
            "unknown".to_string()
        };

        let entities: Vec<String> = ID_TOKEN
            .find_iter(query)
            .map(|m| m.as_str().to_string())
            .collect();

        let mut sources = Vec::new();
        if contains_any(DB_WORDS) {
            sources.push(DataSourceClass::RelationalDb);
        }
        if contains_any(REST_WORDS) {
            sources.push(DataSourceClass::RestApi);
        }
        if contains_any(SOAP_WORDS) {
            sources.push(DataSourceClass::SoapApi);
        }
        // Only keep classes the catalogue can actually serve.
        sources.retain(|&c| !self.registry.list_by_class(c).is_empty());
        if sources.is_empty() {
            if let Some(class) = self.top_ranked_class(query) {
                sources.push(class);
            }
        }

        let complexity = if sources.len() > 1 { "high" } else { "low" };
        QueryAnalysis {
            intent,
            entities,
            required_sources: sources.iter().map(|c| c.as_str().to_string()).collect(),
            requires_consolidation: sources.len() > 1,
            estimated_complexity: complexity.to_string(),
            notes: None,
        }
    }

    /// Generates one step per required source, chaining dependencies when
    /// the request carries a shared identifier.
    fn generate_steps(&self, query: &str, analysis: &QueryAnalysis) -> Vec<Step> {
        let mut classes: Vec<DataSourceClass> = Vec::new();
        for source in &analysis.required_sources {
            if let Some(class) = DataSourceClass::parse(source) {
                if !classes.contains(&class) && !self.registry.list_by_class(class).is_empty() {
                    classes.push(class);
                }
            }
        }
        if classes.is_empty() {
            if let Some(class) = self.top_ranked_class(query) {
                classes.push(class);
            }
        }

        let has_shared_identifier =
            !analysis.entities.is_empty() || ID_TOKEN.is_match(query);

        classes
            .into_iter()
            .enumerate()
            .map(|(idx, class)| {
                let number = idx + 1;
                let intent = if analysis.intent.is_empty() {
                    "retrieve data"
                } else {
                    &analysis.intent
                };
                let mut step = Step::new(number, format!("{intent} from {class}"), class);
                if has_shared_identifier && number > 1 {
                    step = step.with_depends_on(1..number);
                }
                for entity in &analysis.entities {
                    step = step.with_hint("entity", Value::String(entity.clone()));
                }
                step
            })
            .collect()
    }

    /// The class of the highest-ranked tool for the query, falling back
    /// to the first registered tool when nothing clears the score floor.
    fn top_ranked_class(&self, query: &str) -> Option<DataSourceClass> {
        self.registry
            .rank(query, None)
            .first()
            .map(|(d, _)| d.data_source_class)
            .or_else(|| self.registry.list_all().first().map(|d| d.data_source_class))
    }

    /// Single-step plan over the highest-ranked tool's class.
    fn single_step_fallback(&self, query: &str) -> Plan {
        let class = self
            .top_ranked_class(query)
            .unwrap_or(DataSourceClass::RelationalDb);
        let step = Step::new(1, format!("answer the request from {class}"), class);
        Plan::new(query, vec![step], false, Complexity::Low)
    }
}

impl std::fmt::Debug for ExecutionPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionPlanner")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
