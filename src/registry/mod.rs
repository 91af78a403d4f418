//! Tool registry: holds tool descriptors and answers ranked candidate
//! queries.
//!
//! The registry is read-mostly: registration happens at startup (from an
//! external descriptor loader), after which `rank`, `get`, and
//! `list_by_class` run concurrently without locks. Ranking is semantic
//! (via a configured [`Embedder`]) with a deterministic token-overlap
//! fallback; ties break by priority, then name.

mod descriptor;
mod ranking;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

pub use descriptor::{
    Capability, ParameterKind, ParameterSpec, SemanticType, Tool, ToolDescriptor, ToolResult,
};
pub use ranking::Embedder;

use crate::error::RegistryError;
use crate::plan::DataSourceClass;

struct Entry {
    tool: Arc<dyn Tool>,
    /// Descriptor with inferred capabilities filled in.
    descriptor: Arc<ToolDescriptor>,
    /// Embedding of the ranking text, when an embedder is configured and
    /// succeeded at registration.
    embedding: Option<Vec<f32>>,
}

/// Builds a [`ToolRegistry`] at startup.
///
/// Registration is the only write path; once `build` is called the
/// registry is immutable and freely shared.
#[derive(Default)]
pub struct ToolRegistryBuilder {
    entries: Vec<Entry>,
    by_name: HashMap<String, usize>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl ToolRegistryBuilder {
    /// Creates an empty builder without semantic ranking.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures an embedder for semantic ranking.
    #[must_use]
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Registers a tool.
    ///
    /// Capability verbs are inferred from the descriptor when not
    /// provided. When an embedder is configured, the ranking text is
    /// embedded here; an embedding failure downgrades this entry to
    /// token-overlap scoring rather than failing registration.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateName`] if a tool with the same
    /// name is already registered.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let mut descriptor = tool.descriptor().clone();
        if self.by_name.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateName {
                name: descriptor.name,
            });
        }
        descriptor.infer_capabilities();

        let embedding = match &self.embedder {
            Some(embedder) => match embedder.embed(&descriptor.ranking_text()) {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!(tool = %descriptor.name, error = %e, "descriptor embedding failed");
                    None
                }
            },
            None => None,
        };

        debug!(
            tool = %descriptor.name,
            class = %descriptor.data_source_class,
            embedded = embedding.is_some(),
            "tool registered"
        );
        self.by_name
            .insert(descriptor.name.clone(), self.entries.len());
        self.entries.push(Entry {
            tool,
            descriptor: Arc::new(descriptor),
            embedding,
        });
        Ok(())
    }

    /// Finalizes the registry.
    #[must_use]
    pub fn build(self) -> ToolRegistry {
        ToolRegistry {
            entries: self.entries,
            by_name: self.by_name,
            embedder: self.embedder,
        }
    }
}

/// A ranked candidate: descriptor plus its score in `[0, 1]`.
pub type RankedTool = (Arc<ToolDescriptor>, f32);

/// Immutable, concurrently shared catalogue of tools.
pub struct ToolRegistry {
    entries: Vec<Entry>,
    by_name: HashMap<String, usize>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl ToolRegistry {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::new()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a tool by name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownName`] if no such tool exists.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Tool>, RegistryError> {
        self.by_name
            .get(name)
            .map(|&idx| Arc::clone(&self.entries[idx].tool))
            .ok_or_else(|| RegistryError::UnknownName {
                name: name.to_string(),
            })
    }

    /// Descriptors of all tools in a data-source class, in registration
    /// order.
    #[must_use]
    pub fn list_by_class(&self, class: DataSourceClass) -> Vec<Arc<ToolDescriptor>> {
        self.entries
            .iter()
            .filter(|e| e.descriptor.data_source_class == class)
            .map(|e| Arc::clone(&e.descriptor))
            .collect()
    }

    /// Descriptors of all tools, in registration order.
    #[must_use]
    pub fn list_all(&self) -> Vec<Arc<ToolDescriptor>> {
        self.entries
            .iter()
            .map(|e| Arc::clone(&e.descriptor))
            .collect()
    }

    /// Ranks candidate tools for a text query, optionally filtered to a
    /// data-source class.
    ///
    /// Scores are cosine similarity against stored embeddings when
    /// available, otherwise deterministic token overlap. Results are
    /// ordered by score, then priority, then name; scores below 0.10 are
    /// dropped.
    #[must_use]
    pub fn rank(&self, query_text: &str, filter: Option<DataSourceClass>) -> Vec<RankedTool> {
        let query_embedding = self.embedder.as_ref().and_then(|embedder| {
            match embedder.embed(query_text) {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!(error = %e, "query embedding failed, using token overlap");
                    None
                }
            }
        });

        let mut scored: Vec<RankedTool> = self
            .entries
            .iter()
            .filter(|e| filter.is_none_or(|c| e.descriptor.data_source_class == c))
            .map(|e| {
                let score = match (&query_embedding, &e.embedding) {
                    (Some(q), Some(d)) => ranking::cosine_similarity(q, d),
                    _ => ranking::token_overlap(query_text, &e.descriptor.ranking_text()),
                };
                (Arc::clone(&e.descriptor), score)
            })
            .filter(|(_, score)| *score >= ranking::MIN_SCORE)
            .collect();

        scored.sort_by(|(a, sa), (b, sb)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.priority.cmp(&a.priority))
                .then_with(|| a.name.cmp(&b.name))
        });
        scored
    }

    /// Compact one-line-per-tool catalogue for planner prompts:
    /// `name (class): first sentence of description`.
    #[must_use]
    pub fn catalogue_lines(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| {
                let d = &e.descriptor;
                let summary = d.description.split('.').next().unwrap_or(&d.description);
                format!("{} ({}): {}", d.name, d.data_source_class, summary.trim())
            })
            .collect()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.entries.len())
            .field("semantic", &self.embedder.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use tokio_util::sync::CancellationToken;

    use crate::error::ToolError;

    struct StaticTool {
        descriptor: ToolDescriptor,
    }

    #[async_trait]
    impl Tool for StaticTool {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }

        async fn invoke(
            &self,
            _arguments: Map<String, Value>,
            _cancel: &CancellationToken,
        ) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::from_rows(Vec::new(), &self.descriptor.name))
        }
    }

    fn tool(name: &str, description: &str, class: DataSourceClass, priority: i32) -> Arc<dyn Tool> {
        Arc::new(StaticTool {
            descriptor: ToolDescriptor::new(name, description, class).with_priority(priority),
        })
    }

    fn sample_registry() -> ToolRegistry {
        let mut builder = ToolRegistry::builder();
        builder
            .register(tool(
                "list_alerts",
                "List alerts filtered by status. Keywords: alerts, open, severity.",
                DataSourceClass::RestApi,
                0,
            ))
            .unwrap();
        builder
            .register(tool(
                "alerts_by_user",
                "Query alerts for a given user id from the alerts database.",
                DataSourceClass::RelationalDb,
                0,
            ))
            .unwrap();
        builder
            .register(tool(
                "customer_lookup",
                "Fetch customer account details by customer number.",
                DataSourceClass::SoapApi,
                0,
            ))
            .unwrap();
        builder.build()
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut builder = ToolRegistry::builder();
        builder
            .register(tool("a", "first", DataSourceClass::RestApi, 0))
            .unwrap();
        let err = builder
            .register(tool("a", "second", DataSourceClass::RestApi, 0))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName { name } if name == "a"));
    }

    #[test]
    fn test_get_and_unknown() {
        let registry = sample_registry();
        assert!(registry.get("list_alerts").is_ok());
        assert!(matches!(
            registry.get("nope"),
            Err(RegistryError::UnknownName { .. })
        ));
    }

    #[test]
    fn test_list_by_class() {
        let registry = sample_registry();
        let rest = registry.list_by_class(DataSourceClass::RestApi);
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].name, "list_alerts");
    }

    #[test]
    fn test_rank_filters_and_orders() {
        let registry = sample_registry();
        let ranked = registry.rank("show open alerts", None);
        assert!(!ranked.is_empty());
        assert_eq!(ranked[0].0.name, "list_alerts");
        // Scores are within bounds and descending.
        for window in ranked.windows(2) {
            assert!(window[0].1 >= window[1].1);
        }
        for (_, score) in &ranked {
            assert!((0.1..=1.0).contains(score));
        }

        let filtered = registry.rank("alerts", Some(DataSourceClass::SoapApi));
        assert!(filtered.iter().all(|(d, _)| d.data_source_class == DataSourceClass::SoapApi));
    }

    #[test]
    fn test_rank_stability() {
        // Two registries built from identical descriptors produce the
        // same ordering under identical queries.
        let a = sample_registry();
        let b = sample_registry();
        let ra: Vec<String> = a
            .rank("alerts for a user", None)
            .into_iter()
            .map(|(d, _)| d.name.clone())
            .collect();
        let rb: Vec<String> = b
            .rank("alerts for a user", None)
            .into_iter()
            .map(|(d, _)| d.name.clone())
            .collect();
        assert_eq!(ra, rb);
    }

    #[test]
    fn test_priority_breaks_ties() {
        let mut builder = ToolRegistry::builder();
        builder
            .register(tool("b_tool", "alerts", DataSourceClass::RestApi, 1))
            .unwrap();
        builder
            .register(tool("a_tool", "alerts", DataSourceClass::RestApi, 5))
            .unwrap();
        let registry = builder.build();
        let ranked = registry.rank("alerts", None);
        assert_eq!(ranked[0].0.name, "a_tool");
    }

    #[test]
    fn test_low_scores_dropped() {
        let registry = sample_registry();
        let ranked = registry.rank("completely unrelated zebra telescope", None);
        assert!(ranked.is_empty());
    }

    #[test]
    fn test_embedder_fallback_on_error() {
        struct FailingEmbedder;
        impl Embedder for FailingEmbedder {
            fn embed(&self, _text: &str) -> Result<Vec<f32>, RegistryError> {
                Err(RegistryError::Embedding {
                    message: "offline".to_string(),
                })
            }
        }

        let mut builder = ToolRegistry::builder().with_embedder(Arc::new(FailingEmbedder));
        builder
            .register(tool(
                "list_alerts",
                "List alerts filtered by status",
                DataSourceClass::RestApi,
                0,
            ))
            .unwrap();
        let registry = builder.build();
        // Token-overlap fallback still ranks.
        let ranked = registry.rank("list alerts", None);
        assert_eq!(ranked.len(), 1);
    }

    #[test]
    fn test_catalogue_lines() {
        let registry = sample_registry();
        let lines = registry.catalogue_lines();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("list_alerts (rest_api):"));
    }
}
