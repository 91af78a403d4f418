//! Ranking scores for tool candidates.
//!
//! When an [`Embedder`] is configured, candidates are scored by cosine
//! similarity between the query embedding and each descriptor's stored
//! embedding. Without one (or when embedding fails), scoring falls back
//! to a deterministic token-overlap measure so ranking always works.

use std::collections::BTreeSet;

use crate::error::RegistryError;

/// Scores below this are dropped from ranking results.
pub(crate) const MIN_SCORE: f32 = 0.10;

/// Produces fixed-width embeddings for free text.
///
/// Implementations live outside this crate (a model server, an ONNX
/// runtime, a remote API). The registry embeds descriptor ranking text
/// once at registration and the query once per `rank` call.
pub trait Embedder: Send + Sync {
    /// Embeds the given text.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Embedding`]; the registry then falls back
    /// to token overlap for the affected call.
    fn embed(&self, text: &str) -> Result<Vec<f32>, RegistryError>;
}

/// Cosine similarity clamped to `[0, 1]`.
///
/// Mismatched or zero-magnitude vectors score 0.
#[must_use]
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0)
}

/// Lowercased alphanumeric tokens of the input.
#[must_use]
pub(crate) fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Deterministic token-overlap score: Jaccard similarity over lowercased
/// alphanumeric tokens.
#[must_use]
pub(crate) fn token_overlap(query: &str, candidate: &str) -> f32 {
    let q = tokenize(query);
    let c = tokenize(candidate);
    if q.is_empty() || c.is_empty() {
        return 0.0;
    }
    let intersection = q.intersection(&c).count();
    let union = q.union(&c).count();
    #[allow(clippy::cast_precision_loss)]
    {
        intersection as f32 / union as f32
    }
}
