//! Error types for every boundary of the orchestration core.
//!
//! Each boundary gets its own enum so callers match on exactly the
//! failures that boundary can produce. [`ErrorKind`] is the coarse,
//! user-safe taxonomy recorded on workflow state; raw backend messages
//! never cross it.

use serde::{Deserialize, Serialize};

/// Coarse error taxonomy recorded in workflow state and surfaced to users.
///
/// Agent-level failures are recorded with one of these kinds and never
/// abort the workflow; the consolidator redacts them to kind plus a short
/// description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed inputs (bad arguments, oversized frames).
    Validation,
    /// The planner produced an empty or cyclic plan.
    Plan,
    /// A step's dependency is absent or failed.
    DependencyUnmet,
    /// No candidate tools exist for the required data-source class.
    ToolNotFound,
    /// A tool returned a recoverable failure.
    Upstream,
    /// A single node exceeded its timeout.
    Timeout,
    /// The whole workflow exceeded its deadline.
    DeadlineExceeded,
    /// The caller cancelled the run.
    Cancelled,
    /// An unexpected internal failure (including caught panics).
    Internal,
}

impl ErrorKind {
    /// Returns the snake_case string form used in frames and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation_error",
            Self::Plan => "plan_error",
            Self::DependencyUnmet => "dependency_unmet",
            Self::ToolNotFound => "tool_not_found",
            Self::Upstream => "upstream_error",
            Self::Timeout => "timeout",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }

    /// Short user-facing description, free of backend detail.
    #[must_use]
    pub const fn user_message(self) -> &'static str {
        match self {
            Self::Validation => "the request was malformed",
            Self::Plan => "no execution plan could be produced",
            Self::DependencyUnmet => "a required earlier step did not produce data",
            Self::ToolNotFound => "no data source is available for this request",
            Self::Upstream => "one of our systems returned an error",
            Self::Timeout => "a data source took too long to respond",
            Self::DeadlineExceeded => "the request took too long overall",
            Self::Cancelled => "the request was cancelled",
            Self::Internal => "an internal error occurred",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures a tool invocation may report across the tool boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ToolError {
    /// The backend rejected the caller's credentials.
    #[error("unauthorized: {message}")]
    Unauthorized {
        /// Backend detail (never shown to users verbatim).
        message: String,
    },
    /// The addressed entity does not exist.
    #[error("not found: {message}")]
    NotFound {
        /// Backend detail.
        message: String,
    },
    /// The bound arguments were rejected.
    #[error("bad request: {message}")]
    BadRequest {
        /// Backend detail.
        message: String,
    },
    /// The backend failed in a recoverable way.
    #[error("upstream error: {message}")]
    Upstream {
        /// Backend detail.
        message: String,
    },
    /// The invocation timed out inside the tool.
    #[error("tool timeout after {elapsed_ms}ms")]
    Timeout {
        /// How long the tool waited.
        elapsed_ms: u64,
    },
    /// The arguments did not match the backend's actual schema.
    #[error("schema mismatch: {message}")]
    SchemaMismatch {
        /// Which part of the schema disagreed.
        message: String,
    },
}

impl ToolError {
    /// Maps a tool failure onto the coarse workflow taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::BadRequest { .. } => ErrorKind::Validation,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Unauthorized { .. }
            | Self::NotFound { .. }
            | Self::Upstream { .. }
            | Self::SchemaMismatch { .. } => ErrorKind::Upstream,
        }
    }
}

/// Failures of the tool registry.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    /// A descriptor with this name is already registered.
    #[error("duplicate tool name: {name}")]
    DuplicateName {
        /// The conflicting name.
        name: String,
    },
    /// No descriptor with this name exists.
    #[error("unknown tool name: {name}")]
    UnknownName {
        /// The requested name.
        name: String,
    },
    /// The configured embedder failed; callers fall back to token overlap.
    #[error("embedding failed: {message}")]
    Embedding {
        /// Embedder detail.
        message: String,
    },
}

/// Failures of the execution planner.
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    /// The completion service could not be reached. Triggers the
    /// heuristic path.
    #[error("completion service unavailable: {message}")]
    LlmUnavailable {
        /// Gateway detail.
        message: String,
    },
    /// The analysis response was not parseable. Triggers the heuristic
    /// path.
    #[error("failed to parse analysis: {message}")]
    ParseFailed {
        /// Parse detail.
        message: String,
        /// The raw response content, kept for diagnostics.
        content: String,
    },
    /// The registry holds no tools at all. Surfaces to the caller.
    #[error("tool catalogue is empty")]
    EmptyCatalogue,
}

/// Failures of the LLM gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The provider request failed.
    #[error("provider request failed: {message}")]
    Request {
        /// Provider detail.
        message: String,
        /// HTTP status when the provider exposed one.
        status: Option<u16>,
    },
    /// The caller's cancellation token fired.
    #[error("completion cancelled")]
    Cancelled,
}

/// Failures of the session transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// An inbound frame exceeded the configured size cap.
    #[error("frame of {size} bytes exceeds cap of {cap} bytes")]
    FrameTooLarge {
        /// Observed frame size.
        size: usize,
        /// Configured cap.
        cap: usize,
    },
    /// An inbound frame was not valid JSON for any known type.
    #[error("invalid frame: {message}")]
    InvalidFrame {
        /// Parse detail.
        message: String,
    },
    /// The underlying socket failed.
    #[error("socket error: {message}")]
    Socket {
        /// Socket detail.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_roundtrip() {
        let json = serde_json::to_string(&ErrorKind::DependencyUnmet).unwrap();
        assert_eq!(json, "\"dependency_unmet\"");
        let back: ErrorKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ErrorKind::DependencyUnmet);
    }

    #[test]
    fn test_tool_error_kind_mapping() {
        let e = ToolError::Upstream {
            message: "503 from service".to_string(),
        };
        assert_eq!(e.kind(), ErrorKind::Upstream);

        let e = ToolError::BadRequest {
            message: "missing field".to_string(),
        };
        assert_eq!(e.kind(), ErrorKind::Validation);

        let e = ToolError::Timeout { elapsed_ms: 5000 };
        assert_eq!(e.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn test_user_messages_have_no_backend_detail() {
        // The redaction contract: user messages are static strings.
        for kind in [
            ErrorKind::Validation,
            ErrorKind::Upstream,
            ErrorKind::Internal,
        ] {
            assert!(!kind.user_message().is_empty());
            assert!(!kind.user_message().contains('{'));
        }
    }
}
