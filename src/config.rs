//! Orchestrator configuration with builder pattern and environment
//! variable support.
//!
//! Configuration is resolved in order: explicit values → environment
//! variables → defaults.

use std::time::Duration;

/// Default per-node execution timeout in seconds.
const DEFAULT_NODE_TIMEOUT_SECS: u64 = 60;
/// Default overall workflow deadline in seconds.
const DEFAULT_OVERALL_DEADLINE_SECS: u64 = 300;
/// Default cap on supervisor visits per run.
const DEFAULT_MAX_ITERATIONS: usize = 10;
/// Default row cap above which the consolidator skips the LLM and
/// formats deterministically.
const DEFAULT_LLM_ROW_CAP: usize = 500;
/// Default idle interval between transport pings in seconds.
const DEFAULT_IDLE_PING_SECS: u64 = 30;
/// Default inbound frame size cap.
const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;
/// Default rolling conversation log length per session.
const DEFAULT_HISTORY_LIMIT: usize = 50;
/// Default idle time-to-live for retained sessions in seconds.
const DEFAULT_SESSION_TTL_SECS: u64 = 30 * 60;
/// Default outbound event buffer (frames) per session.
const DEFAULT_EVENT_BUFFER: usize = 64;

/// What the driver does when routing names a node with no registered
/// executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownNodePolicy {
    /// Record the failure and end the run gracefully.
    #[default]
    End,
    /// Abort the run with an error frame.
    Error,
}

impl UnknownNodePolicy {
    /// Parses a policy string (case-insensitive). Unknown values map to
    /// the default.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "error" => Self::Error,
            _ => Self::End,
        }
    }
}

/// Configuration for the workflow driver and session transport.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Timeout applied to each node execution.
    pub node_timeout: Duration,
    /// Deadline for a whole workflow run. Firing routes to the
    /// consolidator with whatever results exist.
    pub overall_deadline: Duration,
    /// Cap on supervisor visits; exceeding it routes to the consolidator
    /// with an incomplete marker.
    pub max_iterations: usize,
    /// Merged row count above which the consolidator formats
    /// deterministically instead of calling the LLM.
    pub llm_row_cap: usize,
    /// Behavior when routing names a node without an executor.
    pub unknown_node_policy: UnknownNodePolicy,
    /// Idle interval between transport-level pings.
    pub idle_ping: Duration,
    /// Inbound frame size cap in bytes.
    pub max_frame_bytes: usize,
    /// Rolling conversation log length retained per session.
    pub history_limit: usize,
    /// How long an idle session is retained for reconnection.
    pub session_ttl: Duration,
    /// Bound of the per-session outbound event channel. A full buffer
    /// pauses node execution until the client drains it.
    pub event_buffer: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl OrchestratorConfig {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> OrchestratorConfigBuilder {
        OrchestratorConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::builder().from_env().build()
    }
}

/// Builder for [`OrchestratorConfig`].
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfigBuilder {
    node_timeout: Option<Duration>,
    overall_deadline: Option<Duration>,
    max_iterations: Option<usize>,
    llm_row_cap: Option<usize>,
    unknown_node_policy: Option<UnknownNodePolicy>,
    idle_ping: Option<Duration>,
    max_frame_bytes: Option<usize>,
    history_limit: Option<usize>,
    session_ttl: Option<Duration>,
    event_buffer: Option<usize>,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

impl OrchestratorConfigBuilder {
    /// Populates unset fields from `CONFLUX_*` environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.node_timeout.is_none() {
            self.node_timeout =
                env_parse::<u64>("CONFLUX_NODE_TIMEOUT_SECONDS").map(Duration::from_secs);
        }
        if self.overall_deadline.is_none() {
            self.overall_deadline =
                env_parse::<u64>("CONFLUX_OVERALL_DEADLINE_SECONDS").map(Duration::from_secs);
        }
        if self.max_iterations.is_none() {
            self.max_iterations = env_parse("CONFLUX_MAX_ITERATIONS");
        }
        if self.llm_row_cap.is_none() {
            self.llm_row_cap = env_parse("CONFLUX_LLM_ROW_CAP");
        }
        if self.unknown_node_policy.is_none() {
            self.unknown_node_policy = std::env::var("CONFLUX_UNKNOWN_NODE_POLICY")
                .ok()
                .map(|v| UnknownNodePolicy::parse(&v));
        }
        if self.idle_ping.is_none() {
            self.idle_ping = env_parse::<u64>("CONFLUX_IDLE_PING_SECONDS").map(Duration::from_secs);
        }
        if self.max_frame_bytes.is_none() {
            self.max_frame_bytes = env_parse("CONFLUX_MAX_FRAME_BYTES");
        }
        if self.history_limit.is_none() {
            self.history_limit = env_parse("CONFLUX_HISTORY_LIMIT");
        }
        if self.session_ttl.is_none() {
            self.session_ttl =
                env_parse::<u64>("CONFLUX_SESSION_TTL_SECONDS").map(Duration::from_secs);
        }
        self
    }

    /// Sets the per-node timeout.
    #[must_use]
    pub const fn node_timeout(mut self, d: Duration) -> Self {
        self.node_timeout = Some(d);
        self
    }

    /// Sets the overall workflow deadline.
    #[must_use]
    pub const fn overall_deadline(mut self, d: Duration) -> Self {
        self.overall_deadline = Some(d);
        self
    }

    /// Sets the supervisor visit cap.
    #[must_use]
    pub const fn max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = Some(n);
        self
    }

    /// Sets the consolidator's LLM row cap.
    #[must_use]
    pub const fn llm_row_cap(mut self, n: usize) -> Self {
        self.llm_row_cap = Some(n);
        self
    }

    /// Sets the unknown-node policy.
    #[must_use]
    pub const fn unknown_node_policy(mut self, p: UnknownNodePolicy) -> Self {
        self.unknown_node_policy = Some(p);
        self
    }

    /// Sets the idle ping interval.
    #[must_use]
    pub const fn idle_ping(mut self, d: Duration) -> Self {
        self.idle_ping = Some(d);
        self
    }

    /// Sets the inbound frame size cap.
    #[must_use]
    pub const fn max_frame_bytes(mut self, n: usize) -> Self {
        self.max_frame_bytes = Some(n);
        self
    }

    /// Sets the rolling history limit.
    #[must_use]
    pub const fn history_limit(mut self, n: usize) -> Self {
        self.history_limit = Some(n);
        self
    }

    /// Sets the idle session time-to-live.
    #[must_use]
    pub const fn session_ttl(mut self, d: Duration) -> Self {
        self.session_ttl = Some(d);
        self
    }

    /// Sets the outbound event buffer size.
    #[must_use]
    pub const fn event_buffer(mut self, n: usize) -> Self {
        self.event_buffer = Some(n);
        self
    }

    /// Builds the [`OrchestratorConfig`].
    #[must_use]
    pub fn build(self) -> OrchestratorConfig {
        OrchestratorConfig {
            node_timeout: self
                .node_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_NODE_TIMEOUT_SECS)),
            overall_deadline: self
                .overall_deadline
                .unwrap_or(Duration::from_secs(DEFAULT_OVERALL_DEADLINE_SECS)),
            max_iterations: self.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS).max(1),
            llm_row_cap: self.llm_row_cap.unwrap_or(DEFAULT_LLM_ROW_CAP),
            unknown_node_policy: self.unknown_node_policy.unwrap_or_default(),
            idle_ping: self
                .idle_ping
                .unwrap_or(Duration::from_secs(DEFAULT_IDLE_PING_SECS)),
            max_frame_bytes: self.max_frame_bytes.unwrap_or(DEFAULT_MAX_FRAME_BYTES),
            history_limit: self.history_limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
            session_ttl: self
                .session_ttl
                .unwrap_or(Duration::from_secs(DEFAULT_SESSION_TTL_SECS)),
            event_buffer: self.event_buffer.unwrap_or(DEFAULT_EVENT_BUFFER).max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.node_timeout, Duration::from_secs(60));
        assert_eq!(config.overall_deadline, Duration::from_secs(300));
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.llm_row_cap, 500);
        assert_eq!(config.unknown_node_policy, UnknownNodePolicy::End);
        assert_eq!(config.idle_ping, Duration::from_secs(30));
        assert_eq!(config.max_frame_bytes, 1024 * 1024);
    }

    #[test]
    fn test_builder_custom_values() {
        let config = OrchestratorConfig::builder()
            .node_timeout(Duration::from_secs(1))
            .max_iterations(3)
            .llm_row_cap(10)
            .unknown_node_policy(UnknownNodePolicy::Error)
            .build();
        assert_eq!(config.node_timeout, Duration::from_secs(1));
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.llm_row_cap, 10);
        assert_eq!(config.unknown_node_policy, UnknownNodePolicy::Error);
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!(UnknownNodePolicy::parse("error"), UnknownNodePolicy::Error);
        assert_eq!(UnknownNodePolicy::parse("END"), UnknownNodePolicy::End);
        assert_eq!(UnknownNodePolicy::parse("bogus"), UnknownNodePolicy::End);
    }

    #[test]
    fn test_zero_iterations_clamped() {
        let config = OrchestratorConfig::builder().max_iterations(0).build();
        assert_eq!(config.max_iterations, 1);
    }
}
