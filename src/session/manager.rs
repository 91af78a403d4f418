//! Session registry: context, rolling conversation log, and the
//! per-session outbound frame channel.
//!
//! A session outlives its connection: on disconnect, in-flight runs are
//! cancelled but the session record (context, history, undelivered
//! frames) is retained until the idle TTL expires, so a reconnecting
//! client resumes where it left off.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::frames::ServerFrame;
use crate::config::OrchestratorConfig;

/// What flows through a session's outbound channel.
#[derive(Debug)]
pub(crate) enum Outbound {
    /// A protocol frame, delivered in order, never dropped.
    Frame(ServerFrame),
    /// A transport-level liveness ping (droppable when the channel is
    /// saturated).
    Ping,
}

/// One entry of the rolling conversation log.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// `user` or `assistant`.
    pub role: String,
    /// Message text.
    pub content: String,
    /// When it was recorded.
    pub at: DateTime<Utc>,
}

/// Mutable per-session data behind the lock.
#[derive(Debug)]
pub(crate) struct SessionData {
    pub context: Map<String, Value>,
    pub history: VecDeque<HistoryEntry>,
    pub last_active: Instant,
}

/// A retained session.
pub struct Session {
    /// Session id issued at creation.
    pub id: String,
    pub(crate) data: Mutex<SessionData>,
    /// Session-scoped token: fired when the session is destroyed.
    pub(crate) cancel: CancellationToken,
    pub(crate) outbox_tx: mpsc::Sender<Outbound>,
    /// Receiver slot; taken by the active connection's writer, returned
    /// on disconnect so a reconnect can drain retained frames.
    pub(crate) outbox_rx: Mutex<Option<mpsc::Receiver<Outbound>>>,
    history_limit: usize,
}

impl Session {
    fn new(id: String, config: &OrchestratorConfig) -> Self {
        let (outbox_tx, outbox_rx) = mpsc::channel(config.event_buffer);
        Self {
            id,
            data: Mutex::new(SessionData {
                context: Map::new(),
                history: VecDeque::new(),
                last_active: Instant::now(),
            }),
            cancel: CancellationToken::new(),
            outbox_tx,
            outbox_rx: Mutex::new(Some(outbox_rx)),
            history_limit: config.history_limit,
        }
    }

    /// Merges entries into the session context.
    pub async fn merge_context(&self, update: Map<String, Value>) {
        let mut data = self.data.lock().await;
        for (key, value) in update {
            data.context.insert(key, value);
        }
        data.last_active = Instant::now();
    }

    /// Snapshot of the session context.
    pub async fn context(&self) -> Map<String, Value> {
        self.data.lock().await.context.clone()
    }

    /// Appends to the rolling conversation log, trimming to the limit.
    pub async fn add_message(&self, role: &str, content: &str) {
        let mut data = self.data.lock().await;
        data.history.push_back(HistoryEntry {
            role: role.to_string(),
            content: content.to_string(),
            at: Utc::now(),
        });
        while data.history.len() > self.history_limit {
            data.history.pop_front();
        }
        data.last_active = Instant::now();
    }

    /// Snapshot of the conversation log.
    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.data.lock().await.history.iter().cloned().collect()
    }

    async fn idle_for(&self) -> std::time::Duration {
        self.data.lock().await.last_active.elapsed()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Registry of retained sessions.
pub struct SessionManager {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    config: OrchestratorConfig,
}

impl SessionManager {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Resumes the requested session if retained, otherwise issues a new
    /// one. Returns the session and whether it was resumed.
    pub async fn get_or_create(&self, requested: Option<&str>) -> (Arc<Session>, bool) {
        let mut sessions = self.sessions.lock().await;
        if let Some(id) = requested {
            if let Some(session) = sessions.get(id) {
                debug!(session_id = id, "session resumed");
                return (Arc::clone(session), true);
            }
        }
        let id = uuid::Uuid::new_v4().to_string();
        let session = Arc::new(Session::new(id.clone(), &self.config));
        sessions.insert(id.clone(), Arc::clone(&session));
        info!(session_id = %id, "session created");
        (session, false)
    }

    /// Destroys a session: cancels its token and forgets it.
    pub async fn remove(&self, id: &str) {
        if let Some(session) = self.sessions.lock().await.remove(id) {
            session.cancel.cancel();
            info!(session_id = id, "session destroyed");
        }
    }

    /// Removes sessions idle past the TTL. Returns how many were
    /// destroyed.
    pub async fn sweep(&self) -> usize {
        let expired: Vec<Arc<Session>> = {
            let sessions = self.sessions.lock().await;
            let mut expired = Vec::new();
            for session in sessions.values() {
                if session.idle_for().await > self.config.session_ttl {
                    expired.push(Arc::clone(session));
                }
            }
            expired
        };
        for session in &expired {
            self.remove(&session.id).await;
        }
        expired.len()
    }

    /// Number of retained sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Returns `true` when no sessions are retained.
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager").finish_non_exhaustive()
    }
}
