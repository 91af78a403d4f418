//! WebSocket connection handling and workflow dispatch.
//!
//! One reader loop per connection parses inbound frames; a writer task
//! drains the session's outbound channel so frame order is preserved and
//! backpressure reaches the workflow. Each `chat` frame spawns one
//! workflow run whose cancellation token is a child of the connection's,
//! so a disconnect cancels in-flight tool calls promptly while the
//! session record survives for reconnection.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::frames::{ClientFrame, ServerFrame};
use super::manager::{Outbound, Session, SessionManager};
use crate::config::OrchestratorConfig;
use crate::error::{ErrorKind, TransportError};
use crate::state::AgentState;
use crate::workflow::{WorkflowDriver, WorkflowEvent};

/// Accepts chat messages, spawns a workflow run per message, and fans
/// out node and stream events to the connected client.
pub struct SessionOrchestrator {
    driver: Arc<WorkflowDriver>,
    sessions: SessionManager,
    config: OrchestratorConfig,
}

impl SessionOrchestrator {
    /// Creates the orchestrator over a compiled workflow driver.
    #[must_use]
    pub fn new(driver: Arc<WorkflowDriver>, config: OrchestratorConfig) -> Self {
        Self {
            driver,
            sessions: SessionManager::new(config.clone()),
            config,
        }
    }

    /// The session registry (exposed for the sweeper and tests).
    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Drives one WebSocket connection to completion.
    pub async fn handle_socket(self: Arc<Self>, socket: WebSocket, requested: Option<String>) {
        let (session, resumed) = self.sessions.get_or_create(requested.as_deref()).await;
        let conn_cancel = session.cancel.child_token();
        let (mut ws_tx, ws_rx) = socket.split();

        let established = ServerFrame::ConnectionEstablished {
            session_id: session.id.clone(),
            timestamp: Utc::now(),
        };
        if ws_tx
            .send(Message::Text(established.to_json().into()))
            .await
            .is_err()
        {
            return;
        }
        info!(session_id = %session.id, resumed, "connection established");

        let writer = tokio::spawn(writer_loop(
            Arc::clone(&session),
            ws_tx,
            conn_cancel.clone(),
        ));

        self.reader_loop(&session, &conn_cancel, ws_rx).await;

        // Disconnect: cancel in-flight runs; the session record stays
        // for the TTL so a reconnect resumes it.
        conn_cancel.cancel();
        let _ = writer.await;
        info!(session_id = %session.id, "connection closed");
    }

    /// Parses inbound frames until the socket closes.
    async fn reader_loop(
        &self,
        session: &Arc<Session>,
        conn_cancel: &CancellationToken,
        mut ws_rx: SplitStream<WebSocket>,
    ) {
        let mut ping = tokio::time::interval(self.config.idle_ping);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ping.tick().await;

        loop {
            tokio::select! {
                () = conn_cancel.cancelled() => break,
                _ = ping.tick() => {
                    // Droppable liveness probe; protocol frames are not.
                    let _ = session.outbox_tx.try_send(Outbound::Ping);
                }
                inbound = ws_rx.next() => match inbound {
                    Some(Ok(Message::Text(text))) => {
                        self.handle_text(session, conn_cancel, text.as_str()).await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    /// Handles one inbound text frame.
    async fn handle_text(
        &self,
        session: &Arc<Session>,
        conn_cancel: &CancellationToken,
        text: &str,
    ) {
        if text.len() > self.config.max_frame_bytes {
            let err = TransportError::FrameTooLarge {
                size: text.len(),
                cap: self.config.max_frame_bytes,
            };
            warn!(session_id = %session.id, error = %err, "oversized frame rejected");
            send_frame(
                session,
                ServerFrame::Error {
                    message: ErrorKind::Validation.user_message().to_string(),
                    id: None,
                },
            )
            .await;
            return;
        }

        match serde_json::from_str::<ClientFrame>(text) {
            Ok(ClientFrame::Chat { content, id, context }) => {
                send_frame(session, ServerFrame::MessageReceived { id: id.clone() }).await;
                if let Some(context) = context {
                    session.merge_context(context).await;
                }
                session.add_message("user", &content).await;
                self.spawn_run(session, conn_cancel, content, id);
            }
            Ok(ClientFrame::ContextUpdate { context }) => {
                debug!(session_id = %session.id, keys = context.len(), "context updated");
                session.merge_context(context).await;
            }
            Ok(ClientFrame::Ping) => {
                send_frame(session, ServerFrame::Pong).await;
            }
            Ok(ClientFrame::Unknown) => {
                debug!(session_id = %session.id, "ignoring unknown frame type");
            }
            Err(e) => {
                let err = TransportError::InvalidFrame {
                    message: e.to_string(),
                };
                debug!(session_id = %session.id, error = %err, "invalid frame");
                send_frame(
                    session,
                    ServerFrame::Error {
                        message: ErrorKind::Validation.user_message().to_string(),
                        id: None,
                    },
                )
                .await;
            }
        }
    }

    /// Spawns one workflow run for a chat message and forwards its
    /// events to the session outbox.
    ///
    /// Exactly one terminal frame is produced per chat id: a
    /// `stream_complete` on success or an `error` on failure. A
    /// cancelled run produces neither (the connection is gone).
    fn spawn_run(
        &self,
        session: &Arc<Session>,
        conn_cancel: &CancellationToken,
        content: String,
        id: String,
    ) {
        let driver = Arc::clone(&self.driver);
        let session = Arc::clone(session);
        let run_cancel = conn_cancel.child_token();
        let buffer = self.config.event_buffer;

        tokio::spawn(async move {
            let context: Map<String, Value> = session.context().await;
            let state = AgentState::new(&content, context);
            let (events_tx, mut events_rx) = mpsc::channel(buffer);

            let drive = tokio::spawn({
                let driver = Arc::clone(&driver);
                let cancel = run_cancel.clone();
                async move { driver.run(state, events_tx, cancel).await }
            });

            let mut completed = false;
            while let Some(event) = events_rx.recv().await {
                match event {
                    WorkflowEvent::Node(update) => {
                        let frame = ServerFrame::WorkflowProgress {
                            node: update.node.to_string(),
                            id: id.clone(),
                        };
                        if session.outbox_tx.send(Outbound::Frame(frame)).await.is_err() {
                            break;
                        }
                    }
                    WorkflowEvent::Completed { final_response } => {
                        completed = true;
                        session.add_message("assistant", &final_response).await;
                        send_frame(
                            &session,
                            ServerFrame::StreamChunk {
                                content: final_response,
                                id: id.clone(),
                            },
                        )
                        .await;
                        send_frame(&session, ServerFrame::StreamComplete { id: id.clone() }).await;
                    }
                }
            }

            let join = drive.await;
            if (!completed || join.is_err()) && !run_cancel.is_cancelled() {
                if join.is_err() {
                    warn!(session_id = %session.id, chat_id = %id, "workflow task failed");
                }
                if !completed {
                    send_frame(
                        &session,
                        ServerFrame::Error {
                            message:
                                "I ran into a problem retrieving data from one of our systems"
                                    .to_string(),
                            id: Some(id),
                        },
                    )
                    .await;
                }
            }
        });
    }
}

impl std::fmt::Debug for SessionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOrchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Queues a protocol frame on the session outbox, applying backpressure.
async fn send_frame(session: &Arc<Session>, frame: ServerFrame) {
    let _ = session.outbox_tx.send(Outbound::Frame(frame)).await;
}

/// Drains the session outbox into the socket until the connection ends,
/// then returns the receiver so a reconnect can pick up retained frames.
async fn writer_loop(
    session: Arc<Session>,
    mut ws_tx: SplitSink<WebSocket, Message>,
    cancel: CancellationToken,
) {
    let Some(mut rx) = session.outbox_rx.lock().await.take() else {
        warn!(session_id = %session.id, "outbox already held by another connection");
        return;
    };

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            out = rx.recv() => match out {
                Some(Outbound::Frame(frame)) => {
                    if ws_tx
                        .send(Message::Text(frame.to_json().into()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Some(Outbound::Ping) => {
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    *session.outbox_rx.lock().await = Some(rx);
}
