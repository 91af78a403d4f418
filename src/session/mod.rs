//! Session orchestration and the WebSocket transport.
//!
//! Chat runs over a bidirectional, message-framed, ordered JSON stream.
//! [`serve`] binds the listener and upgrades `/ws` connections; each
//! connection attaches to a new or resumed [`Session`], and every `chat`
//! frame spawns one workflow run whose events stream back to the client.

mod frames;
mod handler;
mod manager;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use serde::Deserialize;
use tracing::info;

pub use frames::{ClientFrame, ServerFrame};
pub use handler::SessionOrchestrator;
pub use manager::{HistoryEntry, Session, SessionManager};

/// Query parameters of the `/ws` upgrade request.
#[derive(Debug, Deserialize)]
struct ConnectQuery {
    /// Prior session id for reconnection.
    session_id: Option<String>,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<ConnectQuery>,
    State(orchestrator): State<Arc<SessionOrchestrator>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| orchestrator.handle_socket(socket, query.session_id))
}

/// Builds the transport router: `GET /ws` upgrades to the chat stream.
#[must_use]
pub fn app(orchestrator: Arc<SessionOrchestrator>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(orchestrator)
}

/// Serves the chat transport until ctrl-c.
///
/// Also spawns the session sweeper that expires idle sessions.
///
/// # Errors
///
/// Returns an error when the listener fails to bind or the server fails
/// at runtime.
pub async fn serve(addr: SocketAddr, orchestrator: Arc<SessionOrchestrator>) -> anyhow::Result<()> {
    spawn_sweeper(&orchestrator);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "chat transport listening");
    axum::serve(listener, app(orchestrator))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

/// Periodically expires idle sessions.
fn spawn_sweeper(orchestrator: &Arc<SessionOrchestrator>) {
    let orchestrator = Arc::clone(orchestrator);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            tick.tick().await;
            let swept = orchestrator.sessions().sweep().await;
            if swept > 0 {
                info!(swept, "idle sessions expired");
            }
        }
    });
}
