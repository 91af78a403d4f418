//! JSON frame types of the chat transport.
//!
//! Every frame carries a `type` tag. Unknown client frame types are
//! ignored with a log, not rejected; a frame of a known type that fails
//! to parse produces an `error` frame.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Client → server frames.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// A user message starting one workflow run.
    Chat {
        /// The message text.
        content: String,
        /// Client-assigned message id; all frames for this run echo it.
        id: String,
        /// Per-message context merged into the session context.
        #[serde(default)]
        context: Option<Map<String, Value>>,
    },
    /// Replaces/extends the session context.
    ContextUpdate {
        /// New context entries.
        context: Map<String, Value>,
    },
    /// Liveness probe; answered with `pong`.
    Ping,
    /// Any unrecognized frame type.
    #[serde(other)]
    Unknown,
}

/// Server → client frames, delivered in production order per session.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// First frame of every connection.
    ConnectionEstablished {
        /// The (possibly resumed) session id.
        session_id: String,
        /// Server time.
        timestamp: DateTime<Utc>,
    },
    /// A `chat` frame was accepted.
    MessageReceived {
        /// The chat id.
        id: String,
    },
    /// A workflow node finished.
    WorkflowProgress {
        /// Node name (`supervisor`, `sql_agent`, …).
        node: String,
        /// The chat id this run belongs to.
        id: String,
    },
    /// A piece of the answer.
    StreamChunk {
        /// Response text.
        content: String,
        /// The chat id.
        id: String,
    },
    /// The run finished successfully; no further chunks follow for this
    /// id.
    StreamComplete {
        /// The chat id.
        id: String,
    },
    /// The run or the frame failed.
    Error {
        /// Kind-level message, free of backend detail.
        message: String,
        /// The chat id, when attributable.
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    /// Answer to `ping`.
    Pong,
}

impl ServerFrame {
    /// Serializes the frame to its JSON wire form.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_frame_parses() {
        let frame: ClientFrame = serde_json::from_str(
            r#"{"type": "chat", "content": "show alerts", "id": "m1", "context": {"dept": "Eng"}}"#,
        )
        .unwrap();
        match frame {
            ClientFrame::Chat { content, id, context } => {
                assert_eq!(content, "show alerts");
                assert_eq!(id, "m1");
                assert_eq!(context.unwrap()["dept"], "Eng");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_tolerated() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type": "filter_request", "payload": 1}"#).unwrap();
        assert_eq!(frame, ClientFrame::Unknown);
    }

    #[test]
    fn test_known_type_missing_fields_rejected() {
        let result: Result<ClientFrame, _> = serde_json::from_str(r#"{"type": "chat"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_server_frames_serialize_with_type_tag() {
        let json = ServerFrame::MessageReceived {
            id: "m1".to_string(),
        }
        .to_json();
        assert!(json.contains(r#""type":"message_received""#));
        assert!(json.contains(r#""id":"m1""#));

        let json = ServerFrame::Error {
            message: "bad frame".to_string(),
            id: None,
        }
        .to_json();
        assert!(json.contains(r#""type":"error""#));
        assert!(!json.contains(r#""id""#));
    }

    #[test]
    fn test_ping_roundtrip() {
        let frame: ClientFrame = serde_json::from_str(r#"{"type": "ping"}"#).unwrap();
        assert_eq!(frame, ClientFrame::Ping);
        assert!(ServerFrame::Pong.to_json().contains("pong"));
    }
}
