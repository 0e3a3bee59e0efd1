//! WebSocket message protocol
//!
//! JSON messages exchanged between viewers and the hub. Clients join and
//! leave streams and may subscribe to extra channels; the server pushes
//! events tagged with the event or channel name they were published under.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ConnectionId, StreamId};

use super::events::OutboundEvent;

/// Message sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start watching a stream (replaces any stream currently watched)
    Join { stream_id: StreamId },
    /// Stop watching a stream
    Leave { stream_id: StreamId },
    /// Receive events from an additional channel
    Subscribe { channel: String },
    /// Stop receiving events from a channel
    Unsubscribe { channel: String },
    /// Ping to keep connection alive
    Ping { timestamp: DateTime<Utc> },
}

/// Message sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Welcome message on connection
    Welcome {
        connection_id: ConnectionId,
        server_time: DateTime<Utc>,
    },
    /// Stream joined; `viewer_count` reflects this connection
    Joined {
        stream_id: StreamId,
        viewer_count: usize,
    },
    /// Stream left
    Left { stream_id: StreamId },
    /// Channel subscription confirmed
    Subscribed { channel: String },
    /// Channel unsubscription confirmed
    Unsubscribed { channel: String },
    /// Pong response to ping
    Pong { timestamp: DateTime<Utc> },
    /// Published event
    Event {
        message_id: String,
        /// Event name for global events, channel name otherwise
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
        payload: OutboundEvent,
        timestamp: DateTime<Utc>,
    },
    /// Error message
    Error { code: String, message: String },
    /// Connection is being closed
    Closing { reason: String },
}

impl ServerMessage {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::events::AllViewerCountsPayload;
    use std::collections::BTreeMap;

    #[test]
    fn test_join_message_parsing() {
        let json = r#"{"type":"join","stream_id":"agent-1"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();

        match msg {
            ClientMessage::Join { stream_id } => assert_eq!(stream_id.as_str(), "agent-1"),
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_unknown_message_rejected() {
        let json = r#"{"type":"teleport","stream_id":"agent-1"}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
    }

    #[test]
    fn test_event_serialization() {
        let msg = ServerMessage::Event {
            message_id: "m1".to_string(),
            name: "agent-1_viewer_count".to_string(),
            channel: Some("agent-1_viewer_count".to_string()),
            payload: OutboundEvent::viewer_count(4),
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "event");
        assert_eq!(json["name"], "agent-1_viewer_count");
        assert_eq!(json["payload"]["count"], 4);
    }

    #[test]
    fn test_global_event_omits_channel() {
        let msg = ServerMessage::Event {
            message_id: "m2".to_string(),
            name: "viewer_counts".to_string(),
            channel: None,
            payload: OutboundEvent::viewer_count(1),
            timestamp: Utc::now(),
        };

        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("\"channel\""));
    }

    #[test]
    fn test_snapshot_for_stream_named_count_keeps_its_name() {
        let mut counts = BTreeMap::new();
        counts.insert(StreamId::from("count"), 3);
        let msg = ServerMessage::Event {
            message_id: "m3".to_string(),
            name: "viewer_counts".to_string(),
            channel: None,
            payload: OutboundEvent::AllViewerCounts(AllViewerCountsPayload { counts }),
            timestamp: Utc::now(),
        };

        // Same payload shape as a per-stream count; the name tells them apart
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["name"], "viewer_counts");
        assert_eq!(json["payload"], serde_json::json!({ "count": 3 }));
        assert!(json.get("channel").is_none());
    }

    #[test]
    fn test_welcome_serialization() {
        let msg = ServerMessage::Welcome {
            connection_id: ConnectionId::from("c-1"),
            server_time: Utc::now(),
        };

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("welcome"));
        assert!(json.contains("c-1"));
    }
}
