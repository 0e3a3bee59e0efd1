//! WebSocket connection management
//!
//! This module manages active WebSocket connections and delivers published
//! events to them, either to everyone or to a channel's subscribers.

use axum::extract::ws::{Message, WebSocket};
use dashmap::DashMap;
use futures::{stream::SplitSink, SinkExt};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::models::ConnectionId;

use super::{
    events::{EventEnvelope, EventTarget},
    messages::ServerMessage,
    metrics,
    session::Session,
};

/// Connection handle for sending messages
pub struct Connection {
    /// Session information
    pub session: Arc<RwLock<Session>>,
    /// Channel for sending messages to this connection
    tx: mpsc::UnboundedSender<ServerMessage>,
    /// Connection metadata
    remote_addr: Option<String>,
}

impl Connection {
    /// Create a new connection
    pub fn new(
        session: Session,
        remote_addr: Option<String>,
    ) -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                session: Arc::new(RwLock::new(session)),
                tx,
                remote_addr,
            },
            rx,
        )
    }

    /// Send a message to this connection
    pub fn send(&self, message: ServerMessage) -> Result<(), ConnectionError> {
        self.tx
            .send(message)
            .map_err(|_| ConnectionError::SendFailed)
    }

    pub fn id(&self) -> ConnectionId {
        self.session.read().id.clone()
    }

    /// Whether this connection receives events published to `target`
    pub fn accepts(&self, target: &EventTarget) -> bool {
        match target {
            EventTarget::Global(_) => true,
            EventTarget::Channel(channel) => self.session.read().is_subscribed(channel),
        }
    }

    /// Get remote address
    pub fn remote_addr(&self) -> Option<&str> {
        self.remote_addr.as_deref()
    }
}

/// Connection manager
pub struct ConnectionManager {
    /// Active connections indexed by connection ID
    connections: Arc<DashMap<ConnectionId, Arc<Connection>>>,
    /// Connection statistics
    stats: Arc<RwLock<ConnectionStats>>,
}

impl ConnectionManager {
    /// Create a new connection manager
    pub fn new() -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
            stats: Arc::new(RwLock::new(ConnectionStats::default())),
        }
    }

    /// Register a new connection
    pub fn register(
        &self,
        session: Session,
        remote_addr: Option<String>,
    ) -> (Arc<Connection>, mpsc::UnboundedReceiver<ServerMessage>) {
        let connection_id = session.id.clone();
        let (connection, rx) = Connection::new(session, remote_addr);
        let connection = Arc::new(connection);

        self.connections
            .insert(connection_id.clone(), connection.clone());
        {
            let mut stats = self.stats.write();
            stats.total_connections += 1;
            stats.active_connections = self.connections.len() as u64;
        }
        metrics::record_connection();

        info!(connection_id = %connection_id, "WebSocket connection registered");
        (connection, rx)
    }

    /// Unregister a connection; returns false if it was already gone
    pub fn unregister(&self, connection_id: &ConnectionId) -> bool {
        if let Some((_, connection)) = self.connections.remove(connection_id) {
            self.stats.write().active_connections = self.connections.len() as u64;
            metrics::record_disconnection(connection.session.read().age_seconds() as f64);
            info!(connection_id = %connection_id, "WebSocket connection unregistered");
            true
        } else {
            false
        }
    }

    /// Get connection by ID
    pub fn get(&self, connection_id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(connection_id).map(|e| e.value().clone())
    }

    /// Get number of active connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Deliver an event to every connection that accepts its target
    pub fn deliver(&self, envelope: &EventEnvelope) -> u64 {
        let mut delivered = 0;
        let mut filtered = 0;

        let channel = match &envelope.target {
            EventTarget::Global(_) => None,
            EventTarget::Channel(name) => Some(name.clone()),
        };

        for entry in self.connections.iter() {
            let connection = entry.value();
            if !connection.accepts(&envelope.target) {
                filtered += 1;
                continue;
            }

            let message = ServerMessage::Event {
                message_id: envelope.id.clone(),
                name: envelope.target.name().to_string(),
                channel: channel.clone(),
                payload: envelope.event.clone(),
                timestamp: envelope.timestamp,
            };

            if let Err(e) = connection.send(message) {
                metrics::record_send_error();
                warn!(
                    connection_id = %entry.key(),
                    error = ?e,
                    "Failed to send event to connection"
                );
            } else {
                delivered += 1;
            }
        }

        debug!(
            target = envelope.target.name(),
            delivered = delivered,
            filtered = filtered,
            "Event delivery completed"
        );

        let mut stats = self.stats.write();
        stats.total_events_broadcast += 1;
        stats.total_events_delivered += delivered;
        delivered
    }

    /// Get statistics
    pub fn stats(&self) -> ConnectionStats {
        self.stats.read().clone()
    }

    /// Remove idle sessions and return their IDs so presence can be purged
    pub fn cleanup_expired(&self, timeout_secs: i64) -> Vec<ConnectionId> {
        let expired: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|entry| entry.value().session.read().is_expired(timeout_secs))
            .map(|entry| entry.key().clone())
            .collect();

        for connection_id in &expired {
            info!(connection_id = %connection_id, "Cleaning up expired session");
            if let Some(connection) = self.get(connection_id) {
                let _ = connection.send(ServerMessage::Closing {
                    reason: "session expired".to_string(),
                });
            }
            self.unregister(connection_id);
        }

        expired
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Connection statistics
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ConnectionStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_events_broadcast: u64,
    pub total_events_delivered: u64,
}

/// Connection errors
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Failed to send message to connection")]
    SendFailed,
}

impl From<ConnectionError> for crate::error::AppError {
    fn from(err: ConnectionError) -> Self {
        crate::error::AppError::Internal(err.to_string())
    }
}

/// WebSocket message writer
pub struct MessageWriter {
    sink: SplitSink<WebSocket, Message>,
}

impl MessageWriter {
    /// Create a new message writer
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self { sink }
    }

    /// Send a server message
    pub async fn send(&mut self, message: ServerMessage) -> Result<(), std::io::Error> {
        let json = serde_json::to_string(&message)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        self.sink
            .send(Message::Text(json))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::BrokenPipe, e))?;
        metrics::record_message_sent();
        Ok(())
    }

    /// Send a ping
    pub async fn send_ping(&mut self) -> Result<(), std::io::Error> {
        self.sink
            .send(Message::Ping(vec![]))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::BrokenPipe, e))
    }

    /// Close the connection
    pub async fn close(mut self) -> Result<(), std::io::Error> {
        self.sink
            .send(Message::Close(None))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::BrokenPipe, e))
    }
}
