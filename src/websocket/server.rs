//! WebSocket server implementation
//!
//! This module implements the WebSocket endpoint using Axum's WebSocket
//! support and routes client frames into the presence registry.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    response::Response,
};
use chrono::Utc;
use futures::stream::StreamExt;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::time::{interval, interval_at, Instant};
use tracing::{debug, error, info, warn};

use crate::error::{AppError, Result};
use crate::models::StreamId;

use super::{
    connection::{Connection, MessageWriter},
    messages::{ClientMessage, ServerMessage},
    metrics,
    session::Session,
    WebSocketState,
};

/// WebSocket endpoint handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<WebSocketState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Response {
    info!(remote_addr = %addr, "WebSocket connection request");

    ws.on_upgrade(move |socket| handle_socket(socket, state, addr))
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<WebSocketState>, addr: SocketAddr) {
    let (sender, mut receiver) = socket.split();
    let mut writer = MessageWriter::new(sender);

    let session = Session::new();
    let connection_id = session.id.clone();

    info!(connection_id = %connection_id, remote_addr = %addr, "WebSocket session started");

    let (connection, mut message_rx) = state
        .connections
        .register(session, Some(addr.to_string()));

    let welcome = ServerMessage::Welcome {
        connection_id: connection_id.clone(),
        server_time: Utc::now(),
    };

    if let Err(e) = writer.send(welcome).await {
        error!(connection_id = %connection_id, error = ?e, "Failed to send welcome message");
        state.connections.unregister(&connection_id);
        return;
    }

    // Writer task: drains the connection's queue into the socket and pings
    // idle clients
    let writer_id = connection_id.clone();
    let ping_interval = Duration::from_secs(state.config.ping_interval_secs);
    let mut sender_handle = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + ping_interval, ping_interval);

        loop {
            tokio::select! {
                message = message_rx.recv() => {
                    let Some(message) = message else { break };
                    let closing = matches!(message, ServerMessage::Closing { .. });
                    if let Err(e) = writer.send(message).await {
                        error!(connection_id = %writer_id, error = ?e, "Failed to send message");
                        break;
                    }
                    if closing {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if writer.send_ping().await.is_err() {
                        debug!(connection_id = %writer_id, "Ping failed, connection closed");
                        break;
                    }
                }
            }
        }

        let _ = writer.close().await;
    });

    loop {
        let msg = tokio::select! {
            msg = receiver.next() => msg,
            // The writer stops after a Closing frame or a dead socket
            _ = &mut sender_handle => break,
        };

        let msg = match msg {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                error!(connection_id = %connection_id, error = ?e, "WebSocket error");
                break;
            }
            None => break,
        };

        match msg {
            Message::Text(text) => {
                metrics::record_message_received();
                debug!(connection_id = %connection_id, "Received text message");

                if let Err(e) = handle_client_message(&text, &connection, &state).await {
                    warn!(connection_id = %connection_id, error = %e, "Failed to handle message");
                    let _ = connection.send(ServerMessage::error(e.error_code(), e.to_string()));
                }
            }
            Message::Binary(_) => {
                warn!(connection_id = %connection_id, "Received binary message (not supported)");
                let _ = connection.send(ServerMessage::error(
                    "UNSUPPORTED",
                    "Binary messages are not supported",
                ));
            }
            Message::Ping(_) => {
                // Axum answers pings itself
                connection.session.write().touch();
            }
            Message::Pong(_) => {
                connection.session.write().touch();
            }
            Message::Close(_) => {
                info!(connection_id = %connection_id, "Client closed connection");
                break;
            }
        }
    }

    // Presence first so the count snapshot excludes this viewer
    state.presence.on_disconnect(&connection_id).await;
    sender_handle.abort();
    state.connections.unregister(&connection_id);

    info!(
        connection_id = %connection_id,
        remote_addr = connection.remote_addr().unwrap_or("unknown"),
        "WebSocket session ended"
    );
}

/// Apply one client frame to the connection and the presence registry
pub async fn handle_client_message(
    text: &str,
    connection: &Arc<Connection>,
    state: &WebSocketState,
) -> Result<()> {
    let message: ClientMessage = serde_json::from_str(text)
        .map_err(|e| AppError::Validation(format!("Invalid message: {}", e)))?;

    let connection_id = connection.id();

    match message {
        ClientMessage::Join { stream_id } => {
            let stream_id = StreamId::parse(stream_id.as_str())?;

            // Channels follow the registry's single-stream rule
            if let Some(previous) = state.presence.registry().stream_of(&connection_id) {
                if previous != stream_id {
                    connection.session.write().unwatch_stream(&previous);
                }
            }
            connection.session.write().watch_stream(&stream_id);

            let viewer_count = state.presence.on_join(&connection_id, &stream_id).await;
            info!(
                connection_id = %connection_id,
                stream_id = %stream_id,
                viewer_count,
                "Viewer joined stream"
            );

            connection.send(ServerMessage::Joined {
                stream_id,
                viewer_count,
            })?;
        }
        ClientMessage::Leave { stream_id } => {
            // A stale leave keeps the channels of the stream being watched
            if state.presence.on_leave(&connection_id, &stream_id).await.is_changed() {
                connection.session.write().unwatch_stream(&stream_id);
            }

            info!(connection_id = %connection_id, stream_id = %stream_id, "Viewer left stream");
            connection.send(ServerMessage::Left { stream_id })?;
        }
        ClientMessage::Subscribe { channel } => {
            if channel.trim().is_empty() {
                return Err(AppError::Validation("channel must not be empty".to_string()));
            }

            debug!(connection_id = %connection_id, channel = %channel, "Client subscribing");
            connection.session.write().subscribe(channel.clone());
            connection.send(ServerMessage::Subscribed { channel })?;
        }
        ClientMessage::Unsubscribe { channel } => {
            let removed = connection.session.write().unsubscribe(&channel);

            if removed {
                connection.send(ServerMessage::Unsubscribed { channel })?;
            } else {
                return Err(AppError::NotFound(format!("Not subscribed to {}", channel)));
            }
        }
        ClientMessage::Ping { timestamp } => {
            connection.session.write().touch();
            connection.send(ServerMessage::Pong { timestamp })?;
        }
    }

    Ok(())
}

/// Periodic cleanup task for idle sessions
///
/// Reaped connections are also removed from presence.
pub async fn cleanup_task(state: Arc<WebSocketState>) {
    let mut ticker = interval(Duration::from_secs(state.config.cleanup_interval_secs));

    loop {
        ticker.tick().await;

        debug!("Running WebSocket cleanup task");
        let expired = state
            .connections
            .cleanup_expired(state.config.session_timeout_secs as i64);

        for connection_id in &expired {
            state.presence.on_disconnect(connection_id).await;
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "Reaped idle WebSocket sessions");
        }
    }
}
