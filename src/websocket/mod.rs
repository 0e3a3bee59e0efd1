//! WebSocket transport
//!
//! Viewers connect to `/ws`, `join` a stream, and from then on receive that
//! stream's viewer counts, heartbeats and live events plus every global
//! event.
//!
//! # Architecture
//!
//! - **Messages**: client/server protocol frames
//! - **Events**: typed payloads and envelopes
//! - **Session**: per-connection channel subscriptions and activity
//! - **Connection**: connection registry and fan-out
//! - **Broadcaster**: the [`BroadcastGateway`] implementation
//! - **Server**: upgrade handler, read loop and idle-session reaper
//! - **Metrics**: Prometheus metrics for monitoring
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use avatar_live_hub::config::{PresenceConfig, WebSocketSettings};
//! use avatar_live_hub::presence::PresenceService;
//! use avatar_live_hub::state::create_in_memory_store;
//! use avatar_live_hub::websocket::{ConnectionManager, EventBroadcaster, WebSocketState};
//! use std::sync::Arc;
//!
//! let settings = WebSocketSettings::default();
//! let broadcaster = Arc::new(EventBroadcaster::new(
//!     Arc::new(ConnectionManager::new()),
//!     settings.broadcast_capacity,
//! ));
//! let presence = PresenceService::new(
//!     PresenceConfig::default(),
//!     create_in_memory_store(),
//!     broadcaster.clone(),
//! );
//! let state = Arc::new(WebSocketState::new(settings, broadcaster, presence.event_handler()));
//! let app = avatar_live_hub::websocket::router(state);
//! ```

pub mod broadcaster;
pub mod connection;
pub mod events;
pub mod messages;
pub mod metrics;
pub mod server;
pub mod session;

use axum::{routing::get, Router};
use std::sync::Arc;

use crate::config::WebSocketSettings;
use crate::presence::PresenceEventHandler;

pub use broadcaster::{BroadcastGateway, EventBroadcaster};
pub use connection::ConnectionManager;
pub use events::{EventEnvelope, EventTarget, LiveEvent, OutboundEvent};
pub use messages::{ClientMessage, ServerMessage};
pub use server::{cleanup_task, websocket_handler};
pub use session::Session;

/// WebSocket state shared across connections
pub struct WebSocketState {
    pub config: WebSocketSettings,
    pub connections: Arc<ConnectionManager>,
    pub broadcaster: Arc<EventBroadcaster>,
    /// Presence hooks for join/leave/disconnect
    pub presence: PresenceEventHandler,
}

impl WebSocketState {
    pub fn new(
        config: WebSocketSettings,
        broadcaster: Arc<EventBroadcaster>,
        presence: PresenceEventHandler,
    ) -> Self {
        Self {
            config,
            connections: broadcaster.connections().clone(),
            broadcaster,
            presence,
        }
    }

    /// Get connection statistics
    pub fn connection_stats(&self) -> connection::ConnectionStats {
        self.connections.stats()
    }

    /// Get event statistics
    pub fn event_stats(&self) -> events::EventStats {
        self.broadcaster.stats()
    }

    /// Get active connection count
    pub fn active_connections(&self) -> usize {
        self.connections.connection_count()
    }
}

/// Routes served by the transport
pub fn router(state: Arc<WebSocketState>) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .with_state(state)
}
