pub mod handlers;
pub mod routes;

pub use routes::*;

use crate::{
    presence::PresenceService,
    state::StreamLifecycleStore,
    websocket::{BroadcastGateway, EventBroadcaster, WebSocketState},
};
use std::sync::Arc;
use std::time::Instant;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StreamLifecycleStore>,
    pub presence: Arc<PresenceService>,
    pub broadcaster: Arc<EventBroadcaster>,
    pub websocket: Arc<WebSocketState>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<dyn StreamLifecycleStore>,
        presence: Arc<PresenceService>,
        websocket: Arc<WebSocketState>,
    ) -> Self {
        Self {
            store,
            presence,
            broadcaster: websocket.broadcaster.clone(),
            websocket,
            started_at: Instant::now(),
        }
    }

    /// Publishing view of the broadcaster
    pub fn gateway(&self) -> &dyn BroadcastGateway {
        self.broadcaster.as_ref()
    }
}
