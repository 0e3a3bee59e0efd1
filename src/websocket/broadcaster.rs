//! Event broadcasting
//!
//! [`BroadcastGateway`] is the seam the presence core publishes through.
//! [`EventBroadcaster`] implements it on top of the WebSocket connection
//! registry and an in-process broadcast channel.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::metrics;

use super::{
    connection::ConnectionManager,
    events::{EventEnvelope, EventStats, EventTarget, OutboundEvent},
};

/// Publish-only view of the transport
///
/// Fire-and-forget: delivery failures are the transport's concern and are
/// never reported back to the publisher.
#[async_trait]
pub trait BroadcastGateway: Send + Sync {
    /// Publish to every connection under `event_name`
    async fn publish_global(&self, event_name: &str, payload: OutboundEvent);

    /// Publish to connections subscribed to `channel`
    async fn publish_to_channel(&self, channel: &str, payload: OutboundEvent);
}

/// Event broadcaster
pub struct EventBroadcaster {
    /// Broadcast channel for in-process consumers
    tx: broadcast::Sender<EventEnvelope>,
    /// Connection manager
    connections: Arc<ConnectionManager>,
    /// Event statistics
    stats: Arc<RwLock<EventStats>>,
    /// Channel capacity
    capacity: usize,
}

impl EventBroadcaster {
    /// Create a new event broadcaster
    pub fn new(connections: Arc<ConnectionManager>, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            connections,
            stats: Arc::new(RwLock::new(EventStats::default())),
            capacity,
        }
    }

    /// Publish an envelope to in-process subscribers and WebSocket clients
    pub fn publish(&self, target: EventTarget, event: OutboundEvent) {
        let event_type = event.event_type();
        let envelope = EventEnvelope::new(target, event);

        debug!(
            target = envelope.target.name(),
            event_type = event_type.as_str(),
            "Publishing event"
        );

        self.stats.write().record_event(event_type);
        metrics::record_event_published(event_type.as_str());

        // No receivers is the normal case outside tests
        if self.tx.send(envelope.clone()).is_err() {
            trace!("No in-process subscribers for event");
        }

        self.connections.deliver(&envelope);
    }

    /// Subscribe to events (for internal consumers)
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    /// Get event statistics
    pub fn stats(&self) -> EventStats {
        self.stats.read().clone()
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    /// Get channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl BroadcastGateway for EventBroadcaster {
    async fn publish_global(&self, event_name: &str, payload: OutboundEvent) {
        self.publish(EventTarget::Global(event_name.to_string()), payload);
    }

    async fn publish_to_channel(&self, channel: &str, payload: OutboundEvent) {
        self.publish(EventTarget::Channel(channel.to_string()), payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::events::STATUS_UPDATE_EVENT;

    #[tokio::test]
    async fn test_broadcaster_creation() {
        let manager = Arc::new(ConnectionManager::new());
        let broadcaster = EventBroadcaster::new(manager, 100);

        assert_eq!(broadcaster.capacity(), 100);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_records_stats() {
        let manager = Arc::new(ConnectionManager::new());
        let broadcaster = EventBroadcaster::new(manager, 100);

        broadcaster
            .publish_to_channel("a_viewer_count", OutboundEvent::viewer_count(2))
            .await;

        assert_eq!(broadcaster.stats().total_events, 1);
    }

    #[tokio::test]
    async fn test_subscribers_see_targets() {
        let manager = Arc::new(ConnectionManager::new());
        let broadcaster = EventBroadcaster::new(manager, 100);

        let mut rx1 = broadcaster.subscribe();
        let mut rx2 = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 2);

        broadcaster
            .publish_global(STATUS_UPDATE_EVENT, OutboundEvent::viewer_count(0))
            .await;

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.id, e2.id);
        assert_eq!(e1.target, EventTarget::Global(STATUS_UPDATE_EVENT.to_string()));
    }
}
