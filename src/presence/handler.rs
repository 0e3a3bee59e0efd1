//! Connection lifecycle events feeding the presence registry

use std::sync::Arc;
use tracing::debug;

use crate::models::{ConnectionId, StreamId};

use super::emitter::CountEmitter;
use super::registry::{MembershipChange, PresenceRegistry};

/// Applies join/leave/disconnect to the registry and pushes a fresh count
/// snapshot whenever membership actually changed
#[derive(Clone)]
pub struct PresenceEventHandler {
    registry: Arc<PresenceRegistry>,
    emitter: CountEmitter,
}

impl PresenceEventHandler {
    pub fn new(registry: Arc<PresenceRegistry>, emitter: CountEmitter) -> Self {
        Self { registry, emitter }
    }

    /// Returns the stream's viewer count after the join
    pub async fn on_join(&self, connection: &ConnectionId, stream: &StreamId) -> usize {
        let change = self.registry.join(connection, stream);
        let count = self.registry.viewer_count(stream);
        debug!(connection_id = %connection, stream_id = %stream, count, "Viewer joined");

        self.emit_if_changed(change).await;
        count
    }

    pub async fn on_leave(&self, connection: &ConnectionId, stream: &StreamId) -> MembershipChange {
        let change = self.registry.leave(connection, stream);
        debug!(connection_id = %connection, stream_id = %stream, ?change, "Viewer left");

        self.emit_if_changed(change).await;
        change
    }

    /// Returns the stream the connection was watching, if any
    pub async fn on_disconnect(&self, connection: &ConnectionId) -> Option<StreamId> {
        let previous = self.registry.disconnect(connection);
        if let Some(stream) = &previous {
            debug!(connection_id = %connection, stream_id = %stream, "Viewer disconnected");
            self.emitter.emit_all().await;
        }
        previous
    }

    pub fn registry(&self) -> &Arc<PresenceRegistry> {
        &self.registry
    }

    async fn emit_if_changed(&self, change: MembershipChange) {
        if change.is_changed() {
            self.emitter.emit_all().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::broadcaster::BroadcastGateway;
    use crate::websocket::events::OutboundEvent;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct GlobalCounter {
        global: AtomicUsize,
    }

    #[async_trait]
    impl BroadcastGateway for GlobalCounter {
        async fn publish_global(&self, _event_name: &str, _payload: OutboundEvent) {
            self.global.fetch_add(1, Ordering::SeqCst);
        }

        async fn publish_to_channel(&self, _channel: &str, _payload: OutboundEvent) {}
    }

    fn setup() -> (Arc<GlobalCounter>, PresenceEventHandler) {
        let registry = Arc::new(PresenceRegistry::new());
        let gateway = Arc::new(GlobalCounter::default());
        let emitter = CountEmitter::new(registry.clone(), gateway.clone());
        (gateway, PresenceEventHandler::new(registry, emitter))
    }

    #[tokio::test]
    async fn test_emits_only_on_change() {
        let (gateway, handler) = setup();
        let conn = ConnectionId::from("c1");
        let stream = StreamId::from("a");

        assert_eq!(handler.on_join(&conn, &stream).await, 1);
        assert_eq!(handler.on_join(&conn, &stream).await, 1);
        assert_eq!(gateway.global.load(Ordering::SeqCst), 1);

        assert!(handler.on_leave(&conn, &stream).await.is_changed());
        assert!(!handler.on_leave(&conn, &stream).await.is_changed());
        assert_eq!(gateway.global.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disconnect_of_idle_connection_is_silent() {
        let (gateway, handler) = setup();
        assert_eq!(handler.on_disconnect(&ConnectionId::from("idle")).await, None);
        assert_eq!(gateway.global.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disconnect_returns_previous_stream() {
        let (gateway, handler) = setup();
        let conn = ConnectionId::from("c1");
        handler.on_join(&conn, &StreamId::from("a")).await;

        assert_eq!(handler.on_disconnect(&conn).await, Some(StreamId::from("a")));
        assert_eq!(handler.registry().viewer_count(&StreamId::from("a")), 0);
        assert_eq!(gateway.global.load(Ordering::SeqCst), 2);
    }
}
