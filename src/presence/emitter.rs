//! Viewer count publication

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::metrics;
use crate::websocket::{
    broadcaster::BroadcastGateway,
    events::{AllViewerCountsPayload, OutboundEvent, ALL_VIEWER_COUNTS_EVENT},
};

use super::registry::PresenceRegistry;
use super::sweep::Sweep;

/// Turns registry snapshots into viewer-count events
#[derive(Clone)]
pub struct CountEmitter {
    registry: Arc<PresenceRegistry>,
    gateway: Arc<dyn BroadcastGateway>,
}

impl CountEmitter {
    pub fn new(registry: Arc<PresenceRegistry>, gateway: Arc<dyn BroadcastGateway>) -> Self {
        Self { registry, gateway }
    }

    /// Publish `{ count }` on every tracked stream's viewer-count channel
    pub async fn sweep(&self) {
        let counts = self.registry.all_counts();
        metrics::set_presence_gauges(counts.len(), counts.values().sum());

        for (stream_id, count) in &counts {
            self.gateway
                .publish_to_channel(
                    &stream_id.viewer_count_channel(),
                    OutboundEvent::viewer_count(*count),
                )
                .await;
        }

        debug!(streams = counts.len(), "Published per-stream viewer counts");
    }

    /// Publish the whole `{ stream_id: count }` snapshot to every connection
    pub async fn emit_all(&self) {
        let counts = self.registry.all_counts();
        debug!(streams = counts.len(), "Publishing viewer count snapshot");

        self.gateway
            .publish_global(
                ALL_VIEWER_COUNTS_EVENT,
                OutboundEvent::AllViewerCounts(AllViewerCountsPayload { counts }),
            )
            .await;
    }

    pub fn registry(&self) -> &Arc<PresenceRegistry> {
        &self.registry
    }
}

#[async_trait]
impl Sweep for CountEmitter {
    fn name(&self) -> &'static str {
        "viewer_counts"
    }

    async fn run_once(&self) -> Result<()> {
        self.sweep().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConnectionId, StreamId};
    use crate::websocket::events::ViewerCountPayload;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Captured {
        global: Mutex<Vec<(String, OutboundEvent)>>,
        channel: Mutex<Vec<(String, OutboundEvent)>>,
    }

    #[async_trait]
    impl BroadcastGateway for Captured {
        async fn publish_global(&self, event_name: &str, payload: OutboundEvent) {
            self.global.lock().push((event_name.to_string(), payload));
        }

        async fn publish_to_channel(&self, channel: &str, payload: OutboundEvent) {
            self.channel.lock().push((channel.to_string(), payload));
        }
    }

    fn setup() -> (Arc<PresenceRegistry>, Arc<Captured>, CountEmitter) {
        let registry = Arc::new(PresenceRegistry::new());
        let gateway = Arc::new(Captured::default());
        let emitter = CountEmitter::new(registry.clone(), gateway.clone());
        (registry, gateway, emitter)
    }

    #[tokio::test]
    async fn test_sweep_publishes_per_stream() {
        let (registry, gateway, emitter) = setup();
        registry.join(&ConnectionId::from("c1"), &StreamId::from("a"));
        registry.join(&ConnectionId::from("c2"), &StreamId::from("a"));
        registry.join(&ConnectionId::from("c3"), &StreamId::from("b"));

        emitter.sweep().await;

        let published = gateway.channel.lock().clone();
        assert_eq!(
            published,
            vec![
                (
                    "a_viewer_count".to_string(),
                    OutboundEvent::ViewerCount(ViewerCountPayload { count: 2 })
                ),
                (
                    "b_viewer_count".to_string(),
                    OutboundEvent::ViewerCount(ViewerCountPayload { count: 1 })
                ),
            ]
        );
        assert!(gateway.global.lock().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_with_no_viewers_is_silent() {
        let (_registry, gateway, emitter) = setup();
        emitter.run_once().await.unwrap();
        assert!(gateway.channel.lock().is_empty());
    }

    #[tokio::test]
    async fn test_emit_all_publishes_snapshot() {
        let (registry, gateway, emitter) = setup();
        registry.join(&ConnectionId::from("c1"), &StreamId::from("a"));

        emitter.emit_all().await;

        let global = gateway.global.lock().clone();
        assert_eq!(global.len(), 1);
        assert_eq!(global[0].0, ALL_VIEWER_COUNTS_EVENT);
        match &global[0].1 {
            OutboundEvent::AllViewerCounts(payload) => {
                assert_eq!(payload.counts.get(&StreamId::from("a")), Some(&1));
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }
}
