//! Shared helpers for integration tests
//!
//! A gateway that records everything published through it, and a store
//! wrapper that lands a heartbeat between the stale query and the
//! conditional demotion.

#![allow(dead_code)]

use async_trait::async_trait;
use avatar_live_hub::{
    error::Result,
    models::{StreamId, StreamLivenessRecord},
    state::{InMemoryStore, StatusChange, StreamLifecycleStore},
    websocket::{BroadcastGateway, OutboundEvent},
};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Where an event was published
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Published {
    Global(String),
    Channel(String),
}

/// Gateway that keeps every publication in order
#[derive(Default)]
pub struct RecordingGateway {
    events: Mutex<Vec<(Published, OutboundEvent)>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(Published, OutboundEvent)> {
        self.events.lock().clone()
    }

    pub fn global(&self, name: &str) -> Vec<OutboundEvent> {
        self.filter(&Published::Global(name.to_string()))
    }

    pub fn channel(&self, name: &str) -> Vec<OutboundEvent> {
        self.filter(&Published::Channel(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    fn filter(&self, target: &Published) -> Vec<OutboundEvent> {
        self.events
            .lock()
            .iter()
            .filter(|(published, _)| published == target)
            .map(|(_, event)| event.clone())
            .collect()
    }
}

#[async_trait]
impl BroadcastGateway for RecordingGateway {
    async fn publish_global(&self, event_name: &str, payload: OutboundEvent) {
        self.events
            .lock()
            .push((Published::Global(event_name.to_string()), payload));
    }

    async fn publish_to_channel(&self, channel: &str, payload: OutboundEvent) {
        self.events
            .lock()
            .push((Published::Channel(channel.to_string()), payload));
    }
}

/// Store that records a fresh heartbeat right before every `mark_offline`
///
/// Models the stream owner's heartbeat racing the liveness sweep.
pub struct RacingStore {
    pub inner: InMemoryStore,
    pub fresh_heartbeat_at: DateTime<Utc>,
}

impl RacingStore {
    pub fn new(inner: InMemoryStore, fresh_heartbeat_at: DateTime<Utc>) -> Self {
        Self {
            inner,
            fresh_heartbeat_at,
        }
    }
}

#[async_trait]
impl StreamLifecycleStore for RacingStore {
    async fn find_stale(
        &self,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<Vec<StreamLivenessRecord>> {
        self.inner.find_stale(now, timeout).await
    }

    async fn mark_offline(
        &self,
        stream_id: &StreamId,
        expected_last_heartbeat_at: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<Option<StreamLivenessRecord>> {
        self.inner
            .record_heartbeat(stream_id, self.fresh_heartbeat_at)
            .await?;
        self.inner
            .mark_offline(stream_id, expected_last_heartbeat_at, at)
            .await
    }

    async fn record_heartbeat(
        &self,
        stream_id: &StreamId,
        at: DateTime<Utc>,
    ) -> Result<StreamLivenessRecord> {
        self.inner.record_heartbeat(stream_id, at).await
    }

    async fn set_status(
        &self,
        stream_id: &StreamId,
        update: StatusChange,
        at: DateTime<Utc>,
    ) -> Result<StreamLivenessRecord> {
        self.inner.set_status(stream_id, update, at).await
    }

    async fn get(&self, stream_id: &StreamId) -> Result<Option<StreamLivenessRecord>> {
        self.inner.get(stream_id).await
    }

    async fn list(&self) -> Result<Vec<StreamLivenessRecord>> {
        self.inner.list().await
    }
}

/// Helper function to parse Prometheus exposition format
/// Returns a map of metric name to its HELP/TYPE and sample lines
pub fn parse_prometheus_output(output: &str) -> HashMap<String, Vec<String>> {
    let mut metrics = HashMap::new();
    let mut current_metric = String::new();

    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line.starts_with("# HELP") || line.starts_with("# TYPE") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 3 {
                current_metric = parts[2].to_string();
                metrics
                    .entry(current_metric.clone())
                    .or_insert_with(Vec::new)
                    .push(line.to_string());
            }
        } else if !line.starts_with('#') && !current_metric.is_empty() {
            metrics
                .entry(current_metric.clone())
                .or_insert_with(Vec::new)
                .push(line.to_string());
        }
    }

    metrics
}
