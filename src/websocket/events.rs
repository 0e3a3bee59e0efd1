//! Typed event payloads and envelopes
//!
//! Every event the hub publishes is one of the [`OutboundEvent`] variants.
//! Payloads serialize without a wrapper tag, so clients receive exactly
//! `{ "count": 3 }` on a viewer-count channel and the full record on a
//! `streaming_status_update`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::models::{StreamId, StreamLivenessRecord};

/// Global event name for aggregate viewer counts
pub const ALL_VIEWER_COUNTS_EVENT: &str = "viewer_counts";

/// Global event name for stream status changes
pub const STATUS_UPDATE_EVENT: &str = "streaming_status_update";

/// Per-stream viewer count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerCountPayload {
    pub count: usize,
}

/// Snapshot of viewer counts for every tracked stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllViewerCountsPayload {
    pub counts: BTreeMap<StreamId, usize>,
}

/// Per-stream heartbeat / liveness notice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatPayload {
    pub last_heartbeat_at: DateTime<Utc>,
    pub is_live: bool,
}

impl From<&StreamLivenessRecord> for HeartbeatPayload {
    fn from(record: &StreamLivenessRecord) -> Self {
        Self {
            last_heartbeat_at: record.last_heartbeat_at,
            is_live: record.is_live,
        }
    }
}

/// Full streaming-status record after a change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdatePayload {
    #[serde(flatten)]
    pub record: StreamLivenessRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CommentEvent {
    #[validate(length(min = 1, max = 64))]
    pub author: String,
    #[validate(length(min = 1, max = 500))]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct LikeEvent {
    #[validate(length(min = 1, max = 64))]
    pub from: String,
    #[validate(range(min = 1, max = 1000))]
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct GiftEvent {
    #[validate(length(min = 1, max = 64))]
    pub sender: String,
    #[validate(length(min = 1, max = 64))]
    pub gift_id: String,
    #[validate(range(min = 1))]
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct AnimationEvent {
    #[validate(length(min = 1, max = 64))]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ExpressionEvent {
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    #[validate(range(min = 0.0, max = 1.0))]
    pub intensity: f32,
}

/// Interaction or avatar-state event relayed to a stream's viewers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LiveEvent {
    Comment(CommentEvent),
    Like(LikeEvent),
    Gift(GiftEvent),
    Animation(AnimationEvent),
    Expression(ExpressionEvent),
}

impl LiveEvent {
    /// Channel suffixes, one per variant
    pub const KINDS: [&'static str; 5] = ["comment", "like", "gift", "animation", "expression"];

    pub fn kind(&self) -> &'static str {
        match self {
            LiveEvent::Comment(_) => "comment",
            LiveEvent::Like(_) => "like",
            LiveEvent::Gift(_) => "gift",
            LiveEvent::Animation(_) => "animation",
            LiveEvent::Expression(_) => "expression",
        }
    }
}

impl Validate for LiveEvent {
    fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            LiveEvent::Comment(e) => e.validate(),
            LiveEvent::Like(e) => e.validate(),
            LiveEvent::Gift(e) => e.validate(),
            LiveEvent::Animation(e) => e.validate(),
            LiveEvent::Expression(e) => e.validate(),
        }
    }
}

/// Payload carried by a published event
///
/// Untagged on the wire and serialize-only: a snapshot of a stream named
/// `count` has the same shape as a per-stream count, so clients tell the
/// payloads apart by the event name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundEvent {
    Live(LiveEvent),
    StatusUpdate(StatusUpdatePayload),
    Heartbeat(HeartbeatPayload),
    ViewerCount(ViewerCountPayload),
    AllViewerCounts(AllViewerCountsPayload),
}

impl OutboundEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            OutboundEvent::Live(_) => EventType::LiveEvent,
            OutboundEvent::StatusUpdate(_) => EventType::StatusUpdate,
            OutboundEvent::Heartbeat(_) => EventType::Heartbeat,
            OutboundEvent::ViewerCount(_) => EventType::ViewerCount,
            OutboundEvent::AllViewerCounts(_) => EventType::AllViewerCounts,
        }
    }

    pub fn viewer_count(count: usize) -> Self {
        OutboundEvent::ViewerCount(ViewerCountPayload { count })
    }

    pub fn status_update(record: StreamLivenessRecord) -> Self {
        OutboundEvent::StatusUpdate(StatusUpdatePayload { record })
    }

    pub fn heartbeat(record: &StreamLivenessRecord) -> Self {
        OutboundEvent::Heartbeat(HeartbeatPayload::from(record))
    }
}

/// Kind of published event, used for stats and metrics labels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ViewerCount,
    AllViewerCounts,
    Heartbeat,
    StatusUpdate,
    LiveEvent,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ViewerCount => "viewer_count",
            EventType::AllViewerCounts => "all_viewer_counts",
            EventType::Heartbeat => "heartbeat",
            EventType::StatusUpdate => "status_update",
            EventType::LiveEvent => "live_event",
        }
    }
}

/// Where an event is delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventTarget {
    /// Every connection, under an event name
    Global(String),
    /// Connections subscribed to the channel
    Channel(String),
}

impl EventTarget {
    pub fn name(&self) -> &str {
        match self {
            EventTarget::Global(name) | EventTarget::Channel(name) => name,
        }
    }
}

/// Internal event envelope for broadcasting
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: String,
    /// Event timestamp
    pub timestamp: DateTime<Utc>,
    pub target: EventTarget,
    pub event: OutboundEvent,
}

impl EventEnvelope {
    pub fn new(target: EventTarget, event: OutboundEvent) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            target,
            event,
        }
    }
}

/// Event statistics
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EventStats {
    pub total_events: u64,
    pub events_by_type: std::collections::HashMap<String, u64>,
    pub last_event_time: Option<DateTime<Utc>>,
}

impl EventStats {
    /// Record a new event
    pub fn record_event(&mut self, event_type: EventType) {
        self.total_events += 1;
        *self
            .events_by_type
            .entry(event_type.as_str().to_string())
            .or_insert(0) += 1;
        self.last_event_time = Some(Utc::now());
    }
}
