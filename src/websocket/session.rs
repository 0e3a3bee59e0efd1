//! WebSocket session state
//!
//! A session tracks activity and the set of channels a connection receives.
//! Which stream a connection watches is owned by the presence registry, not
//! the session.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::models::{ConnectionId, StreamId};

use super::events::LiveEvent;

/// WebSocket session
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique connection identifier
    pub id: ConnectionId,
    /// Session creation time
    pub created_at: DateTime<Utc>,
    /// Last activity timestamp
    pub last_active: DateTime<Utc>,
    /// Channels this connection receives
    pub channels: HashSet<String>,
    /// Message counter for tracking
    pub message_count: u64,
}

impl Session {
    /// Create a new session
    pub fn new() -> Self {
        Self::with_id(ConnectionId::new())
    }

    /// Create a session with a specific ID
    pub fn with_id(id: ConnectionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            last_active: now,
            channels: HashSet::new(),
            message_count: 0,
        }
    }

    /// Update last activity timestamp
    pub fn touch(&mut self) {
        self.last_active = Utc::now();
        self.message_count += 1;
    }

    /// Check if session is expired
    pub fn is_expired(&self, timeout_secs: i64) -> bool {
        (Utc::now() - self.last_active).num_seconds() > timeout_secs
    }

    /// Returns false if the channel was already subscribed
    pub fn subscribe(&mut self, channel: impl Into<String>) -> bool {
        self.touch();
        self.channels.insert(channel.into())
    }

    pub fn unsubscribe(&mut self, channel: &str) -> bool {
        self.touch();
        self.channels.remove(channel)
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.channels.contains(channel)
    }

    /// Subscribe to every per-stream channel of `stream_id`
    pub fn watch_stream(&mut self, stream_id: &StreamId) {
        for channel in stream_channels(stream_id) {
            self.channels.insert(channel);
        }
        self.touch();
    }

    /// Drop every per-stream channel of `stream_id`
    pub fn unwatch_stream(&mut self, stream_id: &StreamId) {
        for channel in stream_channels(stream_id) {
            self.channels.remove(&channel);
        }
        self.touch();
    }

    /// Get session age in seconds
    pub fn age_seconds(&self) -> i64 {
        (Utc::now() - self.created_at).num_seconds()
    }

    /// Get idle time in seconds
    pub fn idle_seconds(&self) -> i64 {
        (Utc::now() - self.last_active).num_seconds()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Channels a viewer of `stream_id` receives
pub fn stream_channels(stream_id: &StreamId) -> Vec<String> {
    let mut channels = vec![stream_id.viewer_count_channel(), stream_id.heartbeat_channel()];
    channels.extend(
        LiveEvent::KINDS
            .iter()
            .map(|kind| stream_id.live_event_channel(kind)),
    );
    channels
}
