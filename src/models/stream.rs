use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Identifier of a stream (an agent) that viewers watch
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// Build a stream id, rejecting empty or whitespace-only input
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(AppError::Validation("stream id must not be empty".to_string()));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Channel carrying per-stream viewer counts
    pub fn viewer_count_channel(&self) -> String {
        format!("{}_viewer_count", self.0)
    }

    /// Channel carrying per-stream heartbeat and liveness updates
    pub fn heartbeat_channel(&self) -> String {
        format!("{}_heartbeat", self.0)
    }

    /// Channel carrying one kind of live event (comment, gift, ...)
    pub fn live_event_channel(&self, kind: &str) -> String {
        format!("{}_{}", self.0, kind)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StreamId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identifier of one live transport session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Liveness state of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StreamStatus {
    Live,
    Offline,
}

/// Persisted streaming-status record
///
/// Created by the first heartbeat or status update from the stream owner.
/// The liveness monitor only ever flips `is_live` to `false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamLivenessRecord {
    pub stream_id: StreamId,
    pub is_live: bool,
    pub last_heartbeat_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub title: Option<String>,
}

impl StreamLivenessRecord {
    /// New live record with a heartbeat at `at`
    pub fn live(stream_id: StreamId, at: DateTime<Utc>) -> Self {
        Self {
            stream_id,
            is_live: true,
            last_heartbeat_at: at,
            updated_at: at,
            title: None,
        }
    }

    pub fn status(&self) -> StreamStatus {
        if self.is_live {
            StreamStatus::Live
        } else {
            StreamStatus::Offline
        }
    }

    /// Heartbeat age strictly exceeds the timeout
    pub fn is_stale(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.last_heartbeat_at > timeout
    }

    /// Live and stale: a candidate for demotion
    pub fn should_demote(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.is_live && self.is_stale(now, timeout)
    }

    /// Apply a heartbeat; any heartbeat makes the stream live again
    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.is_live = true;
        self.last_heartbeat_at = at;
        self.updated_at = at;
    }

    pub fn mark_offline(&mut self, at: DateTime<Utc>) {
        self.is_live = false;
        self.updated_at = at;
    }
}
