pub mod store;
pub mod sled_store;
pub mod redis_store;
pub mod factory;

pub use store::*;
pub use sled_store::SledStore;
pub use redis_store::RedisStore;
pub use factory::{create_store, create_in_memory_store};

use crate::error::Result;
use crate::models::{StreamId, StreamLivenessRecord};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

/// Persistence for streaming-status records
///
/// The liveness monitor only uses `find_stale` and `mark_offline`; the rest is
/// the stream owner's write path (heartbeats and explicit status changes).
#[async_trait]
pub trait StreamLifecycleStore: Send + Sync {
    /// Live records whose last heartbeat is older than `now - timeout`
    async fn find_stale(&self, now: DateTime<Utc>, timeout: Duration)
        -> Result<Vec<StreamLivenessRecord>>;

    /// Flip a record to offline only if it is still live and its heartbeat
    /// still equals `expected_last_heartbeat_at`
    ///
    /// Returns `None` when the record is missing, already offline, or a newer
    /// heartbeat landed since it was read.
    async fn mark_offline(
        &self,
        stream_id: &StreamId,
        expected_last_heartbeat_at: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<Option<StreamLivenessRecord>>;

    /// Upsert a heartbeat; the record becomes live
    async fn record_heartbeat(
        &self,
        stream_id: &StreamId,
        at: DateTime<Utc>,
    ) -> Result<StreamLivenessRecord>;

    /// Explicit start/stop from the stream owner
    async fn set_status(
        &self,
        stream_id: &StreamId,
        update: StatusChange,
        at: DateTime<Utc>,
    ) -> Result<StreamLivenessRecord>;

    async fn get(&self, stream_id: &StreamId) -> Result<Option<StreamLivenessRecord>>;

    /// All records, ordered by stream id
    async fn list(&self) -> Result<Vec<StreamLivenessRecord>>;

    /// Cheap round trip used by the readiness probe
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Requested status for [`StreamLifecycleStore::set_status`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusChange {
    pub is_live: bool,
    /// Replaces the stored title when present
    pub title: Option<String>,
}

impl StatusChange {
    pub fn live() -> Self {
        Self {
            is_live: true,
            title: None,
        }
    }

    pub fn offline() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Apply a status change to an existing record or create one
///
/// Going live counts as a heartbeat. Every backend funnels writes through
/// here so they agree on the semantics.
pub(crate) fn apply_status(
    existing: Option<StreamLivenessRecord>,
    stream_id: &StreamId,
    update: &StatusChange,
    at: DateTime<Utc>,
) -> StreamLivenessRecord {
    let mut record =
        existing.unwrap_or_else(|| StreamLivenessRecord::live(stream_id.clone(), at));

    if update.is_live {
        record.touch(at);
    } else {
        record.mark_offline(at);
    }
    if let Some(title) = &update.title {
        record.title = Some(title.clone());
    }
    record
}

/// Apply a heartbeat to an existing record or create one
pub(crate) fn apply_heartbeat(
    existing: Option<StreamLivenessRecord>,
    stream_id: &StreamId,
    at: DateTime<Utc>,
) -> StreamLivenessRecord {
    match existing {
        Some(mut record) => {
            record.touch(at);
            record
        }
        None => StreamLivenessRecord::live(stream_id.clone(), at),
    }
}

/// The conditional demotion, shared by every backend
///
/// Returns the demoted record, or `None` if the guard rejects the write.
pub(crate) fn apply_demotion(
    existing: Option<&StreamLivenessRecord>,
    expected_last_heartbeat_at: DateTime<Utc>,
    at: DateTime<Utc>,
) -> Option<StreamLivenessRecord> {
    let record = existing?;
    if !record.is_live || record.last_heartbeat_at != expected_last_heartbeat_at {
        return None;
    }
    let mut demoted = record.clone();
    demoted.mark_offline(at);
    Some(demoted)
}
