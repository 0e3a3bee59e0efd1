use crate::error::Result;
use crate::models::{StreamId, StreamLivenessRecord};
use crate::state::{apply_demotion, apply_status, StatusChange, StreamLifecycleStore};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// In-memory stream store (for development and testing)
#[derive(Clone, Default)]
pub struct InMemoryStore {
    streams: Arc<DashMap<StreamId, StreamLivenessRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a record unconditionally (test fixtures, imports)
    pub fn insert(&self, record: StreamLivenessRecord) {
        self.streams.insert(record.stream_id.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

#[async_trait]
impl StreamLifecycleStore for InMemoryStore {
    async fn find_stale(
        &self,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<Vec<StreamLivenessRecord>> {
        let mut stale: Vec<StreamLivenessRecord> = self
            .streams
            .iter()
            .filter(|entry| entry.value().should_demote(now, timeout))
            .map(|entry| entry.value().clone())
            .collect();
        stale.sort_by(|a, b| a.stream_id.cmp(&b.stream_id));
        Ok(stale)
    }

    async fn mark_offline(
        &self,
        stream_id: &StreamId,
        expected_last_heartbeat_at: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<Option<StreamLivenessRecord>> {
        // The shard lock is held across the check and the write
        let Some(mut entry) = self.streams.get_mut(stream_id) else {
            return Ok(None);
        };

        let demoted = apply_demotion(Some(entry.value()), expected_last_heartbeat_at, at);
        if let Some(record) = &demoted {
            *entry.value_mut() = record.clone();
            tracing::debug!(stream_id = %stream_id, "Stream marked offline");
        }
        Ok(demoted)
    }

    async fn record_heartbeat(
        &self,
        stream_id: &StreamId,
        at: DateTime<Utc>,
    ) -> Result<StreamLivenessRecord> {
        let mut entry = self
            .streams
            .entry(stream_id.clone())
            .or_insert_with(|| StreamLivenessRecord::live(stream_id.clone(), at));
        entry.value_mut().touch(at);
        Ok(entry.value().clone())
    }

    async fn set_status(
        &self,
        stream_id: &StreamId,
        update: StatusChange,
        at: DateTime<Utc>,
    ) -> Result<StreamLivenessRecord> {
        let mut entry = self
            .streams
            .entry(stream_id.clone())
            .or_insert_with(|| StreamLivenessRecord::live(stream_id.clone(), at));
        let updated = apply_status(Some(entry.value().clone()), stream_id, &update, at);
        *entry.value_mut() = updated.clone();
        drop(entry);

        tracing::debug!(stream_id = %stream_id, is_live = updated.is_live, "Stream status set");
        Ok(updated)
    }

    async fn get(&self, stream_id: &StreamId) -> Result<Option<StreamLivenessRecord>> {
        Ok(self.streams.get(stream_id).map(|entry| entry.value().clone()))
    }

    async fn list(&self) -> Result<Vec<StreamLivenessRecord>> {
        let mut records: Vec<StreamLivenessRecord> = self
            .streams
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.stream_id.cmp(&b.stream_id));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_heartbeat_upserts_live_record() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let id = StreamId::from("agent");

        let record = store.record_heartbeat(&id, now).await.unwrap();
        assert!(record.is_live);
        assert_eq!(record.last_heartbeat_at, now);

        let later = now + Duration::seconds(5);
        store.record_heartbeat(&id, later).await.unwrap();
        let stored = store.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.last_heartbeat_at, later);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_find_stale_only_returns_live_and_old() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let timeout = Duration::seconds(30);

        store.insert(StreamLivenessRecord::live("old".into(), now - Duration::seconds(31)));
        store.insert(StreamLivenessRecord::live("fresh".into(), now - Duration::seconds(10)));
        let mut offline = StreamLivenessRecord::live("gone".into(), now - Duration::seconds(90));
        offline.mark_offline(now);
        store.insert(offline);

        let stale = store.find_stale(now, timeout).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].stream_id.as_str(), "old");
    }

    #[tokio::test]
    async fn test_mark_offline_rejects_fresh_heartbeat() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let id = StreamId::from("agent");
        let seen = now - Duration::seconds(31);
        store.insert(StreamLivenessRecord::live(id.clone(), seen));

        store.record_heartbeat(&id, now).await.unwrap();

        assert!(store.mark_offline(&id, seen, now).await.unwrap().is_none());
        assert!(store.get(&id).await.unwrap().unwrap().is_live);
    }

    #[tokio::test]
    async fn test_mark_offline_missing_record() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let result = store.mark_offline(&"none".into(), now, now).await.unwrap();
        assert!(result.is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_set_status_round_trip() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let id = StreamId::from("agent");

        store
            .set_status(&id, StatusChange::live().with_title("Morning show"), now)
            .await
            .unwrap();
        let record = store.set_status(&id, StatusChange::offline(), now).await.unwrap();

        assert!(!record.is_live);
        assert_eq!(record.title.as_deref(), Some("Morning show"));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
