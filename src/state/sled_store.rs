use crate::error::{AppError, Result};
use crate::models::{StreamId, StreamLivenessRecord};
use crate::state::{apply_demotion, apply_heartbeat, apply_status, StatusChange, StreamLifecycleStore};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sled::Db;
use std::path::Path;
use std::sync::Arc;

/// Persistent stream store using the Sled embedded database
#[derive(Clone)]
pub struct SledStore {
    db: Arc<Db>,
    streams_tree: sled::Tree,
}

impl SledStore {
    /// Create a new Sled store at the specified path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref();
        let db = sled::open(path_str).map_err(|e| {
            AppError::Storage(format!("Failed to open Sled database: {}", e))
        })?;

        let streams_tree = db.open_tree("streams").map_err(|e| {
            AppError::Storage(format!("Failed to open streams tree: {}", e))
        })?;

        tracing::info!("Initialized Sled store at {:?}", path_str);

        Ok(Self {
            db: Arc::new(db),
            streams_tree,
        })
    }

    fn serialize_record(record: &StreamLivenessRecord) -> Result<Vec<u8>> {
        bincode::serialize(record).map_err(|e| {
            AppError::Serialization(format!("Failed to serialize stream record: {}", e))
        })
    }

    fn deserialize_record(bytes: &[u8]) -> Result<StreamLivenessRecord> {
        bincode::deserialize(bytes).map_err(|e| {
            AppError::Serialization(format!("Failed to deserialize stream record: {}", e))
        })
    }

    fn stream_key(stream_id: &StreamId) -> Vec<u8> {
        stream_id.as_str().as_bytes().to_vec()
    }

    /// Read-modify-write guarded by `compare_and_swap`
    ///
    /// `f` sees the current record and returns the replacement, or `None` to
    /// leave the tree untouched. Lost races re-read and call `f` again, so the
    /// decision is always made against the value actually replaced.
    fn update_record<F>(&self, stream_id: &StreamId, mut f: F) -> Result<Option<StreamLivenessRecord>>
    where
        F: FnMut(Option<StreamLivenessRecord>) -> Option<StreamLivenessRecord>,
    {
        let key = Self::stream_key(stream_id);

        loop {
            let current = self.streams_tree.get(&key)?;
            let decoded = current
                .as_deref()
                .map(Self::deserialize_record)
                .transpose()?;

            let Some(next) = f(decoded) else {
                return Ok(None);
            };
            let bytes = Self::serialize_record(&next)?;

            match self
                .streams_tree
                .compare_and_swap(&key, current.as_deref(), Some(bytes))?
            {
                Ok(()) => return Ok(Some(next)),
                Err(_) => {
                    tracing::trace!(stream_id = %stream_id, "Concurrent write detected, retrying");
                }
            }
        }
    }

    fn updated(record: Option<StreamLivenessRecord>) -> Result<StreamLivenessRecord> {
        record.ok_or_else(|| AppError::Internal("upsert produced no record".to_string()))
    }

    /// Flush pending writes to disk
    pub async fn flush(&self) -> Result<()> {
        self.db.flush_async().await.map_err(|e| {
            AppError::Storage(format!("Failed to flush database: {}", e))
        })?;
        Ok(())
    }

    /// Get database size in bytes
    pub fn size_on_disk(&self) -> Result<u64> {
        self.db.size_on_disk().map_err(|e| {
            AppError::Storage(format!("Failed to get database size: {}", e))
        })
    }
}

#[async_trait]
impl StreamLifecycleStore for SledStore {
    async fn find_stale(
        &self,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<Vec<StreamLivenessRecord>> {
        let mut stale = Vec::new();
        for item in self.streams_tree.iter() {
            let (_, bytes) = item?;
            let record = Self::deserialize_record(&bytes)?;
            if record.should_demote(now, timeout) {
                stale.push(record);
            }
        }
        Ok(stale)
    }

    async fn mark_offline(
        &self,
        stream_id: &StreamId,
        expected_last_heartbeat_at: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<Option<StreamLivenessRecord>> {
        let demoted = self.update_record(stream_id, |current| {
            apply_demotion(current.as_ref(), expected_last_heartbeat_at, at)
        })?;

        if demoted.is_some() {
            self.streams_tree.flush_async().await?;
            tracing::debug!(stream_id = %stream_id, "Stream marked offline in Sled");
        }
        Ok(demoted)
    }

    async fn record_heartbeat(
        &self,
        stream_id: &StreamId,
        at: DateTime<Utc>,
    ) -> Result<StreamLivenessRecord> {
        let record = self.update_record(stream_id, |current| {
            Some(apply_heartbeat(current, stream_id, at))
        })?;
        Self::updated(record)
    }

    async fn set_status(
        &self,
        stream_id: &StreamId,
        update: StatusChange,
        at: DateTime<Utc>,
    ) -> Result<StreamLivenessRecord> {
        let record = self.update_record(stream_id, |current| {
            Some(apply_status(current, stream_id, &update, at))
        })?;
        self.streams_tree.flush_async().await?;

        tracing::debug!(stream_id = %stream_id, is_live = update.is_live, "Stream status saved to Sled");
        Self::updated(record)
    }

    async fn get(&self, stream_id: &StreamId) -> Result<Option<StreamLivenessRecord>> {
        match self.streams_tree.get(Self::stream_key(stream_id))? {
            Some(bytes) => Ok(Some(Self::deserialize_record(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<StreamLivenessRecord>> {
        self.streams_tree
            .iter()
            .map(|item| {
                let (_, bytes) = item?;
                Self::deserialize_record(&bytes)
            })
            .collect()
    }

    async fn ping(&self) -> Result<()> {
        self.streams_tree.first()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (SledStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SledStore::new(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_heartbeat_and_get() {
        let (store, _temp_dir) = create_test_store();
        let id = StreamId::from("agent");
        let now = Utc::now();

        store.record_heartbeat(&id, now).await.unwrap();

        let retrieved = store.get(&id).await.unwrap().unwrap();
        assert!(retrieved.is_live);
        assert_eq!(retrieved.last_heartbeat_at, now);
    }

    #[tokio::test]
    async fn test_conditional_demotion() {
        let (store, _temp_dir) = create_test_store();
        let id = StreamId::from("agent");
        let now = Utc::now();
        let seen = now - Duration::seconds(31);
        store.record_heartbeat(&id, seen).await.unwrap();

        let stale = store.find_stale(now, Duration::seconds(30)).await.unwrap();
        assert_eq!(stale.len(), 1);

        let demoted = store.mark_offline(&id, seen, now).await.unwrap().unwrap();
        assert!(!demoted.is_live);
        assert!(store.mark_offline(&id, seen, now).await.unwrap().is_none());
        assert!(store.find_stale(now, Duration::seconds(30)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_demotion_loses_to_fresh_heartbeat() {
        let (store, _temp_dir) = create_test_store();
        let id = StreamId::from("agent");
        let now = Utc::now();
        let seen = now - Duration::seconds(31);
        store.record_heartbeat(&id, seen).await.unwrap();

        store.record_heartbeat(&id, now).await.unwrap();

        assert!(store.mark_offline(&id, seen, now).await.unwrap().is_none());
        assert!(store.get(&id).await.unwrap().unwrap().is_live);
    }

    #[tokio::test]
    async fn test_list_is_ordered() {
        let (store, _temp_dir) = create_test_store();
        let now = Utc::now();
        for id in ["c", "a", "b"] {
            store.record_heartbeat(&StreamId::from(id), now).await.unwrap();
        }

        let ids: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.stream_id.to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_persistence_across_reopens() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().to_path_buf();
        let id = StreamId::from("agent");

        {
            let store = SledStore::new(&path).unwrap();
            store
                .set_status(&id, StatusChange::live().with_title("Late night"), Utc::now())
                .await
                .unwrap();
            store.flush().await.unwrap();
        }

        {
            let store = SledStore::new(&path).unwrap();
            let records = store.list().await.unwrap();
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].title.as_deref(), Some("Late night"));
            assert!(store.size_on_disk().unwrap() > 0);
        }
    }
}
