use crate::error::{AppError, Result};
use crate::models::{StreamId, StreamLivenessRecord};
use crate::state::{apply_heartbeat, apply_status, StatusChange, StreamLifecycleStore};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use lazy_static::lazy_static;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};

lazy_static! {
    /// Demote a record only while it is live and its heartbeat is unchanged.
    /// Returns the encoded record, or nil when the guard rejects the write.
    static ref MARK_OFFLINE_SCRIPT: Script = Script::new(
        r#"
        local raw = redis.call('GET', KEYS[1])
        if not raw then
            return false
        end
        local record = cjson.decode(raw)
        if record['is_live'] ~= true or record['last_heartbeat_at'] ~= ARGV[1] then
            return false
        end
        record['is_live'] = false
        record['updated_at'] = ARGV[2]
        local encoded = cjson.encode(record)
        redis.call('SET', KEYS[1], encoded)
        return encoded
        "#,
    );

    /// Replace the value only if it still equals ARGV[1] ('' means absent)
    static ref COMPARE_AND_SET_SCRIPT: Script = Script::new(
        r#"
        local current = redis.call('GET', KEYS[1])
        if (current or '') ~= ARGV[1] then
            return 0
        end
        redis.call('SET', KEYS[1], ARGV[2])
        redis.call('SADD', KEYS[2], ARGV[3])
        return 1
        "#,
    );
}

/// Redis-backed stream store
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    key_prefix: String,
}

impl RedisStore {
    /// Create a new Redis store
    pub async fn new(redis_url: &str) -> Result<Self> {
        Self::new_with_prefix(redis_url, "avatar-hub").await
    }

    /// Create a new Redis store with custom key prefix
    pub async fn new_with_prefix(redis_url: &str, prefix: &str) -> Result<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            AppError::Configuration(format!("Failed to create Redis client: {}", e))
        })?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to connect to Redis: {}", e)))?;

        // Test connection
        let mut test_conn = connection.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut test_conn)
            .await
            .map_err(|e| AppError::Storage(format!("Redis connection test failed: {}", e)))?;

        tracing::info!("Initialized Redis store with prefix '{}'", prefix);

        Ok(Self {
            connection,
            key_prefix: prefix.to_string(),
        })
    }

    fn stream_key(&self, stream_id: &StreamId) -> String {
        format!("{}:stream:{}", self.key_prefix, stream_id)
    }

    /// Set of every known stream id
    fn streams_set_key(&self) -> String {
        format!("{}:streams", self.key_prefix)
    }

    fn serialize_record(record: &StreamLivenessRecord) -> Result<String> {
        serde_json::to_string(record).map_err(|e| {
            AppError::Serialization(format!("Failed to serialize stream record: {}", e))
        })
    }

    fn deserialize_record(json: &str) -> Result<StreamLivenessRecord> {
        serde_json::from_str(json).map_err(|e| {
            AppError::Serialization(format!("Failed to deserialize stream record: {}", e))
        })
    }

    /// A timestamp exactly as it appears inside a stored record
    fn encode_timestamp(at: DateTime<Utc>) -> Result<String> {
        match serde_json::to_value(at)? {
            serde_json::Value::String(s) => Ok(s),
            other => Err(AppError::Serialization(format!(
                "Unexpected timestamp encoding: {}",
                other
            ))),
        }
    }

    /// Load every record in one MGET
    async fn load_all(&self) -> Result<Vec<StreamLivenessRecord>> {
        let mut conn = self.connection.clone();

        let ids: Vec<String> = conn.smembers(self.streams_set_key()).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids
            .iter()
            .map(|id| self.stream_key(&StreamId::from(id.as_str())))
            .collect();
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to load stream records: {}", e)))?;

        let mut records = values
            .into_iter()
            .flatten()
            .map(|json| Self::deserialize_record(&json))
            .collect::<Result<Vec<_>>>()?;
        records.sort_by(|a, b| a.stream_id.cmp(&b.stream_id));
        Ok(records)
    }

    /// Read-modify-write guarded by the compare-and-set script
    async fn update_record<F>(&self, stream_id: &StreamId, f: F) -> Result<StreamLivenessRecord>
    where
        F: Fn(Option<StreamLivenessRecord>) -> StreamLivenessRecord + Send,
    {
        let mut conn = self.connection.clone();
        let key = self.stream_key(stream_id);

        loop {
            let current: Option<String> = conn.get(&key).await?;
            let decoded = current
                .as_deref()
                .map(Self::deserialize_record)
                .transpose()?;

            let next = f(decoded);
            let encoded = Self::serialize_record(&next)?;

            let swapped: i64 = COMPARE_AND_SET_SCRIPT
                .key(&key)
                .key(self.streams_set_key())
                .arg(current.as_deref().unwrap_or(""))
                .arg(&encoded)
                .arg(stream_id.as_str())
                .invoke_async(&mut conn)
                .await?;

            if swapped == 1 {
                return Ok(next);
            }
            tracing::trace!(stream_id = %stream_id, "Concurrent write detected, retrying");
        }
    }
}

#[async_trait]
impl StreamLifecycleStore for RedisStore {
    async fn find_stale(
        &self,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<Vec<StreamLivenessRecord>> {
        Ok(self
            .load_all()
            .await?
            .into_iter()
            .filter(|record| record.should_demote(now, timeout))
            .collect())
    }

    async fn mark_offline(
        &self,
        stream_id: &StreamId,
        expected_last_heartbeat_at: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<Option<StreamLivenessRecord>> {
        let mut conn = self.connection.clone();

        let encoded: Option<String> = MARK_OFFLINE_SCRIPT
            .key(self.stream_key(stream_id))
            .arg(Self::encode_timestamp(expected_last_heartbeat_at)?)
            .arg(Self::encode_timestamp(at)?)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to mark stream offline: {}", e)))?;

        match encoded {
            Some(json) => {
                tracing::debug!(stream_id = %stream_id, "Stream marked offline in Redis");
                Ok(Some(Self::deserialize_record(&json)?))
            }
            None => Ok(None),
        }
    }

    async fn record_heartbeat(
        &self,
        stream_id: &StreamId,
        at: DateTime<Utc>,
    ) -> Result<StreamLivenessRecord> {
        self.update_record(stream_id, |current| apply_heartbeat(current, stream_id, at))
            .await
    }

    async fn set_status(
        &self,
        stream_id: &StreamId,
        update: StatusChange,
        at: DateTime<Utc>,
    ) -> Result<StreamLivenessRecord> {
        let record = self
            .update_record(stream_id, |current| apply_status(current, stream_id, &update, at))
            .await?;

        tracing::debug!(stream_id = %stream_id, is_live = record.is_live, "Stream status saved to Redis");
        Ok(record)
    }

    async fn get(&self, stream_id: &StreamId) -> Result<Option<StreamLivenessRecord>> {
        let mut conn = self.connection.clone();
        let json: Option<String> = conn.get(self.stream_key(stream_id)).await?;
        json.as_deref().map(Self::deserialize_record).transpose()
    }

    async fn list(&self) -> Result<Vec<StreamLivenessRecord>> {
        self.load_all().await
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| AppError::Storage(format!("Redis ping failed: {}", e)))?;
        Ok(())
    }
}
