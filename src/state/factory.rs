use crate::config::{StateBackend, StateConfig};
use crate::error::{AppError, Result};
use crate::state::{InMemoryStore, RedisStore, SledStore, StreamLifecycleStore};
use std::sync::Arc;

/// Create a stream store based on configuration
pub async fn create_store(config: &StateConfig) -> Result<Arc<dyn StreamLifecycleStore>> {
    match config.backend {
        StateBackend::Memory => Ok(create_in_memory_store()),

        StateBackend::Sled => {
            let path = config.path.as_ref().ok_or_else(|| {
                AppError::Configuration("Sled backend requires 'path' configuration".to_string())
            })?;

            tracing::info!(path = ?path, "Initializing Sled storage backend");

            let store = SledStore::new(path)?;
            Ok(Arc::new(store))
        }

        StateBackend::Redis => {
            let redis_url = config.redis_url.as_ref().ok_or_else(|| {
                AppError::Configuration("Redis backend requires 'redis_url' configuration".to_string())
            })?;

            tracing::info!(url = %redis_url, prefix = %config.key_prefix, "Initializing Redis storage backend");

            let store = RedisStore::new_with_prefix(redis_url, &config.key_prefix).await?;
            Ok(Arc::new(store))
        }
    }
}

/// Create an in-memory store (for testing and development)
pub fn create_in_memory_store() -> Arc<dyn StreamLifecycleStore> {
    tracing::info!("Initializing in-memory storage backend");
    Arc::new(InMemoryStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_sled_store() {
        let temp_dir = TempDir::new().unwrap();
        let config = StateConfig {
            backend: StateBackend::Sled,
            path: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };

        let store = create_store(&config).await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_in_memory_store() {
        let store = create_store(&StateConfig::default()).await.unwrap();
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_sled_requires_path() {
        let config = StateConfig {
            backend: StateBackend::Sled,
            path: None,
            ..Default::default()
        };

        assert!(create_store(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_redis_requires_url() {
        let config = StateConfig {
            backend: StateBackend::Redis,
            redis_url: None,
            ..Default::default()
        };

        assert!(create_store(&config).await.is_err());
    }
}
