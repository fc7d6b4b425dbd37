//! Redis store implementation

use async_trait::async_trait;
use redis::AsyncCommands;
use std::sync::Arc;
use tracing::info;

use crate::store::traits::{SnapshotStore, StoreError, StoreResult};
use config::RedisConfig;

/// Publishes snapshots with plain `SET`, readable by any Redis client.
pub struct RedisStore {
    redis: Arc<tokio::sync::Mutex<redis::aio::ConnectionManager>>,
}

impl RedisStore {
    pub async fn new(config: &RedisConfig) -> StoreResult<Self> {
        let connection_string = if config.password.is_empty() {
            format!("redis://{}:{}/{}", config.host, config.port, config.db_index)
        } else {
            format!(
                "redis://:{}@{}:{}/{}",
                config.password, config.host, config.port, config.db_index
            )
        };

        info!(host = %config.host, port = config.port, db = config.db_index, "Connecting to Redis");

        let client = redis::Client::open(connection_string.as_str())
            .map_err(|e| StoreError::RedisError(e.to_string()))?;

        let connection_manager = client
            .get_connection_manager()
            .await
            .map_err(|e| StoreError::RedisError(e.to_string()))?;

        Ok(Self {
            redis: Arc::new(tokio::sync::Mutex::new(connection_manager)),
        })
    }
}

#[async_trait]
impl SnapshotStore for RedisStore {
    async fn publish(&self, key: &str, payload: String) -> StoreResult<()> {
        let mut redis = self.redis.lock().await;
        redis
            .set::<_, _, ()>(key, payload)
            .await
            .map_err(|e| StoreError::RedisError(e.to_string()))
    }

    async fn fetch(&self, key: &str) -> StoreResult<Option<String>> {
        let mut redis = self.redis.lock().await;
        redis
            .get(key)
            .await
            .map_err(|e| StoreError::RedisError(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
