//! Store traits for snapshot publication

use async_trait::async_trait;

/// Errors that can occur in the store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    RedisError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Store error: {0}")]
    Other(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Shared key-value store the snapshot is published to.
///
/// Each `publish` replaces the whole value under `key`; consumers never see
/// a partially written snapshot.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Replace the value stored under `key`
    async fn publish(&self, key: &str, payload: String) -> StoreResult<()>;

    /// Read back the value stored under `key`
    async fn fetch(&self, key: &str) -> StoreResult<Option<String>>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

/// Serialize `value` as JSON and publish it under `key`
pub async fn publish_json<T: serde::Serialize>(store: &dyn SnapshotStore, key: &str, value: &T) -> StoreResult<()> {
    let payload = serde_json::to_string(value).map_err(|e| StoreError::SerializationError(e.to_string()))?;
    store.publish(key, payload).await
}
