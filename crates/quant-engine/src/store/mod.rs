//! Snapshot publication backends.

mod memory;
mod redis;
mod traits;

pub use memory::InMemoryStore;
pub use self::redis::RedisStore;
pub use traits::*;

use std::sync::Arc;
use tracing::info;

/// Store type selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreType {
    /// In-memory store (dry runs, tests)
    InMemory,
    Redis,
}

impl StoreType {
    /// Parse store type from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "inmemory" | "in_memory" | "memory" => Some(StoreType::InMemory),
            "redis" => Some(StoreType::Redis),
            _ => None,
        }
    }
}

/// Build the configured store. `force_memory` overrides the configured type.
pub async fn create_store(config: &config::StoreConfig, force_memory: bool) -> StoreResult<Arc<dyn SnapshotStore>> {
    let store_type = if force_memory {
        StoreType::InMemory
    } else {
        StoreType::parse(&config.store_type)
            .ok_or_else(|| StoreError::Other(format!("unknown store type: {}", config.store_type)))?
    };

    match store_type {
        StoreType::InMemory => {
            info!("Creating in-memory store");
            Ok(Arc::new(InMemoryStore::new()))
        }
        StoreType::Redis => {
            let redis_config = config
                .redis
                .as_ref()
                .ok_or_else(|| StoreError::Other("Redis config required for Redis store".to_string()))?;
            info!("Creating Redis store");
            Ok(Arc::new(RedisStore::new(redis_config).await?))
        }
    }
}
