//! In-memory store, used by dry runs and tests

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

use crate::store::traits::{SnapshotStore, StoreResult};

/// Non-persistent store; values live as long as the process.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    values: RwLock<HashMap<String, String>>,
    writes: RwLock<HashMap<String, u64>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of publishes seen for `key`
    pub fn write_count(&self, key: &str) -> u64 {
        self.writes.read().get(key).copied().unwrap_or(0)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl SnapshotStore for InMemoryStore {
    async fn publish(&self, key: &str, payload: String) -> StoreResult<()> {
        debug!(key, bytes = payload.len(), "Publishing to memory store");
        self.values.write().insert(key.to_string(), payload);
        *self.writes.write().entry(key.to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn fetch(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.values.read().get(key).cloned())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::publish_json;

    #[tokio::test]
    async fn test_publish_replaces_value() {
        let store = InMemoryStore::new();
        assert_eq!(store.fetch("market_data").await.unwrap(), None);

        store.publish("market_data", "{\"a\":1}".to_string()).await.unwrap();
        store.publish("market_data", "{\"a\":2}".to_string()).await.unwrap();

        assert_eq!(store.fetch("market_data").await.unwrap().as_deref(), Some("{\"a\":2}"));
        assert_eq!(store.write_count("market_data"), 2);
        assert_eq!(store.keys(), vec!["market_data".to_string()]);
    }

    #[tokio::test]
    async fn test_publish_json() {
        let store = InMemoryStore::new();
        publish_json(&store, "history:WIN$N:D1", &vec![1, 2, 3]).await.unwrap();
        assert_eq!(store.fetch("history:WIN$N:D1").await.unwrap().as_deref(), Some("[1,2,3]"));
    }
}
