//! In-memory storage backend.

use std::collections::HashMap;

use async_trait::async_trait;
use enchant_core::EnchantResult;
use serde_json::Value;

use crate::traits::QueryStorage;

/// Process-local storage. Nothing survives a restart; used in tests and by
/// hosts that only want propagation.
///
/// Uses tokio::sync::RwLock for safe async access.
#[derive(Debug, Default)]
pub struct InMemoryQueryStorage {
    entries: tokio::sync::RwLock<HashMap<String, Value>>,
}

impl InMemoryQueryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-populated with `entries`.
    pub fn with_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            entries: tokio::sync::RwLock::new(
                entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            ),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.entries.read().await.contains_key(key)
    }

    /// Copy of every stored entry.
    pub async fn snapshot(&self) -> HashMap<String, Value> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl QueryStorage for InMemoryQueryStorage {
    async fn get_query(&self, key: &str) -> EnchantResult<Option<Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn save_query(&self, key: &str, value: &Value) -> EnchantResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn multi_remove(&self, keys: &[String]) -> EnchantResult<()> {
        let mut entries = self.entries.write().await;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_save_and_get() {
        let storage = InMemoryQueryStorage::new();
        assert_eq!(storage.get_query("profile").await.expect("get"), None);

        storage
            .save_query("profile", &json!({"id": 1}))
            .await
            .expect("save should succeed");
        assert_eq!(
            storage.get_query("profile").await.expect("get"),
            Some(json!({"id": 1}))
        );
    }

    #[tokio::test]
    async fn test_multi_get_keeps_request_order() {
        let storage = InMemoryQueryStorage::with_entries([("a", json!(1)), ("c", json!(3))]);
        let batch = storage
            .multi_get(&["c".to_string(), "b".to_string(), "a".to_string()])
            .await
            .expect("multi_get should succeed");
        assert_eq!(batch.values, vec![Some(json!(3)), None, Some(json!(1))]);
        assert!(!batch.has_errors());
        assert_eq!(batch.found(), 2);
    }

    #[tokio::test]
    async fn test_multi_remove_ignores_absent_keys() {
        let storage = InMemoryQueryStorage::with_entries([("a", json!(1)), ("b", json!(2))]);
        storage
            .multi_remove(&["a".to_string(), "zzz".to_string()])
            .await
            .expect("multi_remove should succeed");
        assert!(!storage.contains("a").await);
        assert!(storage.contains("b").await);
        assert_eq!(storage.len().await, 1);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let storage = InMemoryQueryStorage::new();
        storage.save_query("k", &json!(1)).await.expect("save");
        storage.save_query("k", &json!(2)).await.expect("save");
        assert_eq!(storage.snapshot().await.get("k"), Some(&json!(2)));
    }
}
