//! Durable storage trait for persisted query values.
//!
//! Backends store JSON values under string keys. The decorator only needs
//! single reads (version token), single writes (persistence and version
//! token), bulk reads (restore) and bulk removal (invalidation).

use async_trait::async_trait;
use enchant_core::{EnchantResult, StorageError};
use serde_json::Value;

/// Outcome of a bulk read.
///
/// A failure on one key never aborts the batch: its slot in `values` is
/// `None` and the failure is reported in `errors`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiGet {
    /// One slot per requested key, in request order.
    pub values: Vec<Option<Value>>,
    /// Per-key failures.
    pub errors: Vec<StorageError>,
}

impl MultiGet {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Number of keys that returned a value.
    pub fn found(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }
}

/// Key-value backend persisted queries are saved into.
///
/// Implementations must be safe to share between the decorator and the
/// detached persistence tasks it spawns.
#[async_trait]
pub trait QueryStorage: Send + Sync {
    /// Read one key. Absent keys are `Ok(None)`.
    async fn get_query(&self, key: &str) -> EnchantResult<Option<Value>>;

    /// Write one key, replacing any previous value.
    async fn save_query(&self, key: &str, value: &Value) -> EnchantResult<()>;

    /// Read many keys, reporting per-key failures in [`MultiGet::errors`].
    ///
    /// Returns `Err` only when the backend cannot serve the batch at all.
    async fn multi_get(&self, keys: &[String]) -> EnchantResult<MultiGet> {
        let mut batch = MultiGet {
            values: Vec::with_capacity(keys.len()),
            errors: Vec::new(),
        };
        for key in keys {
            match self.get_query(key).await {
                Ok(value) => batch.values.push(value),
                Err(e) => {
                    batch.values.push(None);
                    batch.errors.push(StorageError::ReadFailed {
                        key: key.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(batch)
    }

    /// Remove many keys. Absent keys are ignored.
    async fn multi_remove(&self, keys: &[String]) -> EnchantResult<()>;
}
