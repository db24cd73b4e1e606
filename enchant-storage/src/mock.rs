//! Mock storage with fault injection and an operation log.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use enchant_core::{EnchantResult, StorageError};
use serde_json::Value;
use tokio::sync::watch;

use crate::memory::InMemoryQueryStorage;
use crate::traits::{MultiGet, QueryStorage};

/// A storage operation as observed by [`MockQueryStorage`].
#[derive(Debug, Clone, PartialEq)]
pub enum StorageOp {
    Get(String),
    Save(String, Value),
    MultiGet(Vec<String>),
    MultiRemove(Vec<String>),
}

/// In-memory storage that can be told to fail or stall.
///
/// - keys marked with [`fail_key`](Self::fail_key) fail on read and write
/// - [`fail_writes`](Self::fail_writes) fails every save and removal
/// - [`hold_reads`](Self::hold_reads) parks `get_query` until
///   [`release_reads`](Self::release_reads), which keeps a version check pending
#[derive(Debug)]
pub struct MockQueryStorage {
    inner: InMemoryQueryStorage,
    failing_keys: Mutex<HashSet<String>>,
    fail_writes: AtomicBool,
    fail_batches: AtomicBool,
    reads_held: watch::Sender<bool>,
    ops: Mutex<Vec<StorageOp>>,
}

impl Default for MockQueryStorage {
    fn default() -> Self {
        Self {
            inner: InMemoryQueryStorage::new(),
            failing_keys: Mutex::new(HashSet::new()),
            fail_writes: AtomicBool::new(false),
            fail_batches: AtomicBool::new(false),
            reads_held: watch::Sender::new(false),
            ops: Mutex::new(Vec::new()),
        }
    }
}

impl MockQueryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock pre-populated with `entries`. Seeding is not logged.
    pub fn with_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            inner: InMemoryQueryStorage::with_entries(entries),
            ..Default::default()
        }
    }

    pub fn fail_key(&self, key: impl Into<String>) {
        if let Ok(mut keys) = self.failing_keys.lock() {
            keys.insert(key.into());
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make `multi_get` fail as a whole instead of per key.
    pub fn fail_batches(&self, fail: bool) {
        self.fail_batches.store(fail, Ordering::SeqCst);
    }

    pub fn hold_reads(&self) {
        self.reads_held.send_replace(true);
    }

    pub fn release_reads(&self) {
        self.reads_held.send_replace(false);
    }

    /// Every operation issued so far, in call order.
    pub fn ops(&self) -> Vec<StorageOp> {
        self.ops.lock().map(|ops| ops.clone()).unwrap_or_default()
    }

    /// Operations that mutate storage.
    pub fn mutations(&self) -> Vec<StorageOp> {
        self.ops()
            .into_iter()
            .filter(|op| matches!(op, StorageOp::Save(..) | StorageOp::MultiRemove(_)))
            .collect()
    }

    pub fn clear_ops(&self) {
        if let Ok(mut ops) = self.ops.lock() {
            ops.clear();
        }
    }

    /// Direct read that bypasses faults and the log.
    pub async fn peek(&self, key: &str) -> Option<Value> {
        self.inner.snapshot().await.get(key).cloned()
    }

    fn record(&self, op: StorageOp) {
        if let Ok(mut ops) = self.ops.lock() {
            ops.push(op);
        }
    }

    fn key_fails(&self, key: &str) -> bool {
        self.failing_keys
            .lock()
            .map(|keys| keys.contains(key))
            .unwrap_or(false)
    }
}

#[async_trait]
impl QueryStorage for MockQueryStorage {
    async fn get_query(&self, key: &str) -> EnchantResult<Option<Value>> {
        self.record(StorageOp::Get(key.to_string()));

        let mut held = self.reads_held.subscribe();
        // Sender lives in self, so the channel cannot close while we wait.
        let _ = held.wait_for(|held| !*held).await;

        if self.key_fails(key) {
            return Err(StorageError::ReadFailed {
                key: key.to_string(),
                reason: "injected read failure".to_string(),
            }
            .into());
        }
        self.inner.get_query(key).await
    }

    async fn save_query(&self, key: &str, value: &Value) -> EnchantResult<()> {
        self.record(StorageOp::Save(key.to_string(), value.clone()));

        if self.fail_writes.load(Ordering::SeqCst) || self.key_fails(key) {
            return Err(StorageError::WriteFailed {
                key: key.to_string(),
                reason: "injected write failure".to_string(),
            }
            .into());
        }
        self.inner.save_query(key, value).await
    }

    async fn multi_get(&self, keys: &[String]) -> EnchantResult<MultiGet> {
        self.record(StorageOp::MultiGet(keys.to_vec()));

        if self.fail_batches.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable {
                reason: "injected batch failure".to_string(),
            }
            .into());
        }

        let snapshot = self.inner.snapshot().await;
        let mut batch = MultiGet::default();
        for key in keys {
            if self.key_fails(key) {
                batch.values.push(None);
                batch.errors.push(StorageError::ReadFailed {
                    key: key.clone(),
                    reason: "injected read failure".to_string(),
                });
            } else {
                batch.values.push(snapshot.get(key).cloned());
            }
        }
        Ok(batch)
    }

    async fn multi_remove(&self, keys: &[String]) -> EnchantResult<()> {
        self.record(StorageOp::MultiRemove(keys.to_vec()));

        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::RemoveFailed {
                keys: keys.to_vec(),
                reason: "injected remove failure".to_string(),
            }
            .into());
        }
        self.inner.multi_remove(keys).await
    }
}
