//! LMDB-backed query storage.
//!
//! Uses the heed crate (Rust bindings for LMDB) to persist query values in a
//! memory-mapped key-value store. This is the default backend for hosts that
//! do not inject their own storage.
//!
//! # Value Format
//!
//! `[saved_at millis: 8 bytes LE][json value]`
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The backend uses:
//! - Read transactions for `get_query`, `multi_get` and `saved_at`
//! - Write transactions for `save_query` and `multi_remove`

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use enchant_core::{EnchantResult, StorageConfig, StorageError};
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions, RoTxn};
use serde_json::Value;

use crate::traits::{MultiGet, QueryStorage};

const TIMESTAMP_LEN: usize = 8;

/// Error type for LMDB storage operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStorageError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convert LmdbStorageError to EnchantError.
impl From<LmdbStorageError> for enchant_core::EnchantError {
    fn from(e: LmdbStorageError) -> Self {
        enchant_core::EnchantError::Storage(StorageError::Unavailable {
            reason: e.to_string(),
        })
    }
}

/// LMDB-backed query storage.
///
/// # Example
///
/// ```ignore
/// use enchant_storage::{LmdbQueryStorage, QueryStorage};
///
/// let storage = LmdbQueryStorage::new("/tmp/enchant", 16)?;
/// storage.save_query("profile", &serde_json::json!({"id": 1})).await?;
/// let profile = storage.get_query("profile").await?;
/// ```
pub struct LmdbQueryStorage {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Str, Bytes>,
}

impl LmdbQueryStorage {
    /// Open (or create) an LMDB storage.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStorageError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStorageError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbStorageError::Transaction(e.to_string()))?;

        let db: Database<Str, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbStorageError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStorageError::Transaction(e.to_string()))?;

        Ok(Self { env, db })
    }

    /// Open the storage described by `config`.
    pub fn from_config(config: &StorageConfig) -> EnchantResult<Self> {
        config.validate()?;
        Ok(Self::new(&config.path, config.max_size_mb)?)
    }

    /// When `key` was last saved, or `None` if it is absent.
    pub fn saved_at(&self, key: &str) -> EnchantResult<Option<DateTime<Utc>>> {
        let rtxn = self.read_txn()?;
        match self.db.get(&rtxn, key) {
            Ok(Some(bytes)) => Ok(Some(decode(key, bytes)?.0)),
            Ok(None) => Ok(None),
            Err(e) => Err(read_failed(key, e)),
        }
    }

    fn read_txn(&self) -> Result<RoTxn<'_>, LmdbStorageError> {
        self.env
            .read_txn()
            .map_err(|e| LmdbStorageError::Transaction(e.to_string()))
    }

    fn read_one(&self, rtxn: &RoTxn<'_>, key: &str) -> EnchantResult<Option<Value>> {
        match self.db.get(rtxn, key) {
            Ok(Some(bytes)) => Ok(Some(decode(key, bytes)?.1)),
            Ok(None) => Ok(None),
            Err(e) => Err(read_failed(key, e)),
        }
    }
}

fn encode(key: &str, value: &Value, saved_at: DateTime<Utc>) -> Result<Vec<u8>, StorageError> {
    let value_bytes = serde_json::to_vec(value).map_err(|e| StorageError::Serialization {
        key: key.to_string(),
        reason: e.to_string(),
    })?;

    let mut full_bytes = Vec::with_capacity(TIMESTAMP_LEN + value_bytes.len());
    full_bytes.extend_from_slice(&saved_at.timestamp_millis().to_le_bytes());
    full_bytes.extend_from_slice(&value_bytes);
    Ok(full_bytes)
}

fn decode(key: &str, bytes: &[u8]) -> Result<(DateTime<Utc>, Value), StorageError> {
    let corrupt = |reason: String| StorageError::Serialization {
        key: key.to_string(),
        reason,
    };

    if bytes.len() < TIMESTAMP_LEN {
        return Err(corrupt(format!("entry too short: {} bytes", bytes.len())));
    }

    let timestamp_bytes: [u8; TIMESTAMP_LEN] = bytes[0..TIMESTAMP_LEN]
        .try_into()
        .map_err(|_| corrupt("invalid timestamp".to_string()))?;
    let saved_at = DateTime::from_timestamp_millis(i64::from_le_bytes(timestamp_bytes))
        .ok_or_else(|| corrupt("timestamp out of range".to_string()))?;

    let value = serde_json::from_slice(&bytes[TIMESTAMP_LEN..]).map_err(|e| corrupt(e.to_string()))?;
    Ok((saved_at, value))
}

fn read_failed(key: &str, e: heed::Error) -> enchant_core::EnchantError {
    StorageError::ReadFailed {
        key: key.to_string(),
        reason: e.to_string(),
    }
    .into()
}

#[async_trait]
impl QueryStorage for LmdbQueryStorage {
    async fn get_query(&self, key: &str) -> EnchantResult<Option<Value>> {
        let rtxn = self.read_txn()?;
        self.read_one(&rtxn, key)
    }

    async fn save_query(&self, key: &str, value: &Value) -> EnchantResult<()> {
        let full_bytes = encode(key, value, Utc::now())?;
        let write_failed = |e: heed::Error| StorageError::WriteFailed {
            key: key.to_string(),
            reason: e.to_string(),
        };

        let mut wtxn = self.env.write_txn().map_err(write_failed)?;
        self.db
            .put(&mut wtxn, key, &full_bytes)
            .map_err(write_failed)?;
        wtxn.commit().map_err(write_failed)?;

        Ok(())
    }

    async fn multi_get(&self, keys: &[String]) -> EnchantResult<MultiGet> {
        let rtxn = self.read_txn()?;

        let mut batch = MultiGet {
            values: Vec::with_capacity(keys.len()),
            errors: Vec::new(),
        };
        for key in keys {
            match self.read_one(&rtxn, key) {
                Ok(value) => batch.values.push(value),
                Err(enchant_core::EnchantError::Storage(e)) => {
                    batch.values.push(None);
                    batch.errors.push(e);
                }
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

    async fn multi_remove(&self, keys: &[String]) -> EnchantResult<()> {
        let remove_failed = |e: heed::Error| StorageError::RemoveFailed {
            keys: keys.to_vec(),
            reason: e.to_string(),
        };

        let mut wtxn = self.env.write_txn().map_err(remove_failed)?;

        let mut deleted = 0u64;
        for key in keys {
            if self.db.delete(&mut wtxn, key).map_err(remove_failed)? {
                deleted += 1;
            }
        }

        wtxn.commit().map_err(remove_failed)?;

        tracing::debug!(requested = keys.len(), deleted, "Removed persisted queries");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_storage() -> (LmdbQueryStorage, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let storage =
            LmdbQueryStorage::new(temp_dir.path(), 10).expect("storage creation should succeed");
        (storage, temp_dir)
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let (storage, _temp_dir) = create_test_storage();

        storage
            .save_query("profile", &json!({"id": 1, "name": "Ada"}))
            .await
            .expect("save should succeed");

        let value = storage.get_query("profile").await.expect("get should succeed");
        assert_eq!(value, Some(json!({"id": 1, "name": "Ada"})));
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let (storage, _temp_dir) = create_test_storage();
        let value = storage.get_query("missing").await.expect("get should succeed");
        assert!(value.is_none());
        assert!(storage.saved_at("missing").expect("saved_at").is_none());
    }

    #[tokio::test]
    async fn test_overwrite() {
        let (storage, _temp_dir) = create_test_storage();

        storage.save_query("k", &json!("first")).await.expect("save");
        storage.save_query("k", &json!("second")).await.expect("save");

        assert_eq!(
            storage.get_query("k").await.expect("get"),
            Some(json!("second"))
        );
    }

    #[tokio::test]
    async fn test_saved_at_is_recent() {
        let (storage, _temp_dir) = create_test_storage();
        let before = Utc::now();

        storage.save_query("k", &json!(1)).await.expect("save");

        let saved_at = storage
            .saved_at("k")
            .expect("saved_at should succeed")
            .expect("entry should exist");
        // Millisecond precision
        assert!((saved_at - before).num_seconds().abs() < 1);
    }

    #[tokio::test]
    async fn test_multi_get_and_remove() {
        let (storage, _temp_dir) = create_test_storage();

        storage.save_query("a", &json!(1)).await.expect("save");
        storage.save_query("b", &json!(2)).await.expect("save");

        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let batch = storage.multi_get(&keys).await.expect("multi_get");
        assert_eq!(batch.values, vec![Some(json!(1)), Some(json!(2)), None]);
        assert!(!batch.has_errors());

        storage
            .multi_remove(&["a".to_string(), "c".to_string()])
            .await
            .expect("multi_remove should succeed");

        let batch = storage.multi_get(&keys).await.expect("multi_get");
        assert_eq!(batch.values, vec![None, Some(json!(2)), None]);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        {
            let storage = LmdbQueryStorage::new(temp_dir.path(), 10).expect("open");
            storage.save_query("k", &json!({"kept": true})).await.expect("save");
        }
        let storage = LmdbQueryStorage::new(temp_dir.path(), 10).expect("reopen");
        assert_eq!(
            storage.get_query("k").await.expect("get"),
            Some(json!({"kept": true}))
        );
    }

    #[test]
    fn test_decode_rejects_short_entry() {
        let err = decode("k", &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, StorageError::Serialization { .. }));
    }

    #[test]
    fn test_from_config_rejects_zero_size() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let config = StorageConfig::new(temp_dir.path()).with_max_size_mb(0);
        assert!(LmdbQueryStorage::from_config(&config).is_err());
    }
}
