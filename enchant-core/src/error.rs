//! Error types for Enchant operations

use thiserror::Error;

/// Configuration errors. Fatal at construction time.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No enchanted cache configuration provided")]
    MissingConfig,

    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Invalid subscription rule {name:?}: {reason}")]
    InvalidRule { name: String, reason: String },

    #[error("Failed to parse configuration: {reason}")]
    ParseFailed { reason: String },

    #[error("No async runtime available to run the version check")]
    NoRuntime,
}

/// Durable storage errors. Recovered locally by the decorator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Read failed for key {key:?}: {reason}")]
    ReadFailed { key: String, reason: String },

    #[error("Write failed for key {key:?}: {reason}")]
    WriteFailed { key: String, reason: String },

    #[error("Remove failed for keys {keys:?}: {reason}")]
    RemoveFailed { keys: Vec<String>, reason: String },

    #[error("Serialization failed for key {key:?}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Storage backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Errors raised by the underlying query cache engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("No cached entry {data_id:?}")]
    MissingEntry { data_id: String },

    #[error("Can't find field {field:?} on entry {data_id:?}")]
    MissingField { data_id: String, field: String },

    #[error("Query result must be a JSON object, got {kind}")]
    NotAnObject { kind: String },

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

/// Errors raised while propagating a write into a dependent query.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PropagationError {
    #[error("Rule {name:?} has no query node to update {update_name:?}")]
    MissingQueryNode { name: String, update_name: String },

    #[error("Reading dependent query {update_name:?} failed: {source}")]
    ReadFailed {
        update_name: String,
        #[source]
        source: CacheError,
    },
}

/// Master error type for all Enchant errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnchantError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Propagation error: {0}")]
    Propagation(#[from] PropagationError),

    #[error("Version check failed: {0}")]
    VersionCheck(Box<EnchantError>),
}

/// Result type alias for Enchant operations.
pub type EnchantResult<T> = Result<T, EnchantError>;

// =============================================================================
// TESTS
// =============================================================================
