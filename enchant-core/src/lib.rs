//! Enchant Core - Data Types
//!
//! Query documents, subscription rules, version tokens, configuration and
//! the error taxonomy shared by the storage backends and the cache decorator.
//! This crate contains no I/O beyond reading config files.

pub mod config;
pub mod error;
pub mod nest;
pub mod query;
pub mod subscription;
pub mod version;

pub use config::{EnchantConfig, StorageConfig};
pub use error::{
    CacheError, ConfigError, EnchantError, EnchantResult, PropagationError, StorageError,
};
pub use nest::{nest_by_path, project_field};
pub use query::{CacheWrite, OperationKind, QueryDocument, QueryOptions, ROOT_QUERY};
pub use subscription::{
    Extraction, Merge, PersistRule, PropagateRule, Retriever, RuleSpec, SubscribedQuery,
    SubscriptionMode, Updater,
};
pub use version::{VersionToken, VERSION_KEY};
