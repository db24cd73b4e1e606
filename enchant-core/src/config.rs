//! Configuration types

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ConfigError;
use crate::subscription::{RuleSpec, SubscribedQuery};
use crate::version::VersionToken;

/// Decorator configuration.
///
/// Rules and version are fixed for the lifetime of a decorator. Rules with
/// retriever/updater functions are built in code; file-based configs attach
/// functions after loading with [`EnchantConfig::with_retriever`] and
/// [`EnchantConfig::with_updater`].
#[derive(Debug, Clone, Default)]
pub struct EnchantConfig {
    pub subscribed_queries: Vec<SubscribedQuery>,
    /// REQUIRED. A mismatch with the stored token purges persisted queries.
    pub version: Option<VersionToken>,
    /// Reserved for migration steps between versions. Not interpreted.
    pub migrations: Vec<Value>,
    /// Log every cache write at info level.
    pub log_cache_write: bool,
}

impl EnchantConfig {
    pub fn new(version: impl Into<VersionToken>) -> Self {
        Self {
            version: Some(version.into()),
            ..Default::default()
        }
    }

    pub fn with_query(mut self, query: SubscribedQuery) -> Self {
        self.subscribed_queries.push(query);
        self
    }

    pub fn with_queries<I>(mut self, queries: I) -> Self
    where
        I: IntoIterator<Item = SubscribedQuery>,
    {
        self.subscribed_queries.extend(queries);
        self
    }

    pub fn with_log_cache_write(mut self, enabled: bool) -> Self {
        self.log_cache_write = enabled;
        self
    }

    /// Attach a retriever to every persistence rule saving under `store_name`.
    pub fn with_retriever<F>(mut self, store_name: &str, retriever: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        let retriever: crate::Retriever = Arc::new(retriever);
        for query in &mut self.subscribed_queries {
            let targets = query
                .persist_rule()
                .is_some_and(|rule| rule.store_name == store_name);
            if targets {
                query.set_retriever(retriever.clone());
            }
        }
        self
    }

    /// Attach an updater to every propagation rule updating `update_name`.
    pub fn with_updater<F>(mut self, update_name: &str, updater: F) -> Self
    where
        F: Fn(&Value, &Value) -> Value + Send + Sync + 'static,
    {
        let updater: crate::Updater = Arc::new(updater);
        for query in &mut self.subscribed_queries {
            let targets = query
                .propagate_rule()
                .is_some_and(|rule| rule.update_name == update_name);
            if targets {
                query.set_updater(updater.clone());
            }
        }
        self
    }

    /// The configured version, or the fatal error for its absence.
    pub fn version(&self) -> Result<&VersionToken, ConfigError> {
        self.version.as_ref().ok_or_else(|| ConfigError::MissingRequired {
            field: "version".to_string(),
        })
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - version is present
    /// - every rule is well formed (see [`SubscribedQuery::validate`])
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.version()?;
        for query in &self.subscribed_queries {
            query.validate()?;
        }
        Ok(())
    }

    /// Parse a TOML config.
    ///
    /// ```toml
    /// version = 3
    /// log_cache_write = true
    ///
    /// [[subscribed_queries]]
    /// name = "GetProfile"
    /// store_name = "profile"
    /// nest = ["user"]
    /// query_node = { name = "GetProfile", fields = ["user"] }
    /// ```
    ///
    /// An empty document is a missing config.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        if source.trim().is_empty() {
            return Err(ConfigError::MissingConfig);
        }

        let file: ConfigFile = toml::from_str(source).map_err(|e| ConfigError::ParseFailed {
            reason: e.to_string(),
        })?;

        let version = match file.version {
            Some(value) => Some(version_from_toml(&value)?),
            None => None,
        };

        let migrations = file
            .migrations
            .into_iter()
            .map(json_from_toml)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            subscribed_queries: file
                .subscribed_queries
                .into_iter()
                .map(SubscribedQuery::from)
                .collect(),
            version,
            migrations,
            log_cache_write: file.log_cache_write,
        })
    }

    /// Load a TOML config from disk. A missing file is a missing config.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = match std::fs::read_to_string(path.as_ref()) {
            Ok(source) => source,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::MissingConfig)
            }
            Err(e) => {
                return Err(ConfigError::ParseFailed {
                    reason: format!("{}: {}", path.as_ref().display(), e),
                })
            }
        };
        Self::from_toml_str(&source)
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    version: Option<toml::Value>,
    #[serde(default)]
    log_cache_write: bool,
    #[serde(default)]
    migrations: Vec<toml::Value>,
    #[serde(default)]
    subscribed_queries: Vec<RuleSpec>,
}

fn version_from_toml(value: &toml::Value) -> Result<VersionToken, ConfigError> {
    match value {
        toml::Value::String(s) => Ok(VersionToken::from(s.clone())),
        toml::Value::Integer(i) => Ok(VersionToken::from(*i)),
        toml::Value::Boolean(b) => Ok(VersionToken::from(*b)),
        toml::Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(VersionToken::Number)
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "version".to_string(),
                value: f.to_string(),
                reason: "version must be a finite number".to_string(),
            }),
        other => Err(ConfigError::InvalidValue {
            field: "version".to_string(),
            value: other.to_string(),
            reason: "version must be a string, number or boolean".to_string(),
        }),
    }
}

/// Migration entries are carried as JSON. Non-finite floats have no JSON form.
fn json_from_toml(value: toml::Value) -> Result<Value, ConfigError> {
    match value {
        toml::Value::String(s) => Ok(Value::String(s)),
        toml::Value::Integer(i) => Ok(Value::from(i)),
        toml::Value::Boolean(b) => Ok(Value::Bool(b)),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| ConfigError::ParseFailed {
                reason: format!("migrations: {} has no JSON representation", f),
            }),
        toml::Value::Datetime(d) => Ok(Value::String(d.to_string())),
        toml::Value::Array(items) => items
            .into_iter()
            .map(json_from_toml)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        toml::Value::Table(table) => table
            .into_iter()
            .map(|(key, value)| json_from_toml(value).map(|value| (key, value)))
            .collect::<Result<serde_json::Map<_, _>, _>>()
            .map(Value::Object),
    }
}

// ============================================================================
// STORAGE DEFAULTS
// ============================================================================

/// Settings for the default on-disk storage backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Directory holding the LMDB environment.
    pub path: PathBuf,
    /// Maximum size of the environment in megabytes.
    pub max_size_mb: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".enchant/storage"),
            max_size_mb: 64,
        }
    }
}

impl StorageConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_max_size_mb(mut self, max_size_mb: usize) -> Self {
        self.max_size_mb = max_size_mb;
        self
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `ENCHANT_STORAGE_PATH`: LMDB directory (default: `.enchant/storage`)
    /// - `ENCHANT_STORAGE_MAX_SIZE_MB`: map size in megabytes (default: 64)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            path: std::env::var("ENCHANT_STORAGE_PATH")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.path),
            max_size_mb: std::env::var("ENCHANT_STORAGE_MAX_SIZE_MB")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size_mb),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_size_mb".to_string(),
                value: self.max_size_mb.to_string(),
                reason: "max_size_mb must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
