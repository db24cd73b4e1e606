//! The decorated cache and its lifecycle.
//!
//! [`EnchantedCache`] wraps a [`QueryCache`] by composition. Construction
//! validates the config, captures the wrapped cache, and starts the version
//! check in the background. [`EnchantedCache::disenchant`] hands the wrapped
//! cache back untouched.

use std::fmt;
use std::sync::{Arc, Mutex};

use enchant_core::{
    CacheError, CacheWrite, ConfigError, EnchantConfig, EnchantResult, QueryDocument,
    QueryOptions, StorageConfig,
};
use enchant_storage::{LmdbQueryStorage, QueryStorage};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::registry::SubscriptionRegistry;
use crate::traits::QueryCache;
use crate::version_gate::{GateState, VersionGate};

/// A query cache with durable persistence and cross-query propagation.
///
/// # Type Parameters
///
/// - `C`: the wrapped cache
/// - `S`: the durable storage persisted queries are saved into
///
/// # Example
///
/// ```ignore
/// let config = EnchantConfig::new(3).with_query(
///     SubscribedQuery::persist("GetProfile", "profile")
///         .with_nest(["user"])
///         .with_query_node(QueryDocument::query("GetProfile").with_field("user")),
/// );
/// let cache = EnchantedCache::enchant(Arc::new(InMemoryQueryCache::new()), config, storage)?;
///
/// cache.restore_all_queries().await?;
/// cache.write_query(QueryOptions::new(query, data))?;
///
/// let original = cache.disenchant();
/// ```
pub struct EnchantedCache<C, S>
where
    C: QueryCache + 'static,
    S: QueryStorage + 'static,
{
    pub(crate) cache: Arc<C>,
    pub(crate) storage: Arc<S>,
    pub(crate) registry: SubscriptionRegistry,
    pub(crate) gate: VersionGate,
    pub(crate) runtime: Handle,
    pub(crate) log_cache_write: bool,
    /// Detached persistence saves that may still be running.
    pub(crate) persistence: Mutex<Vec<JoinHandle<()>>>,
}

impl<C, S> EnchantedCache<C, S>
where
    C: QueryCache + 'static,
    S: QueryStorage + 'static,
{
    /// Decorate `cache`, persisting into `storage`.
    ///
    /// Returns synchronously; the version check keeps running in the
    /// background. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns a config error if the version is missing, a rule is malformed,
    /// or no runtime is available.
    pub fn enchant(cache: Arc<C>, config: EnchantConfig, storage: Arc<S>) -> EnchantResult<Self> {
        config.validate()?;
        let version = config.version()?.clone();
        let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;

        let registry = SubscriptionRegistry::new(config.subscribed_queries);
        let gate = VersionGate::spawn(&runtime, storage.clone(), version, registry.store_names());

        tracing::debug!(
            rules = registry.len(),
            log_cache_write = config.log_cache_write,
            "Cache enchanted"
        );

        Ok(Self {
            cache,
            storage,
            registry,
            gate,
            runtime,
            log_cache_write: config.log_cache_write,
            persistence: Mutex::new(Vec::new()),
        })
    }

    /// The wrapped cache. Writes made through it bypass the decorator.
    pub fn cache(&self) -> &Arc<C> {
        &self.cache
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Current state of the version check.
    pub fn gate_state(&self) -> GateState {
        self.gate.state()
    }

    /// Wait for the version check to settle and return its final state.
    pub async fn version_settled(&self) -> GateState {
        self.gate.settled().await
    }

    /// Remove the decoration and return the original cache.
    ///
    /// Persistence saves already spawned keep running to completion.
    pub fn disenchant(self) -> Arc<C> {
        tracing::debug!("Cache disenchanted");
        self.cache
    }

    /// Wait for every persistence save spawned so far.
    ///
    /// Writes never wait on persistence; hosts call this at shutdown.
    pub async fn flush_persistence(&self) {
        loop {
            let pending = match self.persistence.lock() {
                Ok(mut handles) => std::mem::take(&mut *handles),
                Err(_) => return,
            };
            if pending.is_empty() {
                return;
            }
            for handle in pending {
                if let Err(e) = handle.await {
                    tracing::warn!(error = %e, "Persistence task did not complete");
                }
            }
        }
    }

    pub(crate) fn track(&self, handle: JoinHandle<()>) {
        if let Ok(mut handles) = self.persistence.lock() {
            handles.retain(|h| !h.is_finished());
            handles.push(handle);
        }
    }
}

impl<C, S> fmt::Debug for EnchantedCache<C, S>
where
    C: QueryCache + 'static,
    S: QueryStorage + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnchantedCache")
            .field("registry", &self.registry)
            .field("gate", &self.gate.state())
            .field("log_cache_write", &self.log_cache_write)
            .finish_non_exhaustive()
    }
}

impl<C> EnchantedCache<C, LmdbQueryStorage>
where
    C: QueryCache + 'static,
{
    /// Decorate `cache`, persisting into the default LMDB storage.
    pub fn enchant_with_default_storage(
        cache: Arc<C>,
        config: EnchantConfig,
        storage_config: &StorageConfig,
    ) -> EnchantResult<Self> {
        config.validate()?;
        let storage = LmdbQueryStorage::from_config(storage_config)?;
        Self::enchant(cache, config, Arc::new(storage))
    }
}

/// Drop-in use: writes through the trait always fan out.
impl<C, S> QueryCache for EnchantedCache<C, S>
where
    C: QueryCache + 'static,
    S: QueryStorage + 'static,
{
    fn write(&self, write: &CacheWrite) -> Result<(), CacheError> {
        self.write_with(write, false)
    }

    fn read_query(
        &self,
        query: &QueryDocument,
        variables: Option<&Value>,
    ) -> Result<Value, CacheError> {
        self.cache.read_query(query, variables)
    }

    fn transform_document(&self, query: &QueryDocument) -> QueryDocument {
        self.cache.transform_document(query)
    }

    fn write_query(&self, options: QueryOptions) -> Result<(), CacheError> {
        self.write_query_with(options, false)
    }
}
