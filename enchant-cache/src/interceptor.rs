//! Write interception: the fan-out that runs after every decorated write.

use enchant_core::{
    CacheError, CacheWrite, EnchantResult, PersistRule, PropagateRule, PropagationError,
    QueryOptions, SubscribedQuery, SubscriptionMode, ROOT_QUERY,
};
use enchant_storage::QueryStorage;

use crate::enchanted::EnchantedCache;
use crate::traits::QueryCache;

impl<C, S> EnchantedCache<C, S>
where
    C: QueryCache + 'static,
    S: QueryStorage + 'static,
{
    /// Write through the wrapped cache, then fan out unless `ignore` is set.
    ///
    /// The wrapped cache's own error is the only error returned. Persistence
    /// runs detached; propagation completes before this returns. Failures of
    /// either are logged and swallowed.
    pub fn write_with(&self, write: &CacheWrite, ignore: bool) -> Result<(), CacheError> {
        self.cache.write(write)?;

        if self.log_cache_write {
            tracing::info!(
                data_id = %write.data_id,
                query = ?write.query.canonical_name(),
                ignore,
                "Cache write"
            );
        }

        if ignore {
            return Ok(());
        }
        let Some(name) = write.query.canonical_name() else {
            return Ok(());
        };

        for rule in self.registry.matching(name) {
            match rule.mode() {
                SubscriptionMode::Persist(persist) => self.persist(rule, persist, write),
                SubscriptionMode::Propagate(propagate) => {
                    if let Err(e) = self.propagate(rule, propagate, write) {
                        tracing::warn!(
                            error = %e,
                            query = %name,
                            update_name = %propagate.update_name,
                            "Propagation failed"
                        );
                    }
                }
                SubscriptionMode::Inert => {}
            }
        }

        Ok(())
    }

    /// `write_query` into [`ROOT_QUERY`] with an explicit `ignore` flag.
    pub fn write_query_with(&self, options: QueryOptions, ignore: bool) -> Result<(), CacheError> {
        let write = CacheWrite {
            data_id: ROOT_QUERY.to_string(),
            query: self.cache.transform_document(&options.query),
            result: options.data,
            variables: options.variables,
        };
        self.write_with(&write, ignore)
    }

    fn persist(&self, rule: &SubscribedQuery, persist: &PersistRule, write: &CacheWrite) {
        let value = persist.extraction.extract(&write.result);
        let storage = self.storage.clone();
        let store_name = persist.store_name.clone();
        let query = rule.name().to_string();

        let handle = self.runtime.spawn(async move {
            match storage.save_query(&store_name, &value).await {
                Ok(()) => tracing::debug!(store_name = %store_name, query = %query, "Query persisted"),
                Err(e) => tracing::warn!(
                    error = %e,
                    store_name = %store_name,
                    query = %query,
                    "Persisting query failed"
                ),
            }
        });
        self.track(handle);
    }

    fn propagate(
        &self,
        rule: &SubscribedQuery,
        propagate: &PropagateRule,
        write: &CacheWrite,
    ) -> EnchantResult<()> {
        let node = rule
            .query_node()
            .ok_or_else(|| PropagationError::MissingQueryNode {
                name: rule.name().to_string(),
                update_name: propagate.update_name.clone(),
            })?;

        let previous =
            self.cache
                .read_query(node, None)
                .map_err(|source| PropagationError::ReadFailed {
                    update_name: propagate.update_name.clone(),
                    source,
                })?;

        let merged = propagate.merge.merge(&write.result, &previous);
        self.write_query_with(QueryOptions::new(node.clone(), merged), true)?;

        tracing::debug!(
            query = %rule.name(),
            update_name = %propagate.update_name,
            "Query propagated"
        );
        Ok(())
    }
}
