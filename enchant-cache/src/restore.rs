//! Rehydrating persisted queries back into the cache.

use enchant_core::{nest_by_path, EnchantError, EnchantResult, QueryOptions, StorageError};
use enchant_storage::QueryStorage;

use crate::enchanted::EnchantedCache;
use crate::traits::QueryCache;
use crate::version_gate::GateState;

/// Outcome of one restore pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoreReport {
    /// Store names written back into the cache, in registry order.
    pub restored: Vec<String>,
    /// Store names with no stored value, a failed read, or no query node.
    pub skipped: Vec<String>,
    /// Per-key read failures and failed cache writes.
    pub errors: Vec<EnchantError>,
}

impl RestoreReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

impl<C, S> EnchantedCache<C, S>
where
    C: QueryCache + 'static,
    S: QueryStorage + 'static,
{
    /// Write every persisted query back into the cache.
    ///
    /// Waits for the version check first if it is still running. Restored
    /// writes never re-persist or re-propagate.
    ///
    /// # Errors
    ///
    /// Returns [`EnchantError::VersionCheck`] if this call waited on the
    /// version check and it failed; storage is not read in that case. A check
    /// that had already failed before the call does not block the restore.
    /// Failures of individual keys are collected in the report instead.
    pub async fn restore_all_queries(&self) -> EnchantResult<RestoreReport> {
        let state = match self.gate.state() {
            GateState::Pending => {
                tracing::debug!("Restore waiting for version check");
                match self.gate.settled().await {
                    GateState::Rejected(e) => return Err(EnchantError::VersionCheck(Box::new(e))),
                    settled => settled,
                }
            }
            settled => settled,
        };

        if let GateState::Rejected(e) = &state {
            tracing::warn!(error = %e, "Version check failed earlier, restoring anyway");
        }
        Ok(self.restore_from_storage().await)
    }

    /// One restore pass, regardless of the version check.
    pub async fn restore_from_storage(&self) -> RestoreReport {
        let mut report = RestoreReport::default();
        let store_names = self.registry.store_names();
        if store_names.is_empty() {
            return report;
        }

        let batch = match self.storage.multi_get(&store_names).await {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(error = %e, keys = store_names.len(), "Restore read failed");
                report.skipped = store_names;
                report.errors.push(e);
                return report;
            }
        };
        report
            .errors
            .extend(batch.errors.into_iter().map(EnchantError::from));

        let returned = batch.values.len();
        if returned != store_names.len() {
            tracing::warn!(
                keys = store_names.len(),
                returned,
                "Restore read returned a mismatched batch"
            );
            report.errors.push(
                StorageError::Unavailable {
                    reason: format!(
                        "bulk read returned {} values for {} keys",
                        returned,
                        store_names.len()
                    ),
                }
                .into(),
            );
            report
                .skipped
                .extend(store_names.iter().skip(returned).cloned());
        }

        for ((rule, persist), value) in self.registry.persist_rules().zip(batch.values) {
            let store_name = persist.store_name.clone();
            let (Some(value), Some(node)) = (value, rule.query_node()) else {
                if rule.query_node().is_none() {
                    tracing::warn!(query = %rule.name(), store_name = %store_name, "Rule has no query node to restore into");
                }
                report.skipped.push(store_name);
                continue;
            };

            let data = nest_by_path(&persist.nest, value);
            match self.write_query_with(QueryOptions::new(node.clone(), data), true) {
                Ok(()) => report.restored.push(store_name),
                Err(e) => {
                    tracing::warn!(error = %e, store_name = %store_name, "Restoring query failed");
                    report.errors.push(e.into());
                    report.skipped.push(store_name);
                }
            }
        }

        tracing::debug!(
            restored = report.restored.len(),
            skipped = report.skipped.len(),
            errors = report.errors.len(),
            "Restore pass finished"
        );
        report
    }
}
