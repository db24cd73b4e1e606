//! One-shot version check against durable storage.
//!
//! Runs once per decorator, in the background. If the token stored under
//! [`VERSION_KEY`] is absent or differs from the configured one, every
//! registered persistence key is removed and the new token is written.
//! There is no per-key migration: a mismatch always purges everything.

use std::sync::Arc;

use enchant_core::{EnchantError, EnchantResult, StorageError, VersionToken, VERSION_KEY};
use enchant_storage::QueryStorage;
use tokio::runtime::Handle;
use tokio::sync::watch;

/// What the version check found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOutcome {
    /// Stored token equals the configured one. Nothing was removed.
    Matched,
    /// Stored token was absent or different. `purged` keys were removed.
    Invalidated { purged: usize },
}

/// State of the version gate. Transitions exactly once out of `Pending`.
#[derive(Debug, Clone, PartialEq)]
pub enum GateState {
    Pending,
    Resolved(VersionOutcome),
    /// A storage read or write failed during the check.
    Rejected(EnchantError),
}

impl GateState {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// Handle on the background version check.
#[derive(Debug, Clone)]
pub struct VersionGate {
    state: watch::Receiver<GateState>,
}

impl VersionGate {
    /// Start the check on `runtime` and return immediately.
    pub fn spawn<S>(
        runtime: &Handle,
        storage: Arc<S>,
        version: VersionToken,
        store_names: Vec<String>,
    ) -> Self
    where
        S: QueryStorage + 'static,
    {
        let (tx, rx) = watch::channel(GateState::Pending);

        runtime.spawn(async move {
            let state = match sync_version(storage.as_ref(), &version, &store_names).await {
                Ok(outcome) => GateState::Resolved(outcome),
                Err(e) => {
                    tracing::error!(error = %e, version = %version, "Version syncing failed");
                    GateState::Rejected(e)
                }
            };
            tx.send_replace(state);
        });

        Self { state: rx }
    }

    /// Current state, without waiting.
    pub fn state(&self) -> GateState {
        self.state.borrow().clone()
    }

    /// Wait until the check leaves `Pending`.
    pub async fn settled(&self) -> GateState {
        let mut rx = self.state.clone();
        let settled = rx.wait_for(|state| !state.is_pending()).await.map(|state| (*state).clone());
        match settled {
            Ok(state) => state,
            // The task ended without reporting, e.g. the runtime shut down.
            Err(_) => GateState::Rejected(
                StorageError::Unavailable {
                    reason: "version check did not complete".to_string(),
                }
                .into(),
            ),
        }
    }
}

/// Compare the stored token with `version` and purge `store_names` on mismatch.
///
/// Resolves whether or not a mismatch occurred; fails only when storage does.
pub async fn sync_version<S>(
    storage: &S,
    version: &VersionToken,
    store_names: &[String],
) -> EnchantResult<VersionOutcome>
where
    S: QueryStorage + ?Sized,
{
    let stored = storage.get_query(VERSION_KEY).await?;
    tracing::debug!(stored = ?stored, current = %version, "Checking cache version");

    if version.matches(stored.as_ref()) {
        return Ok(VersionOutcome::Matched);
    }

    storage.multi_remove(store_names).await?;
    storage.save_query(VERSION_KEY, &version.to_value()).await?;

    tracing::info!(
        purged = store_names.len(),
        version = %version,
        "Cache version changed, persisted queries purged"
    );
    Ok(VersionOutcome::Invalidated {
        purged: store_names.len(),
    })
}
