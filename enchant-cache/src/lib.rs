//! Enchant Cache - Persistence and Propagation Decorator
//!
//! Wraps an in-memory [`QueryCache`] so that writes of subscribed queries are
//! persisted into durable [`QueryStorage`](enchant_storage::QueryStorage) or
//! propagated into dependent cached queries, and persisted values can be
//! restored on demand.
//!
//! # Components
//!
//! - [`SubscriptionRegistry`]: ordered rules evaluated on every write
//! - [`VersionGate`]: one-shot background version check that purges stale
//!   persisted values
//! - write interception: [`EnchantedCache::write_with`]
//! - restore: [`EnchantedCache::restore_all_queries`]
//! - lifecycle: [`EnchantedCache::enchant`] and [`EnchantedCache::disenchant`]

pub mod enchanted;
pub mod interceptor;
pub mod memory;
pub mod registry;
pub mod restore;
pub mod traits;
pub mod version_gate;

pub use enchanted::EnchantedCache;
pub use memory::InMemoryQueryCache;
pub use registry::SubscriptionRegistry;
pub use restore::RestoreReport;
pub use traits::QueryCache;
pub use version_gate::{sync_version, GateState, VersionGate, VersionOutcome};
