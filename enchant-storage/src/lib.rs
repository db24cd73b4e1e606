//! Enchant Storage - Durable Backends for Persisted Queries
//!
//! Defines the [`QueryStorage`] abstraction the cache decorator persists
//! into, plus an LMDB backend (the default), a process-local backend and a
//! fault-injecting mock for tests.

pub mod lmdb_backend;
pub mod memory;
pub mod mock;
pub mod traits;

pub use lmdb_backend::{LmdbQueryStorage, LmdbStorageError};
pub use memory::InMemoryQueryStorage;
pub use mock::{MockQueryStorage, StorageOp};
pub use traits::{MultiGet, QueryStorage};
