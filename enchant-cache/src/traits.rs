//! The query cache interface the decorator wraps.

use enchant_core::{CacheError, CacheWrite, QueryDocument, QueryOptions};
use serde_json::Value;

/// An in-memory query-result cache.
///
/// The decorator never changes what these methods do; it only adds work
/// after a successful `write`. Implementations use interior mutability so a
/// shared reference can both read and write.
pub trait QueryCache: Send + Sync {
    /// Write `write.result` as the result of `write.query` into `write.data_id`.
    fn write(&self, write: &CacheWrite) -> Result<(), CacheError>;

    /// Read the current result of `query` from the root entry.
    fn read_query(
        &self,
        query: &QueryDocument,
        variables: Option<&Value>,
    ) -> Result<Value, CacheError>;

    /// Normalize a document before it is written. Identity by default.
    fn transform_document(&self, query: &QueryDocument) -> QueryDocument {
        query.clone()
    }

    /// Write `options.data` as the result of `options.query` into the root entry.
    fn write_query(&self, options: QueryOptions) -> Result<(), CacheError> {
        let write = CacheWrite {
            data_id: enchant_core::ROOT_QUERY.to_string(),
            query: self.transform_document(&options.query),
            result: options.data,
            variables: options.variables,
        };
        self.write(&write)
    }
}
