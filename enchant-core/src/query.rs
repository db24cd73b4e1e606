//! Query documents and write payloads

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known root entry every `write_query` targets.
pub const ROOT_QUERY: &str = "ROOT_QUERY";

/// Kind of operation a query document describes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    #[default]
    Query,
    Mutation,
    Subscription,
}

/// A structured, named read/write target understood by the cache.
///
/// Only the parts the decorator needs are modelled: the operation name used
/// for rule matching and the top-level field selection the cache reads and
/// writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryDocument {
    #[serde(default)]
    pub operation: OperationKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub fields: Vec<String>,
}

impl QueryDocument {
    /// A named query operation with no fields selected yet.
    pub fn query(name: impl Into<String>) -> Self {
        Self {
            operation: OperationKind::Query,
            name: Some(name.into()),
            fields: Vec::new(),
        }
    }

    /// A named mutation operation with no fields selected yet.
    pub fn mutation(name: impl Into<String>) -> Self {
        Self {
            operation: OperationKind::Mutation,
            name: Some(name.into()),
            fields: Vec::new(),
        }
    }

    /// An anonymous query selecting the given fields.
    pub fn anonymous<I, F>(fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        Self {
            operation: OperationKind::Query,
            name: None,
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Add a top-level field to the selection.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.fields.push(field.into());
        self
    }

    /// Add several top-level fields to the selection.
    pub fn with_fields<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    /// The identifier subscription rules are matched against.
    ///
    /// Anonymous documents have no canonical name and never match a rule.
    pub fn canonical_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|name| !name.is_empty())
    }
}

/// Payload of a low-level cache write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheWrite {
    /// Entry the result is written into.
    pub data_id: String,
    pub query: QueryDocument,
    pub result: Value,
    #[serde(default)]
    pub variables: Option<Value>,
}

impl CacheWrite {
    /// A write into an arbitrary entry.
    pub fn new(data_id: impl Into<String>, query: QueryDocument, result: Value) -> Self {
        Self {
            data_id: data_id.into(),
            query,
            result,
            variables: None,
        }
    }

    /// A write into [`ROOT_QUERY`].
    pub fn root(query: QueryDocument, result: Value) -> Self {
        Self::new(ROOT_QUERY, query, result)
    }

    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = Some(variables);
        self
    }
}

/// Options of a high-level `write_query` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    pub query: QueryDocument,
    pub data: Value,
    #[serde(default)]
    pub variables: Option<Value>,
}

impl QueryOptions {
    pub fn new(query: QueryDocument, data: Value) -> Self {
        Self {
            query,
            data,
            variables: None,
        }
    }

    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = Some(variables);
        self
    }
}
