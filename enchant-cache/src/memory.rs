//! Reference in-memory query cache.
//!
//! Entries are JSON objects keyed by data id. A write merges the result's
//! top-level fields into its entry; a read collects the query's top-level
//! fields from the root entry. Fields written with variables are keyed as
//! `field({"var":...})` so different arguments do not collide.

use std::collections::HashMap;
use std::sync::RwLock;

use enchant_core::{CacheError, CacheWrite, QueryDocument, ROOT_QUERY};
use serde_json::{Map, Value};

use crate::traits::QueryCache;

#[derive(Debug, Default)]
pub struct InMemoryQueryCache {
    entries: RwLock<HashMap<String, Map<String, Value>>>,
    log: RwLock<Vec<CacheWrite>>,
}

impl InMemoryQueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of one entry.
    pub fn read_entry(&self, data_id: &str) -> Result<Option<Value>, CacheError> {
        let entries = self.entries.read().map_err(|_| CacheError::LockPoisoned)?;
        Ok(entries.get(data_id).cloned().map(Value::Object))
    }

    /// Every successful write, in order.
    pub fn writes(&self) -> Vec<CacheWrite> {
        self.log.read().map(|log| log.clone()).unwrap_or_default()
    }

    pub fn write_count(&self) -> usize {
        self.log.read().map(|log| log.len()).unwrap_or(0)
    }
}

fn field_key(field: &str, variables: Option<&Value>) -> String {
    match variables {
        Some(Value::Object(vars)) if !vars.is_empty() => {
            format!("{}({})", field, Value::Object(vars.clone()))
        }
        _ => field.to_string(),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl QueryCache for InMemoryQueryCache {
    fn write(&self, write: &CacheWrite) -> Result<(), CacheError> {
        let Value::Object(result) = &write.result else {
            return Err(CacheError::NotAnObject {
                kind: kind_of(&write.result).to_string(),
            });
        };

        {
            let mut entries = self.entries.write().map_err(|_| CacheError::LockPoisoned)?;
            let entry = entries.entry(write.data_id.clone()).or_default();

            let selected = |field: &String| {
                write.query.fields.is_empty() || write.query.fields.contains(field)
            };
            for (field, value) in result.iter().filter(|(f, _)| selected(*f)) {
                entry.insert(field_key(field, write.variables.as_ref()), value.clone());
            }
        }

        if let Ok(mut log) = self.log.write() {
            log.push(write.clone());
        }
        Ok(())
    }

    fn read_query(
        &self,
        query: &QueryDocument,
        variables: Option<&Value>,
    ) -> Result<Value, CacheError> {
        let entries = self.entries.read().map_err(|_| CacheError::LockPoisoned)?;
        let root = entries.get(ROOT_QUERY).ok_or_else(|| CacheError::MissingEntry {
            data_id: ROOT_QUERY.to_string(),
        })?;

        if query.fields.is_empty() {
            return Ok(Value::Object(root.clone()));
        }

        let mut data = Map::with_capacity(query.fields.len());
        for field in &query.fields {
            let value = root
                .get(&field_key(field, variables))
                .ok_or_else(|| CacheError::MissingField {
                    data_id: ROOT_QUERY.to_string(),
                    field: field.clone(),
                })?;
            data.insert(field.clone(), value.clone());
        }
        Ok(Value::Object(data))
    }

    /// Drops repeated fields, keeping the first occurrence.
    fn transform_document(&self, query: &QueryDocument) -> QueryDocument {
        let mut transformed = query.clone();
        let mut seen = std::collections::HashSet::new();
        transformed.fields.retain(|field| seen.insert(field.clone()));
        transformed
    }
}
