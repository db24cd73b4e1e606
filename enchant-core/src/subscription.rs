//! Subscription rules: which named queries are persisted or propagated, and how.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;
use crate::nest::project_field;
use crate::query::QueryDocument;
use crate::version::VERSION_KEY;

/// Extracts the value to persist from a written result.
pub type Retriever = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Merges a written result into the previous value of a dependent query.
/// Called as `updater(result, previous)`.
pub type Updater = Arc<dyn Fn(&Value, &Value) -> Value + Send + Sync>;

/// How a persistence rule turns a written result into the stored value.
#[derive(Clone)]
pub enum Extraction {
    /// Persist the result as written.
    Whole,
    /// Persist `result[field]`.
    Field(String),
    /// Persist `retriever(result)`.
    Function(Retriever),
}

impl Extraction {
    pub fn extract(&self, result: &Value) -> Value {
        match self {
            Self::Whole => result.clone(),
            Self::Field(field) => project_field(result, field),
            Self::Function(retriever) => retriever(result),
        }
    }
}

impl fmt::Debug for Extraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Whole => f.write_str("Whole"),
            Self::Field(field) => f.debug_tuple("Field").field(field).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// How a propagation rule computes the new value of the dependent query.
#[derive(Clone)]
pub enum Merge {
    /// Replace the dependent query's data with the result.
    Whole,
    /// Replace it with `result[field]`.
    Field(String),
    /// Replace it with `updater(result, previous)`.
    Function(Updater),
}

impl Merge {
    pub fn merge(&self, result: &Value, previous: &Value) -> Value {
        match self {
            Self::Whole => result.clone(),
            Self::Field(field) => project_field(result, field),
            Self::Function(updater) => updater(result, previous),
        }
    }
}

impl fmt::Debug for Merge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Whole => f.write_str("Whole"),
            Self::Field(field) => f.debug_tuple("Field").field(field).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// Durable persistence of a matching write.
#[derive(Debug, Clone)]
pub struct PersistRule {
    /// Storage key the extracted value is saved under.
    pub store_name: String,
    /// Path the stored value is wrapped in on restore.
    pub nest: Vec<String>,
    pub extraction: Extraction,
}

/// Synchronous update of a dependent cached query.
#[derive(Debug, Clone)]
pub struct PropagateRule {
    /// Name of the dependent query.
    pub update_name: String,
    pub merge: Merge,
}

/// What a rule does when it matches. Persistence and propagation are
/// mutually exclusive.
#[derive(Debug, Clone)]
pub enum SubscriptionMode {
    Persist(PersistRule),
    Propagate(PropagateRule),
    /// Neither persistence nor propagation. Never fires.
    Inert,
}

/// A declarative rule, immutable once registered.
#[derive(Debug, Clone)]
pub struct SubscribedQuery {
    name: String,
    query_node: Option<QueryDocument>,
    mode: SubscriptionMode,
}

impl SubscribedQuery {
    /// Persist every write of `name` under `store_name`, whole.
    pub fn persist(name: impl Into<String>, store_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query_node: None,
            mode: SubscriptionMode::Persist(PersistRule {
                store_name: store_name.into(),
                nest: Vec::new(),
                extraction: Extraction::Whole,
            }),
        }
    }

    /// Propagate every write of `name` into the dependent `query_node`.
    pub fn propagate(
        name: impl Into<String>,
        update_name: impl Into<String>,
        query_node: QueryDocument,
    ) -> Self {
        Self {
            name: name.into(),
            query_node: Some(query_node),
            mode: SubscriptionMode::Propagate(PropagateRule {
                update_name: update_name.into(),
                merge: Merge::Whole,
            }),
        }
    }

    /// A rule that never fires.
    pub fn inert(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query_node: None,
            mode: SubscriptionMode::Inert,
        }
    }

    pub fn with_query_node(mut self, query_node: QueryDocument) -> Self {
        self.query_node = Some(query_node);
        self
    }

    /// Restore path for persistence rules. Ignored by other modes.
    pub fn with_nest<I, S>(mut self, nest: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let SubscriptionMode::Persist(rule) = &mut self.mode {
            rule.nest = nest.into_iter().map(Into::into).collect();
        }
        self
    }

    /// Project a single field of the result. A retriever or updater, once
    /// set, takes precedence over the field.
    pub fn with_retrieve_field(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        match &mut self.mode {
            SubscriptionMode::Persist(rule) => {
                if !matches!(rule.extraction, Extraction::Function(_)) {
                    rule.extraction = Extraction::Field(field);
                }
            }
            SubscriptionMode::Propagate(rule) => {
                if !matches!(rule.merge, Merge::Function(_)) {
                    rule.merge = Merge::Field(field);
                }
            }
            SubscriptionMode::Inert => {}
        }
        self
    }

    pub fn with_retriever<F>(mut self, retriever: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.set_retriever(Arc::new(retriever));
        self
    }

    pub fn with_updater<F>(mut self, updater: F) -> Self
    where
        F: Fn(&Value, &Value) -> Value + Send + Sync + 'static,
    {
        self.set_updater(Arc::new(updater));
        self
    }

    /// Attach a retriever. Returns false when this is not a persistence rule.
    pub fn set_retriever(&mut self, retriever: Retriever) -> bool {
        match &mut self.mode {
            SubscriptionMode::Persist(rule) => {
                rule.extraction = Extraction::Function(retriever);
                true
            }
            _ => false,
        }
    }

    /// Attach an updater. Returns false when this is not a propagation rule.
    pub fn set_updater(&mut self, updater: Updater) -> bool {
        match &mut self.mode {
            SubscriptionMode::Propagate(rule) => {
                rule.merge = Merge::Function(updater);
                true
            }
            _ => false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn query_node(&self) -> Option<&QueryDocument> {
        self.query_node.as_ref()
    }

    pub fn mode(&self) -> &SubscriptionMode {
        &self.mode
    }

    pub fn persist_rule(&self) -> Option<&PersistRule> {
        match &self.mode {
            SubscriptionMode::Persist(rule) => Some(rule),
            _ => None,
        }
    }

    pub fn propagate_rule(&self) -> Option<&PropagateRule> {
        match &self.mode {
            SubscriptionMode::Propagate(rule) => Some(rule),
            _ => None,
        }
    }

    /// Whether a write of the query named `query_name` triggers this rule.
    pub fn matches(&self, query_name: &str) -> bool {
        self.name == query_name
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(self.invalid("rule name must not be empty"));
        }

        match &self.mode {
            SubscriptionMode::Persist(rule) => {
                if rule.store_name.is_empty() {
                    return Err(self.invalid("store_name must not be empty"));
                }
                if rule.store_name == VERSION_KEY {
                    return Err(self.invalid("store_name collides with the reserved version key"));
                }
            }
            SubscriptionMode::Propagate(rule) => {
                if rule.update_name.is_empty() {
                    return Err(self.invalid("update_name must not be empty"));
                }
                let Some(node) = &self.query_node else {
                    return Err(self.invalid("propagation requires a query_node"));
                };
                if let Some(node_name) = node.canonical_name() {
                    if node_name != rule.update_name {
                        return Err(self.invalid(&format!(
                            "query_node is named {:?} but update_name is {:?}",
                            node_name, rule.update_name
                        )));
                    }
                }
            }
            SubscriptionMode::Inert => {}
        }

        Ok(())
    }

    fn invalid(&self, reason: &str) -> ConfigError {
        ConfigError::InvalidRule {
            name: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Declarative form of a rule, as written in a config file.
///
/// When both `store_name` and `update_name` are present the rule persists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub name: String,
    #[serde(default)]
    pub query_node: Option<QueryDocument>,
    #[serde(default)]
    pub store_name: Option<String>,
    #[serde(default)]
    pub nest: Vec<String>,
    #[serde(default)]
    pub retrieve_field: Option<String>,
    #[serde(default)]
    pub update_name: Option<String>,
}

impl From<RuleSpec> for SubscribedQuery {
    fn from(spec: RuleSpec) -> Self {
        let store_name = spec.store_name.filter(|s| !s.is_empty());
        let update_name = spec.update_name.filter(|s| !s.is_empty());

        let mode = match (store_name, update_name) {
            (Some(store_name), _) => SubscriptionMode::Persist(PersistRule {
                store_name,
                nest: spec.nest,
                extraction: spec
                    .retrieve_field
                    .map(Extraction::Field)
                    .unwrap_or(Extraction::Whole),
            }),
            (None, Some(update_name)) => SubscriptionMode::Propagate(PropagateRule {
                update_name,
                merge: spec
                    .retrieve_field
                    .map(Merge::Field)
                    .unwrap_or(Merge::Whole),
            }),
            (None, None) => SubscriptionMode::Inert,
        };

        Self {
            name: spec.name,
            query_node: spec.query_node,
            mode,
        }
    }
}
