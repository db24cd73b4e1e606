//! Ordered, immutable set of subscription rules.

use std::sync::Arc;

use enchant_core::{PersistRule, SubscribedQuery};

/// The rules a decorator evaluates on every write.
///
/// Order is registry order and is significant: matching rules fire in the
/// order they were registered, and every match fires.
#[derive(Debug, Clone)]
pub struct SubscriptionRegistry {
    rules: Arc<[SubscribedQuery]>,
}

impl SubscriptionRegistry {
    pub fn new(rules: Vec<SubscribedQuery>) -> Self {
        Self {
            rules: rules.into(),
        }
    }

    pub fn rules(&self) -> &[SubscribedQuery] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Every rule whose name equals `query_name`, in registry order.
    pub fn matching<'a>(
        &'a self,
        query_name: &'a str,
    ) -> impl Iterator<Item = &'a SubscribedQuery> + 'a {
        self.rules.iter().filter(move |rule| rule.matches(query_name))
    }

    /// Every persistence rule, in registry order.
    pub fn persist_rules(&self) -> impl Iterator<Item = (&SubscribedQuery, &PersistRule)> + '_ {
        self.rules
            .iter()
            .filter_map(|rule| rule.persist_rule().map(|persist| (rule, persist)))
    }

    /// Storage keys of every persistence rule, in registry order.
    ///
    /// Duplicates are kept so the list lines up with [`Self::persist_rules`].
    pub fn store_names(&self) -> Vec<String> {
        self.persist_rules()
            .map(|(_, persist)| persist.store_name.clone())
            .collect()
    }
}
