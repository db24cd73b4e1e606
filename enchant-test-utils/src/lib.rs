//! Enchant Test Utilities
//!
//! Shared test infrastructure for the Enchant workspace:
//! - Proptest generators for rules, documents and version tokens
//! - Test fixtures for the common persist/propagate scenarios
//! - Custom assertions for Enchant-specific errors
//! - Tracing setup for tests

// Re-export mock storage from its source crate
pub use enchant_storage::{MockQueryStorage, StorageOp};

// Re-export core types for convenience
pub use enchant_core::{
    CacheError, CacheWrite, ConfigError, EnchantConfig, EnchantError, EnchantResult,
    PropagationError, QueryDocument, QueryOptions, RuleSpec, StorageError, SubscribedQuery,
    VersionToken, ROOT_QUERY, VERSION_KEY,
};

use serde_json::{json, Value};

// ============================================================================
// TRACING
// ============================================================================

/// Install a test-friendly tracing subscriber.
///
/// Honors `RUST_LOG`; defaults to `enchant=debug`. Safe to call from every
/// test: only the first call installs anything.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("enchant_cache=debug,enchant_storage=debug,warn"));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Enchant types.

    use super::*;
    use proptest::prelude::*;

    /// Operation name as used for rule matching.
    pub fn arb_query_name() -> impl Strategy<Value = String> {
        "[A-Z][a-zA-Z]{0,11}"
    }

    /// Top-level field or nest segment.
    pub fn arb_field_name() -> impl Strategy<Value = String> {
        "[a-z][a-zA-Z]{0,7}"
    }

    pub fn arb_version_token() -> impl Strategy<Value = VersionToken> {
        prop_oneof![
            any::<bool>().prop_map(VersionToken::from),
            any::<i64>().prop_map(VersionToken::from),
            "[a-z0-9.]{1,8}".prop_map(VersionToken::from),
        ]
    }

    /// Arbitrary JSON, a few levels deep.
    pub fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i32>().prop_map(Value::from),
            "[a-z ]{0,12}".prop_map(Value::from),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|map| Value::Object(map.into_iter().collect())),
            ]
        })
    }

    pub fn arb_nest_path() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(arb_field_name(), 1..4)
    }

    pub fn arb_query_document() -> impl Strategy<Value = QueryDocument> {
        (
            arb_query_name(),
            prop::collection::vec(arb_field_name(), 0..4),
        )
            .prop_map(|(name, fields)| QueryDocument::query(name).with_fields(fields))
    }

    /// A restorable persistence rule: its query node selects the first nest
    /// segment, so restored values land where reads look for them.
    pub fn arb_persist_rule() -> impl Strategy<Value = SubscribedQuery> {
        (arb_query_name(), "[a-z]{1,10}", arb_nest_path()).prop_map(|(name, store, nest)| {
            let node = QueryDocument::query(name.clone()).with_field(nest[0].clone());
            SubscribedQuery::persist(name, store)
                .with_nest(nest)
                .with_query_node(node)
        })
    }

    /// Declarative rule as it would appear in a config file.
    pub fn arb_rule_spec() -> impl Strategy<Value = RuleSpec> {
        (
            arb_query_name(),
            prop::option::of("[a-z]{1,10}"),
            prop::option::of(arb_query_name()),
            prop::option::of(arb_field_name()),
            prop::collection::vec(arb_field_name(), 0..3),
        )
            .prop_map(|(name, store_name, update_name, retrieve_field, nest)| {
                let query_node = update_name
                    .as_ref()
                    .map(|update| QueryDocument::query(update.clone()));
                RuleSpec {
                    name,
                    query_node,
                    store_name,
                    nest,
                    retrieve_field,
                    update_name,
                }
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common scenarios.

    use super::*;

    /// A config file exercising every rule kind.
    pub const SAMPLE_CONFIG_TOML: &str = r#"
version = "2024.1"
log_cache_write = true

[[subscribed_queries]]
name = "GetProfile"
store_name = "profile"
nest = ["user"]
query_node = { name = "GetProfile", fields = ["user"] }

[[subscribed_queries]]
name = "RefreshFeed"
update_name = "GetFeed"
retrieve_field = "refreshFeed"
query_node = { name = "GetFeed", fields = ["feed"] }
"#;

    pub fn profile_query() -> QueryDocument {
        QueryDocument::query("GetProfile").with_field("user")
    }

    pub fn feed_query() -> QueryDocument {
        QueryDocument::query("GetFeed").with_field("feed")
    }

    /// Its `refreshFeed` field carries the whole `GetFeed` data.
    pub fn refresh_feed_query() -> QueryDocument {
        QueryDocument::query("RefreshFeed").with_field("refreshFeed")
    }

    pub fn add_post_mutation() -> QueryDocument {
        QueryDocument::mutation("AddPost").with_field("addPost")
    }

    /// `{name:"GetProfile", storeName:"profile", nest:["user"]}`.
    pub fn profile_rule() -> SubscribedQuery {
        SubscribedQuery::persist("GetProfile", "profile")
            .with_nest(["user"])
            .with_query_node(profile_query())
    }

    /// Appends each added post to the cached feed.
    pub fn feed_propagate_rule() -> SubscribedQuery {
        SubscribedQuery::propagate("AddPost", "GetFeed", feed_query())
            .with_updater(append_post)
    }

    pub fn append_post(result: &Value, previous: &Value) -> Value {
        let mut feed = previous["feed"].as_array().cloned().unwrap_or_default();
        feed.push(result["addPost"].clone());
        json!({ "feed": feed })
    }

    pub fn minimal_config() -> EnchantConfig {
        EnchantConfig::new(1)
    }

    pub fn profile_config(version: impl Into<VersionToken>) -> EnchantConfig {
        EnchantConfig::new(version).with_query(profile_rule())
    }

    pub fn full_config(version: impl Into<VersionToken>) -> EnchantConfig {
        EnchantConfig::new(version)
            .with_query(profile_rule())
            .with_query(feed_propagate_rule())
    }

    /// Mock storage that already carries `version` and `entries`.
    pub fn seeded_storage<I>(version: impl Into<VersionToken>, entries: I) -> MockQueryStorage
    where
        I: IntoIterator<Item = (&'static str, Value)>,
    {
        let version: VersionToken = version.into();
        MockQueryStorage::with_entries(
            std::iter::once((VERSION_KEY, version.to_value())).chain(entries),
        )
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for Enchant-specific results.

    use super::*;

    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &EnchantResult<T>) {
        match result {
            Err(EnchantError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_invalid_rule<T: std::fmt::Debug>(result: &EnchantResult<T>, rule: &str) {
        match result {
            Err(EnchantError::Config(ConfigError::InvalidRule { name, .. })) => {
                assert_eq!(name, rule, "Wrong rule in InvalidRule error");
            }
            other => panic!("Expected InvalidRule error for {:?}, got: {:?}", rule, other),
        }
    }

    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &EnchantResult<T>) {
        match result {
            Err(EnchantError::Storage(_)) => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_version_check_error<T: std::fmt::Debug>(result: &EnchantResult<T>) {
        match result {
            Err(EnchantError::VersionCheck(_)) => {}
            other => panic!("Expected VersionCheck error, got: {:?}", other),
        }
    }

    /// Assert that `key` was saved with exactly `expected` at least once.
    #[track_caller]
    pub fn assert_saved(storage: &MockQueryStorage, key: &str, expected: &Value) {
        let saved = storage
            .mutations()
            .into_iter()
            .any(|op| matches!(&op, StorageOp::Save(k, v) if k == key && v == expected));
        assert!(
            saved,
            "Expected {:?} saved under {:?}, mutations: {:?}",
            expected,
            key,
            storage.mutations()
        );
    }

    /// Assert that nothing but the version token was ever written.
    #[track_caller]
    pub fn assert_no_persistence(storage: &MockQueryStorage) {
        let persisted: Vec<_> = storage
            .mutations()
            .into_iter()
            .filter(|op| matches!(op, StorageOp::Save(k, _) if k != VERSION_KEY))
            .collect();
        assert!(persisted.is_empty(), "Expected no persistence, got: {:?}", persisted);
    }
}

// ============================================================================
// TESTS
// ============================================================================
