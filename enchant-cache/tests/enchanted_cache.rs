//! End-to-end behavior of the decorated cache.

use std::sync::Arc;

use enchant_cache::{
    EnchantedCache, GateState, InMemoryQueryCache, QueryCache, VersionOutcome,
};
use enchant_core::{nest_by_path, StorageConfig};
use enchant_storage::QueryStorage;
use enchant_test_utils::{
    assertions, fixtures, generators, init_tracing, CacheWrite, EnchantConfig, MockQueryStorage,
    QueryDocument, QueryOptions, StorageOp, SubscribedQuery, ROOT_QUERY, VERSION_KEY,
};
use proptest::prelude::*;
use serde_json::{json, Value};

type Enchanted = EnchantedCache<InMemoryQueryCache, MockQueryStorage>;

fn enchant(config: EnchantConfig, storage: &Arc<MockQueryStorage>) -> Enchanted {
    EnchantedCache::enchant(Arc::new(InMemoryQueryCache::new()), config, storage.clone())
        .expect("enchant should succeed")
}

fn write_profile(cache: &Enchanted, result: Value) {
    cache
        .write(&CacheWrite::root(QueryDocument::query("GetProfile"), result))
        .expect("write should succeed");
}

#[tokio::test]
async fn test_profile_is_persisted_and_restored_nested() {
    init_tracing();
    let storage = Arc::new(MockQueryStorage::new());
    let cache = enchant(fixtures::profile_config(1), &storage);
    cache.version_settled().await;

    write_profile(&cache, json!({"id": 1}));
    cache.flush_persistence().await;
    assertions::assert_saved(&storage, "profile", &json!({"id": 1}));

    let restored = enchant(fixtures::profile_config(1), &storage);
    let report = restored
        .restore_all_queries()
        .await
        .expect("restore should succeed");

    assert_eq!(report.restored, vec!["profile"]);
    assert_eq!(
        restored
            .read_query(&fixtures::profile_query(), None)
            .expect("restored query should be readable"),
        json!({"user": {"id": 1}})
    );
}

#[tokio::test]
async fn test_unsubscribed_write_touches_nothing_else() {
    let storage = Arc::new(MockQueryStorage::new());
    let cache = enchant(fixtures::full_config(1), &storage);
    cache.version_settled().await;
    cache
        .write_query(QueryOptions::new(fixtures::feed_query(), json!({"feed": ["a"]})))
        .expect("seed");
    storage.clear_ops();

    cache
        .write_query(QueryOptions::new(
            QueryDocument::query("GetSettings").with_field("settings"),
            json!({"settings": {"theme": "dark"}}),
        ))
        .expect("write should succeed");
    cache.flush_persistence().await;

    assert!(storage.ops().is_empty());
    assert_eq!(
        cache.read_query(&fixtures::feed_query(), None).expect("read"),
        json!({"feed": ["a"]})
    );
}

#[tokio::test]
async fn test_propagation_is_visible_when_write_returns() {
    let storage = Arc::new(MockQueryStorage::new());
    let cache = enchant(fixtures::full_config(1), &storage);

    cache
        .write_query(QueryOptions::new(fixtures::feed_query(), json!({"feed": ["a"]})))
        .expect("seed");
    cache
        .write_query(QueryOptions::new(
            fixtures::add_post_mutation(),
            json!({"addPost": "b"}),
        ))
        .expect("write should succeed");

    assert_eq!(
        cache.read_query(&fixtures::feed_query(), None).expect("read"),
        json!({"feed": ["a", "b"]})
    );
    // the propagated write was not fanned out again
    cache.flush_persistence().await;
    assertions::assert_no_persistence(&storage);
}

#[tokio::test]
async fn test_propagation_without_previous_value_keeps_write() {
    let storage = Arc::new(MockQueryStorage::new());
    let cache = enchant(fixtures::full_config(1), &storage);

    cache
        .write_query(QueryOptions::new(
            fixtures::add_post_mutation(),
            json!({"addPost": "b"}),
        ))
        .expect("write should succeed");

    assert_eq!(
        cache
            .read_query(&fixtures::add_post_mutation(), None)
            .expect("read"),
        json!({"addPost": "b"})
    );
    assert!(cache.read_query(&fixtures::feed_query(), None).is_err());
}

#[tokio::test]
async fn test_version_mismatch_purges_persisted_queries() {
    let storage = Arc::new(fixtures::seeded_storage(1, [("profile", json!({"id": 1}))]));
    let cache = enchant(fixtures::profile_config(2), &storage);

    assert_eq!(
        cache.version_settled().await,
        GateState::Resolved(VersionOutcome::Invalidated { purged: 1 })
    );
    assert_eq!(storage.peek("profile").await, None);
    assert_eq!(storage.peek(VERSION_KEY).await, Some(json!(2)));

    let report = cache.restore_all_queries().await.expect("restore");
    assert!(report.restored.is_empty());
    assert_eq!(cache.cache().write_count(), 0);
}

#[tokio::test]
async fn test_version_match_keeps_persisted_queries() {
    let storage = Arc::new(fixtures::seeded_storage("v2", [("profile", json!({"id": 1}))]));
    let cache = enchant(fixtures::profile_config("v2"), &storage);

    assert_eq!(
        cache.version_settled().await,
        GateState::Resolved(VersionOutcome::Matched)
    );
    assert!(storage.mutations().is_empty());
    assert_eq!(storage.peek("profile").await, Some(json!({"id": 1})));
}

#[tokio::test]
async fn test_restore_waits_for_pending_version_check() {
    let storage = Arc::new(fixtures::seeded_storage(1, [("profile", json!({"id": 7}))]));
    storage.hold_reads();
    let cache = enchant(fixtures::profile_config(1), &storage);

    let (report, ()) = tokio::join!(cache.restore_all_queries(), async {
        tokio::task::yield_now().await;
        assert!(cache.gate_state().is_pending());
        storage.release_reads();
    });

    let report = report.expect("restore should succeed");
    assert_eq!(report.restored, vec!["profile"]);
    assert_eq!(
        cache.read_query(&fixtures::profile_query(), None).expect("read"),
        json!({"user": {"id": 7}})
    );
}

#[tokio::test]
async fn test_restore_skips_keys_that_fail_to_read() {
    let settings_node = QueryDocument::query("GetSettings").with_field("settings");
    let config = fixtures::profile_config(1).with_query(
        SubscribedQuery::persist("GetSettings", "settings")
            .with_nest(["settings"])
            .with_query_node(settings_node.clone()),
    );
    let storage = Arc::new(fixtures::seeded_storage(
        1,
        [("profile", json!({"id": 1})), ("settings", json!({"theme": "dark"}))],
    ));
    storage.fail_key("settings");
    let cache = enchant(config, &storage);

    let report = cache.restore_all_queries().await.expect("restore");

    assert_eq!(report.restored, vec!["profile"]);
    assert_eq!(report.skipped, vec!["settings"]);
    assert_eq!(report.errors.len(), 1);
    assert!(cache.read_query(&fixtures::profile_query(), None).is_ok());
    assert!(cache.read_query(&settings_node, None).is_err());
}

#[tokio::test]
async fn test_restore_does_not_re_persist() {
    let storage = Arc::new(fixtures::seeded_storage(1, [("profile", json!({"id": 1}))]));
    let cache = enchant(fixtures::profile_config(1), &storage);

    cache.restore_all_queries().await.expect("restore");
    cache.flush_persistence().await;

    assertions::assert_no_persistence(&storage);
}

#[tokio::test]
async fn test_settled_version_failure_blocks_neither_restore_nor_writes() {
    let storage = Arc::new(fixtures::seeded_storage(1, [("profile", json!({"id": 2}))]));
    storage.fail_key(VERSION_KEY);
    let cache = enchant(fixtures::profile_config(1), &storage);

    assert!(matches!(cache.version_settled().await, GateState::Rejected(_)));
    let report = cache.restore_all_queries().await.expect("restore");
    assert_eq!(report.restored, vec!["profile"]);

    write_profile(&cache, json!({"id": 3}));
    cache.flush_persistence().await;
    assertions::assert_saved(&storage, "profile", &json!({"id": 3}));
}

#[tokio::test]
async fn test_version_failure_during_restore_is_returned() {
    let storage = Arc::new(fixtures::seeded_storage(1, [("profile", json!({"id": 2}))]));
    storage.fail_key(VERSION_KEY);
    storage.hold_reads();
    let cache = enchant(fixtures::profile_config(1), &storage);

    let (result, ()) = tokio::join!(cache.restore_all_queries(), async {
        tokio::task::yield_now().await;
        storage.release_reads();
    });

    assertions::assert_version_check_error(&result);
    assert!(cache.read_query(&fixtures::profile_query(), None).is_err());
}

#[tokio::test]
async fn test_persistence_failure_is_not_surfaced() {
    let storage = Arc::new(fixtures::seeded_storage(1, []));
    let cache = enchant(fixtures::profile_config(1), &storage);
    cache.version_settled().await;
    storage.fail_writes(true);

    write_profile(&cache, json!({"id": 1}));
    cache.flush_persistence().await;

    assert_eq!(storage.peek("profile").await, None);
    assert_eq!(
        cache.read_query(&QueryDocument::query("GetProfile"), None).expect("read"),
        json!({"id": 1})
    );
}

#[tokio::test]
async fn test_every_matching_rule_fires() {
    let config = fixtures::profile_config(1)
        .with_query(SubscribedQuery::persist("GetProfile", "profile_id").with_retrieve_field("id"))
        .with_query(
            SubscribedQuery::propagate(
                "GetProfile",
                "GetViewer",
                QueryDocument::query("GetViewer").with_field("viewer"),
            )
            .with_updater(|result, _| json!({ "viewer": result["id"] })),
        );
    let storage = Arc::new(MockQueryStorage::new());
    let cache = enchant(config, &storage);
    cache.version_settled().await;
    cache
        .write_query(QueryOptions::new(
            QueryDocument::query("GetViewer").with_field("viewer"),
            json!({"viewer": null}),
        ))
        .expect("seed");

    write_profile(&cache, json!({"id": 5}));
    cache.flush_persistence().await;

    assertions::assert_saved(&storage, "profile", &json!({"id": 5}));
    assertions::assert_saved(&storage, "profile_id", &json!(5));
    assert_eq!(
        cache
            .read_query(&QueryDocument::query("GetViewer").with_field("viewer"), None)
            .expect("read"),
        json!({"viewer": 5})
    );
}

#[tokio::test]
async fn test_disenchant_restores_undecorated_behavior() {
    let storage = Arc::new(MockQueryStorage::new());
    let cache = enchant(fixtures::full_config(1), &storage);
    cache.version_settled().await;

    let original = cache.disenchant();
    storage.clear_ops();

    original
        .write_query(QueryOptions::new(
            QueryDocument::query("GetProfile").with_field("user"),
            json!({"user": 1}),
        ))
        .expect("write should succeed");
    original
        .write_query(QueryOptions::new(fixtures::feed_query(), json!({"feed": []})))
        .expect("seed");
    original
        .write_query(QueryOptions::new(
            fixtures::add_post_mutation(),
            json!({"addPost": "b"}),
        ))
        .expect("write should succeed");
    tokio::task::yield_now().await;

    assert!(storage.ops().is_empty());
    assert_eq!(
        original.read_query(&fixtures::feed_query(), None).expect("read"),
        json!({"feed": []})
    );
}

#[tokio::test]
async fn test_write_query_targets_root_entry() {
    let storage = Arc::new(MockQueryStorage::new());
    let cache = enchant(fixtures::minimal_config(), &storage);

    cache
        .write_query(QueryOptions::new(
            QueryDocument::query("Seed").with_fields(["a", "a"]),
            json!({"a": 1}),
        ))
        .expect("write should succeed");

    let writes = cache.cache().writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].data_id, ROOT_QUERY);
    assert_eq!(writes[0].query.fields, vec!["a"]);
}

#[tokio::test]
async fn test_toml_config_propagates_by_field() {
    let config = EnchantConfig::from_toml_str(fixtures::SAMPLE_CONFIG_TOML).expect("parse");
    let storage = Arc::new(MockQueryStorage::new());
    let cache = enchant(config, &storage);

    cache
        .write_query(QueryOptions::new(fixtures::feed_query(), json!({"feed": [1]})))
        .expect("seed");
    cache
        .write_query(QueryOptions::new(
            fixtures::refresh_feed_query(),
            json!({"refreshFeed": {"feed": [1, 2]}}),
        ))
        .expect("write");

    assert_eq!(
        cache.read_query(&fixtures::feed_query(), None).expect("read"),
        json!({"feed": [1, 2]})
    );
}

#[tokio::test]
async fn test_missing_version_aborts_construction() {
    let storage = Arc::new(MockQueryStorage::new());
    let result = EnchantedCache::enchant(
        Arc::new(InMemoryQueryCache::new()),
        EnchantConfig::default().with_query(fixtures::profile_rule()),
        storage.clone(),
    );
    assertions::assert_config_error(&result);
    tokio::task::yield_now().await;
    assert!(storage.ops().is_empty());
}

#[tokio::test]
async fn test_version_check_reads_before_any_purge() {
    let storage = Arc::new(MockQueryStorage::new());
    let cache = enchant(fixtures::profile_config(1), &storage);
    cache.version_settled().await;

    assert_eq!(
        storage.ops(),
        vec![
            StorageOp::Get(VERSION_KEY.to_string()),
            StorageOp::MultiRemove(vec!["profile".to_string()]),
            StorageOp::Save(VERSION_KEY.to_string(), json!(1)),
        ]
    );
}

#[tokio::test]
async fn test_lmdb_default_storage_end_to_end() {
    let temp_dir = tempfile::TempDir::new().expect("TempDir creation should succeed");
    let cache = EnchantedCache::enchant_with_default_storage(
        Arc::new(InMemoryQueryCache::new()),
        fixtures::profile_config("lmdb"),
        &StorageConfig::new(temp_dir.path()).with_max_size_mb(8),
    )
    .expect("enchant should succeed");
    cache.version_settled().await;

    cache
        .write(&CacheWrite::root(
            QueryDocument::query("GetProfile"),
            json!({"id": 11}),
        ))
        .expect("write should succeed");
    cache.flush_persistence().await;

    let stored = cache
        .storage()
        .get_query("profile")
        .await
        .expect("get should succeed");
    assert_eq!(stored, Some(json!({"id": 11})));
    assert!(cache
        .storage()
        .saved_at("profile")
        .expect("saved_at should succeed")
        .is_some());

    let report = cache.restore_all_queries().await.expect("restore");
    assert_eq!(report.restored, vec!["profile"]);
    assert_eq!(
        cache.read_query(&fixtures::profile_query(), None).expect("read"),
        json!({"user": {"id": 11}})
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_restore_rebuilds_nested_shape(
        rule in generators::arb_persist_rule(),
        value in generators::arb_json(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");

        let persist = rule.persist_rule().expect("persist rule").clone();
        let node = rule.query_node().expect("query node").clone();
        let expected = nest_by_path(&persist.nest, value.clone());

        let restored = runtime.block_on(async {
            let storage = Arc::new(fixtures::seeded_storage(1, []));
            storage.save_query(&persist.store_name, &value).await.expect("seed");
            let cache = enchant(EnchantConfig::new(1).with_query(rule.clone()), &storage);
            cache.restore_all_queries().await.expect("restore");
            cache.read_query(&node, None).expect("read")
        });

        let field = &persist.nest[0];
        prop_assert_eq!(&restored[field.as_str()], &expected[field.as_str()]);
    }
}
