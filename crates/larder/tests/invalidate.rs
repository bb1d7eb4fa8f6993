// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Invalidation: single keys, patterns, bulk clear, and the notification
//! bus.

use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use larder::{CacheError, CacheManager, Ttl};
use larder_store::testing::MemoryStore;

fn counter() -> (Arc<AtomicU32>, impl Fn() + Send + Sync + 'static) {
    let hits = Arc::new(AtomicU32::new(0));
    let callback = {
        let hits = Arc::clone(&hits);
        move || {
            hits.fetch_add(1, Ordering::SeqCst);
        }
    };
    (hits, callback)
}

#[tokio::test]
async fn invalidate_round_trip_fires_each_listener_once() {
    let store = MemoryStore::new();
    let cache = CacheManager::builder(store.clone()).build();
    let (hits, callback) = counter();

    cache.set("products", &vec!["widget"], Ttl::Infinite).await.expect("set");
    let subscription = cache.on_invalidate("products", callback);

    cache.invalidate("products").await;

    assert_eq!(cache.get::<Vec<String>>("products").await, None);
    assert!(!store.contains_key("cache:products"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    subscription.unsubscribe();
}

#[tokio::test]
async fn dropped_subscriptions_are_not_notified() {
    let cache = CacheManager::builder(MemoryStore::new()).build();
    let (hits, callback) = counter();

    drop(cache.on_invalidate("k", callback));
    cache.invalidate("k").await;

    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn pattern_invalidation_removes_matches_and_spares_the_rest() {
    let store = MemoryStore::new();
    let cache = CacheManager::builder(store.clone()).build();

    cache.set("products", &1, Ttl::Infinite).await.expect("set");
    cache.set("product_1", &2, Ttl::Infinite).await.expect("set");
    cache.set("categories", &3, Ttl::Infinite).await.expect("set");

    cache.invalidate_pattern("^product").await.expect("pattern");

    assert_eq!(cache.get::<i32>("products").await, None);
    assert_eq!(cache.get::<i32>("product_1").await, None);
    assert_eq!(cache.get::<i32>("categories").await, Some(3));

    assert!(!store.contains_key("cache:products"));
    assert!(!store.contains_key("cache:product_1"));
    assert!(store.contains_key("cache:categories"));
}

#[tokio::test]
async fn pattern_invalidation_notifies_each_matched_key_once() {
    let cache = CacheManager::builder(MemoryStore::new()).build();
    let (product_hits, product_callback) = counter();
    let (category_hits, category_callback) = counter();

    cache.set("products", &1, Ttl::Infinite).await.expect("set");
    cache.set("product_1", &2, Ttl::Infinite).await.expect("set");
    cache.set("categories", &3, Ttl::Infinite).await.expect("set");

    let keep_products = cache.on_invalidate("products", product_callback);
    let keep_categories = cache.on_invalidate("categories", category_callback);

    cache.invalidate_pattern("^product").await.expect("pattern");

    assert_eq!(product_hits.load(Ordering::SeqCst), 1);
    assert_eq!(category_hits.load(Ordering::SeqCst), 0);
    drop((keep_products, keep_categories));
}

#[tokio::test]
async fn pattern_invalidation_reaches_durable_only_keys() {
    let store = MemoryStore::new();
    let writer = CacheManager::builder(store.clone()).build();
    writer.set("product_9", &9, Ttl::Infinite).await.expect("set");

    // A cold manager has no memory copy of the key, only the store does.
    let cold = CacheManager::builder(store.clone()).build();
    cold.invalidate_pattern("^product").await.expect("pattern");

    assert!(!store.contains_key("cache:product_9"));
}

#[tokio::test]
async fn an_invalid_pattern_is_rejected_up_front() {
    let cache = CacheManager::builder(MemoryStore::new()).build();
    cache.set("products", &1, Ttl::Infinite).await.expect("set");

    let outcome = cache.invalidate_pattern("(unclosed").await;

    assert!(matches!(outcome, Err(CacheError::Pattern { .. })));
    // Nothing was invalidated.
    assert_eq!(cache.get::<i32>("products").await, Some(1));
}

#[tokio::test]
async fn clear_empties_both_tiers_without_notifying() {
    let store = MemoryStore::new();
    let cache = CacheManager::builder(store.clone()).build();
    let (hits, callback) = counter();

    cache.set("a", &1, Ttl::Infinite).await.expect("set");
    cache.set("b", &2, Ttl::Infinite).await.expect("set");
    let subscription = cache.on_invalidate("a", callback);

    cache.clear().await;

    assert_eq!(cache.stats().memory_size, 0);
    assert_eq!(store.entry_count(), 0);
    assert_eq!(cache.get::<i32>("a").await, None);
    // A bulk reset is not a tracked invalidation.
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    subscription.unsubscribe();
}

#[tokio::test]
async fn clear_leaves_foreign_records_alone() {
    let store = MemoryStore::with_data([("other:config".to_owned(), "{}".to_owned())]);
    let cache = CacheManager::builder(store.clone()).build();

    cache.set("a", &1, Ttl::Infinite).await.expect("set");
    cache.clear().await;

    // Only records under the cache's own prefix are touched.
    assert!(store.contains_key("other:config"));
    assert_eq!(store.entry_count(), 1);
}
