// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Coordinated fetch behavior: single-flight, stale-while-revalidate,
//! forced refresh, and fetch deadlines.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use larder::{CacheError, CacheManager, Clock, FetchOptions, Ttl};
use larder_store::testing::MemoryStore;

type IoError = std::io::Error;

fn counting_fetcher(calls: &Arc<AtomicU32>, value: i32) -> impl (FnOnce() -> std::future::Ready<Result<i32, IoError>>) + Send + 'static {
    let calls = Arc::clone(calls);
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
        std::future::ready(Ok(value))
    }
}

/// Lets detached revalidation tasks run to completion on the test runtime.
async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn fetches_on_miss_and_serves_fresh_hits_without_fetching() {
    let cache = CacheManager::builder(MemoryStore::new()).build();
    let calls = Arc::new(AtomicU32::new(0));

    let first = cache
        .get_or_fetch("products", counting_fetcher(&calls, 7), FetchOptions::default())
        .await;
    assert_eq!(first, Ok(7));

    // Fresh hit: this fetcher's value is never used.
    let second = cache
        .get_or_fetch("products", counting_fetcher(&calls, 99), FetchOptions::default())
        .await;
    assert_eq!(second, Ok(7));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_callers_invoke_the_fetcher_exactly_once() {
    let cache = CacheManager::builder(MemoryStore::new()).build();
    let calls = Arc::new(AtomicU32::new(0));
    let (release, gate) = tokio::sync::oneshot::channel::<()>();

    let leader = {
        let calls = Arc::clone(&calls);
        cache.get_or_fetch("roster", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            gate.await.expect("gate sender dropped");
            Ok::<_, IoError>(42)
        }, FetchOptions::default())
    };
    let follower_a = cache.get_or_fetch("roster", counting_fetcher(&calls, 1), FetchOptions::default());
    let follower_b = cache.get_or_fetch("roster", counting_fetcher(&calls, 2), FetchOptions::default());
    let release_task = async move {
        tokio::task::yield_now().await;
        release.send(()).expect("leader went away");
    };

    let (a, b, c, ()) = tokio::join!(leader, follower_a, follower_b, release_task);

    assert_eq!((a, b, c), (Ok(42), Ok(42), Ok(42)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fetch_failures_are_shared_and_cache_nothing() {
    let cache = CacheManager::builder(MemoryStore::new()).build();
    let calls = Arc::new(AtomicU32::new(0));
    let (release, gate) = tokio::sync::oneshot::channel::<()>();

    let leader = {
        let calls = Arc::clone(&calls);
        cache.get_or_fetch::<i32, IoError, _, _>("flaky", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            gate.await.expect("gate sender dropped");
            Err(IoError::other("api down"))
        }, FetchOptions::default())
    };
    let follower = cache.get_or_fetch("flaky", counting_fetcher(&calls, 5), FetchOptions::default());
    let release_task = async move {
        tokio::task::yield_now().await;
        release.send(()).expect("leader went away");
    };

    let (leader_outcome, follower_outcome, ()) = tokio::join!(leader, follower, release_task);

    let expected = CacheError::Fetch {
        key: "flaky".to_owned(),
        message: "api down".to_owned(),
    };
    assert_eq!(leader_outcome, Err(expected.clone()));
    assert_eq!(follower_outcome, Err(expected));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Nothing was cached, so the next call retries and can succeed.
    let retried = cache.get_or_fetch("flaky", counting_fetcher(&calls, 5), FetchOptions::default()).await;
    assert_eq!(retried, Ok(5));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn stale_values_are_served_while_revalidating() {
    let clock = Clock::new_frozen();
    let cache = CacheManager::builder(MemoryStore::new()).clock(clock.clone()).build();
    let calls = Arc::new(AtomicU32::new(0));

    let options = FetchOptions {
        ttl: Ttl::secs(60),
        ..FetchOptions::default()
    };
    assert_eq!(cache.get_or_fetch("feed", counting_fetcher(&calls, 1), options).await, Ok(1));

    clock.advance(Duration::from_secs(120));

    // Stale: the old value comes back immediately...
    assert_eq!(cache.get_or_fetch("feed", counting_fetcher(&calls, 2), options).await, Ok(1));

    // ...and the detached revalidation lands the fresh one.
    settle().await;
    assert_eq!(cache.get::<i32>("feed").await, Some(2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn stale_without_revalidation_fetches_inline() {
    let clock = Clock::new_frozen();
    let cache = CacheManager::builder(MemoryStore::new()).clock(clock.clone()).build();
    let calls = Arc::new(AtomicU32::new(0));

    let options = FetchOptions {
        ttl: Ttl::secs(60),
        stale_while_revalidate: false,
        ..FetchOptions::default()
    };
    assert_eq!(cache.get_or_fetch("feed", counting_fetcher(&calls, 1), options).await, Ok(1));

    clock.advance(Duration::from_secs(120));

    assert_eq!(cache.get_or_fetch("feed", counting_fetcher(&calls, 2), options).await, Ok(2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn background_refresh_failures_are_swallowed() {
    let clock = Clock::new_frozen();
    let cache = CacheManager::builder(MemoryStore::new()).clock(clock.clone()).build();
    let calls = Arc::new(AtomicU32::new(0));

    let options = FetchOptions {
        ttl: Ttl::secs(60),
        ..FetchOptions::default()
    };
    assert_eq!(cache.get_or_fetch("feed", counting_fetcher(&calls, 1), options).await, Ok(1));
    clock.advance(Duration::from_secs(120));

    let failing = {
        let calls = Arc::clone(&calls);
        move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<i32, _>(IoError::other("api down"))
        }
    };
    // The stale value is served; the refresh failure has no caller to reach.
    assert_eq!(cache.get_or_fetch("feed", failing, options).await, Ok(1));
    settle().await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    // Still stale, still served.
    assert_eq!(cache.get_or_fetch("feed", counting_fetcher(&calls, 3), options).await, Ok(1));
}

#[tokio::test]
async fn force_refresh_bypasses_a_fresh_cache() {
    let cache = CacheManager::builder(MemoryStore::new()).build();
    let calls = Arc::new(AtomicU32::new(0));

    assert_eq!(
        cache.get_or_fetch("profile", counting_fetcher(&calls, 1), FetchOptions::default()).await,
        Ok(1)
    );

    let forced = FetchOptions {
        force_refresh: true,
        ..FetchOptions::default()
    };
    assert_eq!(cache.get_or_fetch("profile", counting_fetcher(&calls, 2), forced).await, Ok(2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.get::<i32>("profile").await, Some(2));
}

#[tokio::test(start_paused = true)]
async fn a_hung_fetcher_times_out_and_releases_its_registration() {
    let cache = CacheManager::builder(MemoryStore::new())
        .fetch_timeout(Duration::from_secs(5))
        .build();

    let outcome = cache
        .get_or_fetch::<i32, IoError, _, _>("slow", || std::future::pending(), FetchOptions::default())
        .await;
    assert_eq!(
        outcome,
        Err(CacheError::FetchTimeout {
            key: "slow".to_owned(),
            timeout: Duration::from_secs(5),
        })
    );

    // The pending registration was evicted, so a new fetch can run.
    let calls = Arc::new(AtomicU32::new(0));
    let retried = cache.get_or_fetch("slow", counting_fetcher(&calls, 8), FetchOptions::default()).await;
    assert_eq!(retried, Ok(8));
}
