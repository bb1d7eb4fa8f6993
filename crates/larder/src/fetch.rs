// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Coordinated fetches with stale-while-revalidate.
//!
//! `get_or_fetch` resolves a key through four states: **Pending** (join the
//! in-flight fetch), **Fresh** (serve the cached value), **Stale** (serve
//! it anyway and revalidate in the background), and **Absent** (fetch,
//! store, and share the outcome). The whole check-then-fetch decision runs
//! inside the request coordinator, so concurrent callers can never race
//! past each other into duplicate fetches.

use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::debug;

use larder_store::{DurableStore, Ttl};

use crate::{CacheError, CacheManager, manager::ManagerInner, refresh::spawn_refresh};

/// Per-call options for [`CacheManager::get_or_fetch`].
///
/// # Examples
///
/// ```
/// use larder::{FetchOptions, Ttl};
///
/// let options = FetchOptions {
///     ttl: Ttl::minutes(10),
///     force_refresh: true,
///     ..FetchOptions::default()
/// };
/// assert!(options.stale_while_revalidate);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchOptions {
    /// TTL applied to a value stored by this call. Defaults to 5 minutes.
    pub ttl: Ttl,
    /// Skip every cached state and fetch now. The new fetch replaces any
    /// in-flight one for the key; callers of the replaced fetch still get
    /// its result. Defaults to `false`.
    pub force_refresh: bool,
    /// Serve a stale value immediately and refresh it in the background,
    /// instead of blocking on the fetch. Defaults to `true`.
    pub stale_while_revalidate: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            ttl: Ttl::minutes(5),
            force_refresh: false,
            stale_while_revalidate: true,
        }
    }
}

impl<S> CacheManager<S>
where
    S: DurableStore + Send + Sync + 'static,
{
    /// Reads a value, fetching and caching it if the cache cannot serve it.
    ///
    /// Concurrent calls for the same key coalesce: with `force_refresh`
    /// off, any number of overlapping callers invoke `fetcher` exactly once
    /// and share the one outcome, success or failure. A fresh cached value
    /// is returned without fetching; a stale one is returned immediately
    /// while a detached revalidation runs (when `stale_while_revalidate` is
    /// on). Fetch failures are shared with every waiter and nothing is
    /// cached, so the next call retries.
    ///
    /// # Errors
    ///
    /// - [`CacheError::Fetch`] when the fetcher fails and no cached state
    ///   absorbed the call;
    /// - [`CacheError::FetchTimeout`] when a configured fetch deadline
    ///   elapses;
    /// - [`CacheError::Encode`] / [`CacheError::Decode`] when the payload
    ///   cannot cross the serialization boundary.
    pub async fn get_or_fetch<T, E, F, Fut>(&self, key: &str, fetcher: F, options: FetchOptions) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let key = key.to_owned();
        let make = {
            let inner = Arc::clone(&self.inner);
            let key = key.clone();
            move || run_flight(inner, key, fetcher, options)
        };

        let outcome = if options.force_refresh {
            self.inner.flights.lead(&key, make).await
        } else {
            self.inner.flights.execute(&key, make).await
        };

        let value = outcome?;
        serde_json::from_value(value).map_err(|error| CacheError::decode(&key, &error))
    }
}

/// The flight body: one of these runs per coordinated fetch, and every
/// coalesced caller shares its outcome.
async fn run_flight<S, T, E, F, Fut>(
    inner: Arc<ManagerInner<S>>,
    key: String,
    fetcher: F,
    options: FetchOptions,
) -> Result<Value, CacheError>
where
    S: DurableStore + Send + Sync + 'static,
    T: Serialize + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    if !options.force_refresh {
        if let Some(entry) = inner.lookup_entry(&key).await {
            let now = inner.clock.now();
            if !entry.is_expired(now) {
                debug!(key = %key, "serving fresh cached value");
                return Ok(entry.into_data());
            }
            if options.stale_while_revalidate {
                debug!(key = %key, "serving stale value; revalidating in the background");
                spawn_refresh(&inner, &key, fetcher, options.ttl);
                return Ok(entry.into_data());
            }
            debug!(key = %key, "stale value with revalidation disabled; fetching inline");
        }
    }
    fetch_and_store(&inner, &key, fetcher, options).await
}

/// Runs the fetcher (under the configured deadline, if any) and stores a
/// successful result through the normal write path. Failures cache
/// nothing.
async fn fetch_and_store<S, T, E, Fut>(
    inner: &Arc<ManagerInner<S>>,
    key: &str,
    fetcher: impl FnOnce() -> Fut,
    options: FetchOptions,
) -> Result<Value, CacheError>
where
    S: DurableStore + Send + Sync + 'static,
    T: Serialize,
    E: std::error::Error + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>>,
{
    let fetched = match inner.config.fetch_timeout {
        Some(limit) => match tokio::time::timeout(limit, fetcher()).await {
            Ok(result) => result.map_err(|error| CacheError::fetch(key, &error)),
            Err(_) => Err(CacheError::fetch_timeout(key, limit)),
        },
        None => fetcher().await.map_err(|error| CacheError::fetch(key, &error)),
    }?;

    let value = serde_json::to_value(&fetched).map_err(|error| CacheError::encode(key, &error))?;
    inner.store_entry(key, value.clone(), options.ttl).await;
    Ok(value)
}
