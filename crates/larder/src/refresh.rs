// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Background revalidation of stale entries.
//!
//! When a stale value is served under stale-while-revalidate, the fetch
//! runs in a detached task. The task is intentionally unsupervised: it is
//! not registered with the request coordinator, nobody awaits it, and its
//! failure path is logging only. A per-key in-flight set keeps repeated
//! stale reads from stacking up duplicate refreshes.

use std::{collections::HashSet, sync::Arc};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use larder_store::{DurableStore, Ttl};

use crate::manager::ManagerInner;

/// Tracks which keys currently have a background refresh in flight.
#[derive(Debug, Default)]
pub(crate) struct RefreshTracker {
    in_flight: Mutex<HashSet<String>>,
}

impl RefreshTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if this key was successfully marked as in flight
    /// (i.e. no refresh was already running for it).
    pub(crate) fn try_begin(&self, key: &str) -> bool {
        self.in_flight.lock().insert(key.to_owned())
    }

    /// Marks the key as no longer in flight.
    pub(crate) fn finish(&self, key: &str) {
        self.in_flight.lock().remove(key);
    }
}

/// Spawns a detached refresh for `key` unless one is already running.
///
/// On success the result is stored through the normal write path; on
/// failure there is no caller to report to, so the error is logged and
/// dropped. The in-flight mark is cleared either way.
pub(crate) fn spawn_refresh<S, T, E, F, Fut>(inner: &Arc<ManagerInner<S>>, key: &str, fetcher: F, ttl: Ttl)
where
    S: DurableStore + Send + Sync + 'static,
    T: Serialize + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    if !inner.refresh.try_begin(key) {
        debug!(key, "revalidation already in flight; not spawning another");
        return;
    }

    let inner = Arc::clone(inner);
    let key = key.to_owned();
    tokio::spawn(async move {
        match fetcher().await {
            Ok(data) => match serde_json::to_value(&data) {
                Ok(value) => {
                    inner.store_entry(&key, value, ttl).await;
                    debug!(key = %key, "background revalidation stored a fresh value");
                }
                Err(error) => {
                    warn!(key = %key, %error, "background revalidation produced an unserializable payload");
                }
            },
            Err(error) => {
                warn!(key = %key, %error, "background revalidation failed");
            }
        }
        inner.refresh.finish(&key);
    });
}
