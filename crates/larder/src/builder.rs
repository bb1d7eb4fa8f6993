// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Configuration and construction of the cache manager.

use std::{
    sync::{Arc, atomic::AtomicU64},
    time::Duration,
};

use parking_lot::Mutex;

use larder_memory::LruCache;
use larder_store::{Clock, DurableStore};
use onceflight::Merger;

use crate::{
    bus::InvalidationBus,
    manager::{CacheManager, ManagerInner},
    refresh::RefreshTracker,
};

/// Cache configuration, fixed at construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries in the memory tier.
    pub max_memory_items: usize,
    /// Whether entries are written through to the durable store.
    pub persist_to_storage: bool,
    /// Prefix applied to every durable key, namespacing the cache's
    /// records within the shared store.
    pub storage_prefix: String,
    /// Optional deadline for coordinated fetches. When a fetcher exceeds
    /// it, waiters fail with a timeout and the pending registration is
    /// released; when `None`, a hung fetcher leaves its key pending.
    pub fetch_timeout: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_memory_items: 100,
            persist_to_storage: true,
            storage_prefix: "cache:".to_owned(),
            fetch_timeout: None,
        }
    }
}

/// Builder for [`CacheManager`].
///
/// # Examples
///
/// ```ignore
/// let cache = CacheManager::builder(store)
///     .max_memory_items(500)
///     .storage_prefix("app:")
///     .build();
/// ```
pub struct CacheBuilder<S> {
    store: S,
    clock: Clock,
    config: CacheConfig,
}

impl<S> std::fmt::Debug for CacheBuilder<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S> CacheBuilder<S>
where
    S: DurableStore + Send + Sync + 'static,
{
    pub(crate) fn new(store: S) -> Self {
        Self {
            store,
            clock: Clock::new(),
            config: CacheConfig::default(),
        }
    }

    /// Uses the given clock for timestamps and expiry checks.
    #[must_use]
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the memory-tier capacity.
    #[must_use]
    pub fn max_memory_items(mut self, max_memory_items: usize) -> Self {
        self.config.max_memory_items = max_memory_items;
        self
    }

    /// Enables or disables write-through to the durable store.
    #[must_use]
    pub fn persist_to_storage(mut self, persist: bool) -> Self {
        self.config.persist_to_storage = persist;
        self
    }

    /// Sets the prefix applied to every durable key.
    #[must_use]
    pub fn storage_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.storage_prefix = prefix.into();
        self
    }

    /// Bounds every coordinated fetch by a deadline.
    #[must_use]
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetch_timeout = Some(timeout);
        self
    }

    /// Replaces the whole configuration at once.
    #[must_use]
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the cache manager.
    #[must_use]
    pub fn build(self) -> CacheManager<S> {
        let memory = LruCache::new(self.config.max_memory_items);
        CacheManager {
            inner: Arc::new(ManagerInner {
                config: self.config,
                clock: self.clock,
                store: self.store,
                memory: Mutex::new(memory),
                flights: Merger::new(),
                warm_up: async_once_cell::OnceCell::new(),
                refresh: RefreshTracker::new(),
                revisions: AtomicU64::new(0),
                bus: InvalidationBus::new(),
            }),
        }
    }
}
