// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The cache manager: orchestration across the memory and durable tiers.

use std::{
    collections::BTreeSet,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, warn};

use larder_memory::LruCache;
use larder_store::{CacheEntry, Clock, DurableStore, Ttl, codec};
use onceflight::Merger;

use crate::{
    builder::{CacheBuilder, CacheConfig},
    bus::{InvalidationBus, Subscription},
    error::CacheError,
    refresh::RefreshTracker,
};

/// Current and maximum memory-tier occupancy.
///
/// Returned by [`CacheManager::stats`]; observability only, no side effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries currently held in the memory tier.
    pub memory_size: usize,
    /// Maximum number of entries the memory tier holds.
    pub max_size: usize,
}

/// The two-tier cache manager.
///
/// One manager is created at process start and handed to every consumer by
/// cloning the handle; clones share all state. Payloads cross the API as
/// any `Serialize`/`DeserializeOwned` type and are held internally in
/// serialized form, so independent screens can cache heterogeneous data in
/// the one instance.
///
/// The manager guarantees, without any coordination from callers:
///
/// - at most one coordinated fetch in flight per key
///   ([`get_or_fetch`](Self::get_or_fetch) deduplicates concurrent calls);
/// - bounded memory (the in-process tier is a strict LRU);
/// - a warm restart ([`warm_up`](Self::warm_up) reloads persisted entries);
/// - storage trouble never reaches callers (the cache degrades to
///   memory-only and logs).
pub struct CacheManager<S> {
    pub(crate) inner: Arc<ManagerInner<S>>,
}

impl<S> Clone for CacheManager<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> std::fmt::Debug for CacheManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

pub(crate) struct ManagerInner<S> {
    pub(crate) config: CacheConfig,
    pub(crate) clock: Clock,
    pub(crate) store: S,
    pub(crate) memory: Mutex<LruCache<String, CacheEntry<Value>>>,
    pub(crate) flights: Merger<String, Result<Value, CacheError>>,
    pub(crate) warm_up: async_once_cell::OnceCell<()>,
    pub(crate) refresh: RefreshTracker,
    pub(crate) revisions: AtomicU64,
    pub(crate) bus: InvalidationBus,
}

/// Outcome of probing the memory tier for a valid entry.
enum MemoryLookup {
    Fresh(Value),
    Expired,
    Miss,
}

impl<S> CacheManager<S>
where
    S: DurableStore + Send + Sync + 'static,
{
    /// Creates a builder for a cache manager over the given durable store.
    #[must_use]
    pub fn builder(store: S) -> CacheBuilder<S> {
        CacheBuilder::new(store)
    }

    /// Returns the configuration fixed at construction.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Returns a reference to the cache's clock.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.inner.clock
    }

    /// Returns a reference to the durable store collaborator.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// Loads persisted entries into the memory tier.
    ///
    /// The scan runs at most once per process: concurrent calls share the
    /// in-flight completion and later calls are no-ops. Records that fail
    /// to decode or are already expired are discarded (and pruned from the
    /// store, best effort). If the store is unavailable the cache simply
    /// starts cold; this method never fails.
    pub async fn warm_up(&self) {
        self.inner.warm_up.get_or_init(self.inner.run_warm_up()).await;
    }

    /// Reads a value, checking the memory tier first and falling back to
    /// the durable store.
    ///
    /// A valid memory hit promotes the entry's recency. A valid durable hit
    /// is promoted into the memory tier. Expired records are dropped from
    /// whichever tier holds them, and an expired durable record is deleted.
    /// Absence, expiry, storage trouble, and type mismatches all read as
    /// `None`; none of them is an error.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let now = self.inner.clock.now();

        let lookup = {
            let mut memory = self.inner.memory.lock();
            let lookup = match memory.get(key) {
                Some(entry) if !entry.is_expired(now) => MemoryLookup::Fresh(entry.data().clone()),
                Some(_) => MemoryLookup::Expired,
                None => MemoryLookup::Miss,
            };
            if matches!(lookup, MemoryLookup::Expired) {
                memory.remove(key);
            }
            lookup
        };
        match lookup {
            MemoryLookup::Fresh(value) => return decode_payload(key, &value),
            MemoryLookup::Expired => debug!(key, "dropped expired in-memory entry"),
            MemoryLookup::Miss => {}
        }

        let entry = self.inner.read_durable(key).await?;
        if entry.is_expired(now) {
            debug!(key, "removing expired persisted entry");
            let storage_key = self.inner.storage_key(key);
            if let Err(error) = self.inner.store.remove(&storage_key).await {
                debug!(key, %error, "failed to remove expired persisted entry");
            }
            return None;
        }

        self.inner.note_revision(&entry);
        self.inner.memory.lock().insert(key.to_owned(), entry.clone());
        debug!(key, "promoted persisted entry into memory");
        decode_payload(key, entry.data())
    }

    /// Writes a value with the given TTL.
    ///
    /// The memory tier is written unconditionally; persistence is best
    /// effort (a durable-store failure is logged, and the call still
    /// succeeds because the in-memory write already took effect).
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Encode`] if the payload cannot be serialized,
    /// in which case nothing was written to either tier.
    pub async fn set<T: Serialize>(&self, key: &str, data: &T, ttl: Ttl) -> Result<(), CacheError> {
        let value = serde_json::to_value(data).map_err(|error| CacheError::encode(key, &error))?;
        self.inner.store_entry(key, value, ttl).await;
        Ok(())
    }

    /// Removes a key from both tiers and notifies its subscribers.
    ///
    /// Subscribers registered at the moment of the call are notified; a
    /// durable-store failure is logged and does not fail the invalidation.
    pub async fn invalidate(&self, key: &str) {
        self.inner.memory.lock().remove(key);
        if self.inner.config.persist_to_storage {
            let storage_key = self.inner.storage_key(key);
            if let Err(error) = self.inner.store.remove(&storage_key).await {
                warn!(key, %error, "durable remove failed during invalidation");
            }
        }
        self.inner.bus.notify(key);
        debug!(key, "invalidated");
    }

    /// Invalidates every key matching a regular expression.
    ///
    /// The pattern is matched against in-memory keys and against durable
    /// keys with the storage prefix stripped. Durable removals are batched
    /// into one bulk operation, and subscribers of each matched key are
    /// notified once.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Pattern`] if the pattern does not compile; no
    /// invalidation happens in that case.
    pub async fn invalidate_pattern(&self, pattern: &str) -> Result<(), CacheError> {
        let regex = regex::Regex::new(pattern).map_err(|error| CacheError::pattern(pattern, &error))?;

        let mut touched = BTreeSet::new();
        {
            let mut memory = self.inner.memory.lock();
            let matched: Vec<String> = memory.keys().filter(|key| regex.is_match(key)).cloned().collect();
            for key in matched {
                memory.remove(&key);
                touched.insert(key);
            }
        }

        if self.inner.config.persist_to_storage {
            match self.inner.store.list_keys(&self.inner.config.storage_prefix).await {
                Ok(storage_keys) => {
                    let mut doomed = Vec::new();
                    for storage_key in storage_keys {
                        let Some(key) = storage_key.strip_prefix(&self.inner.config.storage_prefix) else {
                            continue;
                        };
                        if regex.is_match(key) {
                            touched.insert(key.to_owned());
                            doomed.push(storage_key);
                        }
                    }
                    if !doomed.is_empty() {
                        if let Err(error) = self.inner.store.remove_many(&doomed).await {
                            warn!(pattern, %error, "durable bulk remove failed during pattern invalidation");
                        }
                    }
                }
                Err(error) => {
                    warn!(pattern, %error, "durable key listing failed during pattern invalidation");
                }
            }
        }

        for key in &touched {
            self.inner.bus.notify(key);
        }
        debug!(pattern, invalidated = touched.len(), "pattern invalidation complete");
        Ok(())
    }

    /// Unconditionally empties both tiers.
    ///
    /// This is a bulk reset, not a tracked invalidation: per-key
    /// subscribers are deliberately not notified.
    pub async fn clear(&self) {
        self.inner.memory.lock().clear();
        if self.inner.config.persist_to_storage {
            match self.inner.store.list_keys(&self.inner.config.storage_prefix).await {
                Ok(storage_keys) if !storage_keys.is_empty() => {
                    if let Err(error) = self.inner.store.remove_many(&storage_keys).await {
                        warn!(%error, "durable bulk remove failed during clear");
                    }
                }
                Ok(_) => {}
                Err(error) => {
                    warn!(%error, "durable key listing failed during clear");
                }
            }
        }
        debug!("cache cleared");
    }

    /// Returns the stored revision for a key, without touching recency.
    ///
    /// Revisions are a monotonic write counter; callers compare them to
    /// detect change without comparing payloads.
    pub async fn revision(&self, key: &str) -> Option<u64> {
        let now = self.inner.clock.now();
        {
            let memory = self.inner.memory.lock();
            if let Some(entry) = memory.peek(key) {
                if !entry.is_expired(now) {
                    return Some(entry.revision());
                }
            }
        }
        let entry = self.inner.read_durable(key).await?;
        (!entry.is_expired(now)).then_some(entry.revision())
    }

    /// Registers a callback invoked whenever `key` is invalidated.
    ///
    /// The registration lives as long as the returned [`Subscription`];
    /// multiple subscribers per key are supported and removed
    /// independently. [`clear`](Self::clear) does not fire callbacks.
    pub fn on_invalidate(&self, key: &str, callback: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.inner.bus.subscribe(key, callback)
    }

    /// Returns current and maximum memory-tier occupancy.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let memory = self.inner.memory.lock();
        CacheStats {
            memory_size: memory.len(),
            max_size: memory.capacity(),
        }
    }
}

impl<S> ManagerInner<S>
where
    S: DurableStore + Send + Sync + 'static,
{
    pub(crate) fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.config.storage_prefix, key)
    }

    pub(crate) fn next_revision(&self) -> u64 {
        self.revisions.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Keeps the revision counter ahead of any revision observed in the
    /// durable store, so writes after a warm restart stay monotonic.
    pub(crate) fn note_revision(&self, entry: &CacheEntry<Value>) {
        self.revisions.fetch_max(entry.revision(), Ordering::Relaxed);
    }

    /// Writes an entry to the memory tier and best-effort persists it.
    pub(crate) async fn store_entry(&self, key: &str, value: Value, ttl: Ttl) {
        let entry = CacheEntry::new(value, self.clock.now(), ttl).with_revision(self.next_revision());
        self.memory.lock().insert(key.to_owned(), entry.clone());
        self.persist(key, &entry).await;
    }

    async fn persist(&self, key: &str, entry: &CacheEntry<Value>) {
        if !self.config.persist_to_storage {
            return;
        }
        let raw = match codec::encode(entry) {
            Ok(raw) => raw,
            Err(error) => {
                warn!(key, %error, "failed to encode entry for persistence");
                return;
            }
        };
        if let Err(error) = self.store.set(&self.storage_key(key), &raw).await {
            warn!(key, %error, "durable write failed; entry is cached in memory only");
        }
    }

    /// Reads and decodes a persisted entry without expiry-checking it.
    ///
    /// Storage trouble degrades to `None`; an undecodable record is dropped
    /// from the store so restarts stop re-reading it.
    pub(crate) async fn read_durable(&self, key: &str) -> Option<CacheEntry<Value>> {
        if !self.config.persist_to_storage {
            return None;
        }
        let storage_key = self.storage_key(key);
        let raw = match self.store.get(&storage_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(error) => {
                warn!(key, %error, "durable read failed; continuing memory-only");
                return None;
            }
        };
        match codec::decode(&raw) {
            Ok(entry) => Some(entry),
            Err(error) => {
                debug!(key, %error, "dropping undecodable persisted entry");
                if let Err(error) = self.store.remove(&storage_key).await {
                    debug!(key, %error, "failed to remove undecodable persisted entry");
                }
                None
            }
        }
    }

    /// Probes both tiers for an entry regardless of expiry, promoting a
    /// durable hit into memory. Used by the fetch path, which serves stale
    /// entries under stale-while-revalidate.
    pub(crate) async fn lookup_entry(&self, key: &str) -> Option<CacheEntry<Value>> {
        if let Some(entry) = self.memory.lock().get(key).cloned() {
            return Some(entry);
        }
        let entry = self.read_durable(key).await?;
        self.note_revision(&entry);
        self.memory.lock().insert(key.to_owned(), entry.clone());
        debug!(key, "promoted persisted entry into memory");
        Some(entry)
    }

    async fn run_warm_up(&self) {
        if !self.config.persist_to_storage {
            debug!("persistence disabled; warm-up is a no-op");
            return;
        }
        let prefix = &self.config.storage_prefix;
        let storage_keys = match self.store.list_keys(prefix).await {
            Ok(keys) => keys,
            Err(error) => {
                warn!(%error, "cache warm-up aborted; starting cold");
                return;
            }
        };
        if storage_keys.is_empty() {
            debug!("cache warm-up found no persisted entries");
            return;
        }
        let rows = match self.store.get_many(&storage_keys).await {
            Ok(rows) => rows,
            Err(error) => {
                warn!(%error, "cache warm-up bulk read failed; starting cold");
                return;
            }
        };

        let now = self.clock.now();
        let mut dead = Vec::new();
        let mut loaded = 0_usize;
        {
            let mut memory = self.memory.lock();
            for (storage_key, raw) in rows {
                let Some(raw) = raw else { continue };
                let Some(key) = storage_key.strip_prefix(prefix).map(ToOwned::to_owned) else {
                    continue;
                };
                match codec::decode(&raw) {
                    Ok(entry) if entry.is_expired(now) => dead.push(storage_key),
                    Ok(entry) => {
                        self.note_revision(&entry);
                        memory.insert(key, entry);
                        loaded += 1;
                    }
                    Err(error) => {
                        debug!(key = %storage_key, %error, "warm-up is dropping an undecodable record");
                        dead.push(storage_key);
                    }
                }
            }
        }

        if !dead.is_empty() {
            if let Err(error) = self.store.remove_many(&dead).await {
                debug!(%error, "failed to prune dead records during warm-up");
            }
        }
        debug!(loaded, pruned = dead.len(), "cache warm-up complete");
    }
}

fn decode_payload<T: DeserializeOwned>(key: &str, value: &Value) -> Option<T> {
    match serde_json::from_value(value.clone()) {
        Ok(data) => Some(data),
        Err(error) => {
            debug!(key, %error, "cached payload does not match the requested type");
            None
        }
    }
}
