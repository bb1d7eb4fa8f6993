// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-key invalidation notifications.
//!
//! Consumers subscribe a callback under a key and receive a call whenever
//! that key is invalidated. Registrations are explicit handles: dropping a
//! [`Subscription`] removes exactly that callback, and a key's subscriber
//! set is garbage-collected when it empties.

use std::{
    collections::HashMap,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;
use tracing::warn;

type Listener = Arc<dyn Fn() + Send + Sync>;
type Registry = HashMap<String, HashMap<u64, Listener>>;

pub(crate) struct InvalidationBus {
    listeners: Arc<Mutex<Registry>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for InvalidationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationBus").finish_non_exhaustive()
    }
}

impl InvalidationBus {
    pub(crate) fn new() -> Self {
        Self {
            listeners: Arc::default(),
            next_id: AtomicU64::new(0),
        }
    }

    pub(crate) fn subscribe(&self, key: &str, callback: impl Fn() + Send + Sync + 'static) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .entry(key.to_owned())
            .or_default()
            .insert(id, Arc::new(callback));
        Subscription {
            key: key.to_owned(),
            id,
            registry: Arc::downgrade(&self.listeners),
        }
    }

    /// Notifies every callback registered for `key`.
    ///
    /// The subscriber set is snapshotted before any callback runs, so a
    /// subscriber added during notification is not called this round. A
    /// panicking callback is contained and logged so its siblings and the
    /// invalidation itself proceed.
    pub(crate) fn notify(&self, key: &str) {
        let snapshot: Vec<Listener> = {
            let listeners = self.listeners.lock();
            listeners
                .get(key)
                .map(|set| set.values().cloned().collect())
                .unwrap_or_default()
        };
        for listener in snapshot {
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener())).is_err() {
                warn!(key, "invalidation listener panicked");
            }
        }
    }

    #[cfg(test)]
    fn listener_count(&self, key: &str) -> usize {
        self.listeners.lock().get(key).map_or(0, HashMap::len)
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.listeners.lock().len()
    }
}

/// A registered invalidation callback.
///
/// Returned by [`CacheManager::on_invalidate`](crate::CacheManager::on_invalidate).
/// The registration lives exactly as long as this handle: dropping it (or
/// calling [`unsubscribe`](Subscription::unsubscribe)) removes the callback
/// without affecting other subscribers of the same key.
#[must_use = "dropping a Subscription immediately unsubscribes its callback"]
pub struct Subscription {
    key: String,
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Removes the registration. Equivalent to dropping the handle.
    pub fn unsubscribe(self) {}

    /// The key this subscription listens on.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("key", &self.key).field("id", &self.id).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut listeners = registry.lock();
            if let Some(set) = listeners.get_mut(&self.key) {
                set.remove(&self.id);
                if set.is_empty() {
                    listeners.remove(&self.key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn every_subscriber_of_a_key_is_notified() {
        let bus = InvalidationBus::new();
        let hits = Arc::new(AtomicU32::new(0));

        let first = {
            let hits = Arc::clone(&hits);
            bus.subscribe("products", move || {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        let second = {
            let hits = Arc::clone(&hits);
            bus.subscribe("products", move || {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };

        bus.notify("products");
        bus.notify("unrelated");

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        drop((first, second));
    }

    #[test]
    fn unsubscribe_removes_only_that_callback() {
        let bus = InvalidationBus::new();
        let hits = Arc::new(AtomicU32::new(0));

        let keep = {
            let hits = Arc::clone(&hits);
            bus.subscribe("k", move || {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        let dropped = bus.subscribe("k", || {});
        dropped.unsubscribe();

        assert_eq!(bus.listener_count("k"), 1);
        bus.notify("k");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        drop(keep);
    }

    #[test]
    fn empty_subscriber_sets_are_garbage_collected() {
        let bus = InvalidationBus::new();
        let only = bus.subscribe("k", || {});

        assert_eq!(bus.tracked_keys(), 1);
        drop(only);
        assert_eq!(bus.tracked_keys(), 0);
    }

    #[test]
    fn a_panicking_listener_does_not_break_its_siblings() {
        let bus = InvalidationBus::new();
        let hits = Arc::new(AtomicU32::new(0));

        let panicky = bus.subscribe("k", || panic!("listener bug"));
        let counting = {
            let hits = Arc::clone(&hits);
            bus.subscribe("k", move || {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };

        bus.notify("k");

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        drop((panicky, counting));
    }

    #[test]
    fn subscription_outliving_the_bus_is_inert() {
        let bus = InvalidationBus::new();
        let subscription = bus.subscribe("k", || {});
        drop(bus);
        subscription.unsubscribe();
    }
}
