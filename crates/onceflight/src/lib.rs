// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Coalesces duplicate async work into a single shared execution.
//!
//! This crate provides [`Merger`], a mechanism for deduplicating concurrent
//! async operations. When multiple tasks request the same work (identified
//! by a key), only the first registers an execution; the rest await a clone
//! of its outcome. A cache uses this to guarantee that a burst of identical
//! requests invokes the underlying fetch exactly once.
//!
//! # Example
//!
//! ```
//! use onceflight::Merger;
//!
//! # futures::executor::block_on(async {
//! let merger: Merger<String, String> = Merger::new();
//!
//! // Concurrent calls with the same key share a single execution.
//! let value = merger
//!     .execute(&"user:123".to_string(), || async {
//!         // This expensive operation runs once even under a request burst.
//!         "profile".to_string()
//!     })
//!     .await;
//! assert_eq!(value, "profile");
//! # });
//! ```
//!
//! # Completion and cleanup
//!
//! The registered work removes its own registration as its final step, so a
//! finished flight never blocks later calls, no matter which waiter drove
//! it to completion. If every waiter is cancelled before the work finishes,
//! the registration stays behind and the next caller for that key resumes
//! the same work where it left off.
//!
//! # Replacement
//!
//! [`Merger::lead`] registers fresh work even when a flight is already
//! registered, which is how forced refreshes skip coalescing. Waiters
//! already attached to the replaced flight still complete from it; new
//! callers join the replacement.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;

type Registry<K, T> = Arc<Mutex<HashMap<K, Flight<T>>>>;

struct Flight<T> {
    id: u64,
    shared: Shared<BoxFuture<'static, T>>,
}

impl<T> Clone for Flight<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            shared: self.shared.clone(),
        }
    }
}

/// Deduplicates concurrent async work per key.
///
/// Outcomes must be `Clone` because every coalesced waiter receives one.
/// For fallible work, use a cloneable `Result` as the outcome type so
/// failures are shared with all waiters too.
pub struct Merger<K, T> {
    flights: Registry<K, T>,
    next_id: AtomicU64,
}

impl<K, T> std::fmt::Debug for Merger<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Merger").finish_non_exhaustive()
    }
}

impl<K, T> Default for Merger<K, T> {
    fn default() -> Self {
        Self {
            flights: Arc::default(),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<K, T> Merger<K, T> {
    /// Creates a new, empty merger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of registered flights.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flights.lock().len()
    }

    /// Returns `true` if no flight is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flights.lock().is_empty()
    }
}

impl<K, T> Merger<K, T>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Executes work for a key, coalescing with any registered flight.
    ///
    /// If a flight for `key` is already registered, `make` is not called
    /// and the existing outcome is awaited. Otherwise `make` produces the
    /// work, which is registered before this call first yields; the
    /// check-then-register step is atomic, so concurrent callers can never
    /// both start work for one key.
    pub async fn execute<F, Fut>(&self, key: &K, make: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let shared = {
            let mut flights = self.flights.lock();
            if let Some(flight) = flights.get(key) {
                flight.shared.clone()
            } else {
                self.register(&mut flights, key, make)
            }
        };
        shared.await
    }

    /// Executes work for a key, replacing any registered flight.
    ///
    /// Waiters attached to the replaced flight still complete from it; this
    /// call and later [`execute`](Self::execute) calls use the new work.
    pub async fn lead<F, Fut>(&self, key: &K, make: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let shared = {
            let mut flights = self.flights.lock();
            self.register(&mut flights, key, make)
        };
        shared.await
    }

    /// Returns `true` if a flight is registered for the key.
    #[must_use]
    pub fn in_flight(&self, key: &K) -> bool {
        self.flights.lock().contains_key(key)
    }

    fn register<F, Fut>(&self, flights: &mut HashMap<K, Flight<T>>, key: &K, make: F) -> Shared<BoxFuture<'static, T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::clone(&self.flights);
        let cleanup_key = key.clone();
        let work = make();

        // The work itself releases the registration, id-checked so a stale
        // completion never tears down a replacement flight.
        let shared = async move {
            let outcome = work.await;
            let mut flights = registry.lock();
            if flights.get(&cleanup_key).is_some_and(|flight| flight.id == id) {
                flights.remove(&cleanup_key);
            }
            drop(flights);
            outcome
        }
        .boxed()
        .shared();

        flights.insert(
            key.clone(),
            Flight {
                id,
                shared: shared.clone(),
            },
        );
        shared
    }
}
