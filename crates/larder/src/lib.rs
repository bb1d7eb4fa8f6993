// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A two-tier client data cache with coordinated fetches.
//!
//! `larder` keeps hot data in a bounded in-process LRU tier backed by an
//! application-supplied durable key-value store, and coordinates the
//! overlapping reads of many independent consumers without any cooperation
//! from them:
//!
//! - **Per-key TTL** with an `Infinite` sentinel for manually managed keys.
//! - **Single-flight fetches**: concurrent `get_or_fetch` calls for one key
//!   invoke the fetcher exactly once and share the outcome.
//! - **Stale-while-revalidate**: expired values are served immediately
//!   while a detached refresh runs.
//! - **Pattern invalidation** across both tiers, plus a per-key
//!   invalidation bus for reactive consumers.
//! - **Warm restart**: persisted entries are reloaded in one bulk scan.
//! - **Graceful degradation**: every durable-store failure is contained
//!   and logged; the memory tier remains the source of truth.
//!
//! # Examples
//!
//! ```ignore
//! use larder::{CacheManager, FetchOptions, Ttl};
//!
//! let cache = CacheManager::builder(store)
//!     .max_memory_items(500)
//!     .storage_prefix("app:")
//!     .build();
//! cache.warm_up().await;
//!
//! // A burst of these from independent screens fetches once.
//! let products: Vec<Product> = cache
//!     .get_or_fetch("products", || api.fetch_products(), FetchOptions::default())
//!     .await?;
//!
//! // React to invalidations elsewhere in the app.
//! let subscription = cache.on_invalidate("products", || refresh_screen());
//!
//! cache.set("cart", &cart, Ttl::Infinite).await?;
//! cache.invalidate_pattern("^product").await?;
//! ```

mod builder;
mod bus;
mod error;
mod fetch;
mod manager;
mod refresh;

#[doc(inline)]
pub use builder::{CacheBuilder, CacheConfig};
#[doc(inline)]
pub use bus::Subscription;
#[doc(inline)]
pub use error::CacheError;
#[doc(inline)]
pub use fetch::FetchOptions;
#[doc(inline)]
pub use manager::{CacheManager, CacheStats};

#[doc(inline)]
pub use larder_memory::LruCache;
#[doc(inline)]
pub use larder_store::{CacheEntry, Clock, DurableStore, StoreError, Ttl};
