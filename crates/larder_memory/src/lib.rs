// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The bounded in-process tier of the larder cache.
//!
//! [`LruCache`] is a strict least-recently-used map: a hash map into a slot
//! arena whose occupied slots form an intrusive doubly linked recency list,
//! giving O(1) lookups, writes, and eviction. The recency policy is
//! deliberately simple and predictable; expiry and persistence concerns
//! live in the orchestrating `larder` crate.
//!
//! # Examples
//!
//! ```
//! use larder_memory::LruCache;
//!
//! let mut cache = LruCache::new(100);
//! cache.insert("user:1".to_string(), "alice");
//!
//! assert_eq!(cache.get("user:1"), Some(&"alice"));
//! assert_eq!(cache.len(), 1);
//! ```

mod lru;

#[doc(inline)]
pub use lru::LruCache;
