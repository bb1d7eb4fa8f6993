// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Storage contracts for the larder two-tier cache.
//!
//! This crate defines the pieces the cache core and its persistence
//! collaborator agree on:
//!
//! - [`CacheEntry`] and [`Ttl`]: the value unit stored per key, with its
//!   write timestamp, expiry policy, and revision.
//! - [`DurableStore`]: the async string-keyed key-value contract the cache
//!   persists through.
//! - [`codec`]: the wire format for persisted entries, owned by the cache
//!   rather than the transport.
//! - [`Clock`]: the cache's view of time, controllable in tests via the
//!   `test-util` feature.
//!
//! The `test-util` feature additionally provides
//! [`testing::MemoryStore`], a recording, failure-injecting store double.
//!
//! # Examples
//!
//! ```
//! use larder_store::{CacheEntry, Ttl};
//! use std::time::{Duration, SystemTime};
//!
//! let written = SystemTime::UNIX_EPOCH;
//! let entry = CacheEntry::new("payload", written, Ttl::minutes(5));
//!
//! assert!(!entry.is_expired(written + Duration::from_secs(299)));
//! assert!(entry.is_expired(written + Duration::from_secs(300)));
//! ```

pub mod codec;
mod clock;
mod entry;
mod error;
mod store;

#[cfg(feature = "test-util")]
pub mod testing;

#[doc(inline)]
pub use clock::Clock;
#[doc(inline)]
pub use codec::CodecError;
#[doc(inline)]
pub use entry::{CacheEntry, Ttl};
#[doc(inline)]
pub use error::StoreError;
#[doc(inline)]
pub use store::DurableStore;
