// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The contract for durable key-value backends.
//!
//! [`DurableStore`] defines the interface the cache core requires from its
//! persistence collaborator. Implementations are byte/string oriented and
//! agnostic to what the values mean; the cache owns the serialization
//! format. Every operation may fail, and the cache treats each failure as a
//! degradation, never a crash.

use crate::StoreError;

/// Trait for durable key-value store adapters.
///
/// Keys are opaque strings; values are opaque serialized strings. The cache
/// core calls `list_keys` and `get_many` during warm-up, `get`/`set`/
/// `remove` on the hot path, and `remove_many` for bulk invalidation.
///
/// Implementations must be usable from multiple tasks concurrently; the
/// core assumes each operation is individually atomic but performs no
/// multi-key transactions.
pub trait DurableStore: Send + Sync {
    /// Lists every stored key starting with `prefix`.
    fn list_keys(&self, prefix: &str) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    /// Reads a single value, `None` if the key is absent.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Reads many values in one round trip, pairing each key with its value
    /// or `None` when absent.
    fn get_many(&self, keys: &[String]) -> impl Future<Output = Result<Vec<(String, Option<String>)>, StoreError>> + Send;

    /// Writes a single value, overwriting any previous one.
    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Removes a single key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Removes many keys in one round trip.
    fn remove_many(&self, keys: &[String]) -> impl Future<Output = Result<(), StoreError>> + Send;
}
