// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Test double for the durable store.
//!
//! This module provides [`MemoryStore`], an in-memory [`DurableStore`] that
//! records every operation and supports failure injection for exercising
//! degraded-storage paths.

use std::{collections::BTreeMap, sync::Arc};

use parking_lot::Mutex;

use crate::{DurableStore, StoreError};

/// Recorded store operation with full context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// A key listing was performed with the given prefix.
    ListKeys(String),
    /// A read was performed for the given key.
    Get(String),
    /// A bulk read was performed for the given keys.
    GetMany(Vec<String>),
    /// A write was performed.
    Set {
        /// The key that was written.
        key: String,
        /// The raw value that was written.
        value: String,
    },
    /// A removal was performed for the given key.
    Remove(String),
    /// A bulk removal was performed for the given keys.
    RemoveMany(Vec<String>),
}

type FailPredicate = Box<dyn Fn(&StoreOp) -> bool + Send + Sync>;

/// A configurable in-memory durable store for testing.
///
/// Values live in a `BTreeMap`, operations are recorded for later
/// verification, and a failure predicate can make any subset of operations
/// fail, which is how storage-degradation behavior is tested.
///
/// # Examples
///
/// ```
/// use larder_store::DurableStore;
/// use larder_store::testing::{MemoryStore, StoreOp};
/// # futures::executor::block_on(async {
///
/// let store = MemoryStore::new();
/// store.set("cache:a", "1").await?;
/// assert_eq!(store.get("cache:a").await?, Some("1".to_string()));
///
/// // Fail all reads from here on.
/// store.fail_when(|op| matches!(op, StoreOp::Get(_)));
/// assert!(store.get("cache:a").await.is_err());
/// # Ok::<(), larder_store::StoreError>(())
/// # });
/// ```
pub struct MemoryStore {
    data: Arc<Mutex<BTreeMap<String, String>>>,
    operations: Arc<Mutex<Vec<StoreOp>>>,
    fail_when: Arc<Mutex<Option<FailPredicate>>>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("data", &self.data)
            .field("operations", &self.operations)
            .field("fail_when", &self.fail_when.lock().is_some())
            .finish()
    }
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            operations: Arc::clone(&self.operations),
            fail_when: Arc::clone(&self.fail_when),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(BTreeMap::new())),
            operations: Arc::new(Mutex::new(Vec::new())),
            fail_when: Arc::new(Mutex::new(None)),
        }
    }

    /// Creates a store pre-populated with raw key/value pairs.
    #[must_use]
    pub fn with_data(data: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            data: Arc::new(Mutex::new(data.into_iter().collect())),
            operations: Arc::new(Mutex::new(Vec::new())),
            fail_when: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns the number of stored values.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.data.lock().len()
    }

    /// Returns true if the store contains the given key.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.lock().contains_key(key)
    }

    /// Returns the raw stored value for a key, if present.
    #[must_use]
    pub fn raw_value(&self, key: &str) -> Option<String> {
        self.data.lock().get(key).cloned()
    }

    /// Sets a predicate that determines which operations fail.
    ///
    /// The predicate receives the operation and returns `true` if it should
    /// fail with a [`StoreError`].
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&StoreOp) -> bool + Send + Sync + 'static,
    {
        *self.fail_when.lock() = Some(Box::new(predicate));
    }

    /// Clears the failure predicate, allowing all operations to succeed.
    pub fn clear_failures(&self) {
        *self.fail_when.lock() = None;
    }

    /// Returns a clone of all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<StoreOp> {
        self.operations.lock().clone()
    }

    /// Clears all recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    fn record(&self, op: StoreOp) {
        self.operations.lock().push(op);
    }

    fn check(&self, op: StoreOp) -> Result<(), StoreError> {
        let failed = self.fail_when.lock().as_ref().is_some_and(|predicate| predicate(&op));
        let label = match &op {
            StoreOp::ListKeys(_) => "list_keys",
            StoreOp::Get(_) => "get",
            StoreOp::GetMany(_) => "get_many",
            StoreOp::Set { .. } => "set",
            StoreOp::Remove(_) => "remove",
            StoreOp::RemoveMany(_) => "remove_many",
        };
        self.record(op);
        if failed {
            return Err(StoreError::new(label, "memory store: injected failure"));
        }
        Ok(())
    }
}

impl DurableStore for MemoryStore {
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.check(StoreOp::ListKeys(prefix.to_owned()))?;
        Ok(self
            .data
            .lock()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check(StoreOp::Get(key.to_owned()))?;
        Ok(self.data.lock().get(key).cloned())
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<(String, Option<String>)>, StoreError> {
        self.check(StoreOp::GetMany(keys.to_vec()))?;
        let data = self.data.lock();
        Ok(keys
            .iter()
            .map(|key| (key.clone(), data.get(key).cloned()))
            .collect())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check(StoreOp::Set {
            key: key.to_owned(),
            value: value.to_owned(),
        })?;
        self.data.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.check(StoreOp::Remove(key.to_owned()))?;
        self.data.lock().remove(key);
        Ok(())
    }

    async fn remove_many(&self, keys: &[String]) -> Result<(), StoreError> {
        self.check(StoreOp::RemoveMany(keys.to_vec()))?;
        let mut data = self.data.lock();
        for key in keys {
            data.remove(key);
        }
        Ok(())
    }
}
