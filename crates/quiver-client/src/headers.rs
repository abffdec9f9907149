//! Unique-key string mapping over an engine's native header collection.
//!
//! A [`HeaderDictionary`] holds no headers of its own. Every operation
//! locks and defers to the shared [`HeaderMap`], so changes made through
//! the dictionary are visible to the engine and the other way round.
//! Keys compare case-insensitively. A key stored with several values reads
//! back as those values joined with `,`.

use std::sync::{Arc, MutexGuard, PoisonError};

use quiver_core::{HeaderMap, SharedHeaders};

#[derive(Clone)]
pub struct HeaderDictionary {
    native: SharedHeaders,
}

impl HeaderDictionary {
    pub fn new(native: SharedHeaders) -> Self {
        Self { native }
    }

    /// The collection this dictionary defers to.
    pub fn native(&self) -> &SharedHeaders {
        &self.native
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key)
    }

    /// Replace every value stored under `key`.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.lock().set(key, value);
    }

    /// Add a value under `key`.
    ///
    /// A key that is already present keeps its values and gains this one;
    /// nothing is overwritten.
    pub fn add(&self, key: impl Into<String>, value: impl Into<String>) {
        self.lock().add(key, value);
    }

    pub fn remove(&self, key: &str) -> bool {
        self.lock().remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Whether `key` is present with exactly `value` as its joined value.
    pub fn contains(&self, key: &str, value: &str) -> bool {
        self.get(key).is_some_and(|v| v == value)
    }

    /// Distinct keys in the collection's order.
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().into_iter().map(str::to_string).collect()
    }

    pub fn values(&self) -> Vec<String> {
        self.to_vec().into_iter().map(|(_, value)| value).collect()
    }

    /// Snapshot of every key with its joined value, in native order.
    pub fn to_vec(&self) -> Vec<(String, String)> {
        let map = self.lock();
        map.keys()
            .into_iter()
            .map(|key| {
                let value = map.get_all(key).join(",");
                (key.to_string(), value)
            })
            .collect()
    }

    pub fn iter(&self) -> std::vec::IntoIter<(String, String)> {
        self.to_vec().into_iter()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Whether both dictionaries defer to the same native collection.
    pub fn shares_native(&self, other: &HeaderDictionary) -> bool {
        Arc::ptr_eq(&self.native, &other.native)
    }

    fn lock(&self) -> MutexGuard<'_, HeaderMap> {
        self.native.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for HeaderDictionary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.to_vec()).finish()
    }
}

impl IntoIterator for &HeaderDictionary {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
