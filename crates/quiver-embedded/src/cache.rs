//! Read cache for documents loaded by key.
//!
//! Entries are tagged with a generation counter. A write bumps the
//! generation and drops the written database's entries; a reader that began
//! before the bump cannot insert the snapshot it read.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use quiver_core::{CachingScope, JsonDocument};
use tracing::trace;

#[derive(Debug, Default)]
struct Entries {
    generation: u64,
    docs: HashMap<(String, String), JsonDocument>,
}

#[derive(Debug)]
pub struct DocumentCache {
    enabled: bool,
    disabled_depth: AtomicUsize,
    entries: Mutex<Entries>,
}

impl DocumentCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            disabled_depth: AtomicUsize::new(0),
            entries: Mutex::default(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.enabled && self.disabled_depth.load(Ordering::SeqCst) == 0
    }

    /// Generation to pass back to [`insert`](Self::insert) after reading.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn get(&self, database: &str, key: &str) -> Option<JsonDocument> {
        if !self.is_active() {
            return None;
        }
        let hit = self
            .lock()
            .docs
            .get(&(database.to_string(), key.to_string()))
            .cloned();
        if hit.is_some() {
            trace!(database, key, "document cache hit");
        }
        hit
    }

    pub fn insert(&self, database: &str, key: &str, doc: &JsonDocument, generation: u64) {
        if !self.is_active() {
            return;
        }
        let mut entries = self.lock();
        if entries.generation == generation {
            entries
                .docs
                .insert((database.to_string(), key.to_string()), doc.clone());
        }
    }

    /// Forget every cached document of `database`.
    pub fn invalidate(&self, database: &str) {
        let mut entries = self.lock();
        entries.generation += 1;
        entries.docs.retain(|(db, _), _| db != database);
    }

    pub fn disable(self: &Arc<Self>) -> CachingScope {
        self.disabled_depth.fetch_add(1, Ordering::SeqCst);
        let cache = Arc::clone(self);
        CachingScope::new(move || {
            cache.disabled_depth.fetch_sub(1, Ordering::SeqCst);
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
