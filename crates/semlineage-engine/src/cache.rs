//! Memoization for engine queries
//!
//! Entries are written once per key and never invalidated. A cache lives
//! exactly as long as the engine that owns it; a changed model means a new
//! engine with empty caches.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Write-once query cache keyed by string
///
/// ## Usage
///
/// ```rust,ignore
/// let cache: QueryCache<Vec<ChainNode>> = QueryCache::new();
///
/// if let Some(chain) = cache.get("Total Sales") {
///     return chain;
/// }
/// let chain = cache.insert("Total Sales", compute());
/// ```
#[derive(Debug)]
pub struct QueryCache<V> {
    entries: RwLock<HashMap<String, Arc<V>>>,
}

impl<V> QueryCache<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Cached value for `key`, if any
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        self.entries
            .read()
            .ok()
            .and_then(|entries| entries.get(key).map(Arc::clone))
    }

    /// Store `value` under `key` unless a value is already there
    ///
    /// Returns the value now cached for the key, which is the earlier one if
    /// the key was already filled.
    pub fn insert(&self, key: impl Into<String>, value: V) -> Arc<V> {
        let value = Arc::new(value);
        match self.entries.write() {
            Ok(mut entries) => Arc::clone(entries.entry(key.into()).or_insert(value)),
            // A poisoned lock only loses memoization
            Err(_) => value,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V> Default for QueryCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
