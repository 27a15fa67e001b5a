//! In-memory cache implementation using `DashMap`.
//!
//! Data is lost on process restart, which only costs per-user dedup state.

use super::Cache;
use crate::Result;
use dashmap::DashMap;

/// In-memory cache using a concurrent hashmap.
///
/// Thread-safe; `increment` holds the shard lock across the
/// read-add-write so concurrent increments are never lost.
///
/// # Example
///
/// ```rust
/// use abingo::cache::{Cache, MemoryCache};
///
/// let cache = MemoryCache::new();
/// cache.write("hello", b"world".to_vec()).unwrap();
/// assert_eq!(cache.read("hello").unwrap(), Some(b"world".to_vec()));
/// ```
#[derive(Debug)]
pub struct MemoryCache {
    store: DashMap<String, Vec<u8>>,
}

impl MemoryCache {
    /// Create a new in-memory cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: DashMap::new(),
        }
    }

    /// Create with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            store: DashMap::with_capacity(capacity),
        }
    }

    /// Get the number of entries in the cache.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Check if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache for MemoryCache {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.store.get(key).map(|v| v.value().clone()))
    }

    fn write(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.store.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.store.remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.store.contains_key(key))
    }

    fn increment(&self, key: &str) -> Result<u64> {
        let mut entry = self
            .store
            .entry(key.to_string())
            .or_insert_with(|| b"0".to_vec());
        let current: u64 = serde_json::from_slice(entry.value())?;
        let next = current.saturating_add(1);
        *entry.value_mut() = serde_json::to_vec(&next)?;
        Ok(next)
    }

    fn clear(&self) -> Result<()> {
        self.store.clear();
        Ok(())
    }
}
