use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::hash::Hash;

/// Per-run memo table handed to components that repeat expensive lookups.
///
/// Entries are never invalidated; a cache lives exactly as long as one run.
pub trait Cache<K, V> {
    fn get(&self, key: &K) -> Option<V>;
    fn put(&self, key: K, value: V);

    /// Read-through helper: return the cached value or compute and store it.
    fn get_or_insert_with(&self, key: K, compute: &mut dyn FnMut() -> V) -> V
    where
        V: Clone,
    {
        if let Some(value) = self.get(&key) {
            return value;
        }
        let value = compute();
        self.put(key, value.clone());
        value
    }
}

/// Hit/miss counters of a [`MemoryCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// In-memory [`Cache`] backed by a `HashMap`.
#[derive(Debug)]
pub struct MemoryCache<K, V> {
    entries: RefCell<HashMap<K, V>>,
    hits: Cell<u64>,
    misses: Cell<u64>,
}

impl<K, V> MemoryCache<K, V> {
    pub fn new() -> Self {
        Self {
            entries: RefCell::new(HashMap::new()),
            hits: Cell::new(0),
            misses: Cell::new(0),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.get(),
            misses: self.misses.get(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl<K, V> Default for MemoryCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash, V: Clone> Cache<K, V> for MemoryCache<K, V> {
    fn get(&self, key: &K) -> Option<V> {
        let found = self.entries.borrow().get(key).cloned();
        match found {
            Some(_) => self.hits.set(self.hits.get() + 1),
            None => self.misses.set(self.misses.get() + 1),
        }
        found
    }

    fn put(&self, key: K, value: V) {
        self.entries.borrow_mut().insert(key, value);
    }
}

/// [`Cache`] that never stores anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl<K, V> Cache<K, V> for NoCache {
    fn get(&self, _key: &K) -> Option<V> {
        None
    }

    fn put(&self, _key: K, _value: V) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_cache_counts_hits_and_misses() {
        let cache: MemoryCache<String, u32> = MemoryCache::new();
        assert_eq!(cache.get(&"a".to_string()), None);
        cache.put("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"a".to_string()), Some(1));

        assert_eq!(cache.stats(), CacheStats { hits: 2, misses: 1 });
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn get_or_insert_with_computes_once() {
        let cache: MemoryCache<&str, u32> = MemoryCache::new();
        let mut calls = 0;
        let mut compute = || {
            calls += 1;
            42
        };

        assert_eq!(cache.get_or_insert_with("k", &mut compute), 42);
        assert_eq!(cache.get_or_insert_with("k", &mut compute), 42);
        assert_eq!(calls, 1);
    }

    #[test]
    fn no_cache_always_recomputes() {
        let cache = NoCache;
        let mut calls = 0;
        let mut compute = || {
            calls += 1;
            "v".to_string()
        };

        Cache::<u8, String>::put(&cache, 1, "x".to_string());
        assert_eq!(Cache::<u8, String>::get(&cache, &1), None);
        cache.get_or_insert_with(1u8, &mut compute);
        cache.get_or_insert_with(1u8, &mut compute);
        assert_eq!(calls, 2);
    }
}
