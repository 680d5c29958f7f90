use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::config::CacheSettings;
use crate::core::types::MatchMode;

/// Cache key: the normalized request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub description: String,
    pub amount: Decimal,
    pub mode: MatchMode,
}

impl CacheKey {
    #[must_use]
    pub fn new(description: &str, amount: Decimal, mode: MatchMode) -> Self {
        Self {
            description: description.to_string(),
            // 500000 and 500000.00 are the same request
            amount: amount.normalize(),
            mode,
        }
    }
}

#[derive(Debug)]
struct Entry<V> {
    inserted: Instant,
    ttl: Duration,
    value: Arc<V>,
}

impl<V> Entry<V> {
    fn is_fresh(&self) -> bool {
        self.inserted.elapsed() < self.ttl
    }
}

/// TTL cache with a size bound.
///
/// Entries carry their own TTL; [`insert`](Self::insert) uses the cache-wide
/// one.
///
/// When full, the oldest `evict_batch` entries are dropped before inserting.
/// Lookup, eviction and insertion all happen under one lock.
#[derive(Debug)]
pub struct SuggestionCache<V> {
    entries: Mutex<HashMap<CacheKey, Entry<V>>>,
    ttl: Duration,
    max_entries: usize,
    evict_batch: usize,
}

impl<V> SuggestionCache<V> {
    #[must_use]
    pub fn new(ttl: Duration, max_entries: usize, evict_batch: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
            evict_batch: evict_batch.max(1),
        }
    }

    #[must_use]
    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new(
            Duration::from_secs(settings.ttl_secs),
            settings.max_entries,
            settings.evict_batch,
        )
    }

    /// Fresh value for `key`; an expired entry is removed
    pub fn get(&self, key: &CacheKey) -> Option<Arc<V>> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_fresh() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: CacheKey, value: V) -> Arc<V> {
        self.insert_with_ttl(key, value, self.ttl)
    }

    pub fn insert_with_ttl(&self, key: CacheKey, value: V, ttl: Duration) -> Arc<V> {
        let value = Arc::new(value);
        let mut entries = self.entries.lock();

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            let mut by_age: Vec<(CacheKey, Instant)> = entries
                .iter()
                .map(|(k, e)| (k.clone(), e.inserted))
                .collect();
            by_age.sort_by_key(|(_, inserted)| *inserted);
            for (old, _) in by_age.into_iter().take(self.evict_batch) {
                entries.remove(&old);
            }
            tracing::debug!(remaining = entries.len(), "Evicted cached suggestions");
        }

        entries.insert(
            key,
            Entry {
                inserted: Instant::now(),
                ttl,
                value: value.clone(),
            },
        );
        value
    }

    /// First non-expired value for which `f` returns something
    pub fn find_map<T>(&self, mut f: impl FnMut(&V) -> Option<T>) -> Option<T> {
        let entries = self.entries.lock();
        entries
            .values()
            .filter(|e| e.is_fresh())
            .find_map(|e| f(&e.value))
    }

    /// Drop everything; returns how many entries were removed
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let removed = entries.len();
        entries.clear();
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
