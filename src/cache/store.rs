//! TTL Cache Module
//!
//! Keyed store with a fixed time-to-live and lazy expiry.
//!
//! There is no size bound: the key space is limited to the courses and
//! topics a session visits. A long-running process should run the expiry
//! sweep from [`crate::tasks::spawn_cleanup_task`].

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::cache::{CacheEntry, CacheStats};

// == TTL Cache ==
/// Thread-safe TTL cache for one entity class.
#[derive(Debug)]
pub struct TtlCache<T> {
    /// Name used in logs and statistics
    name: &'static str,
    /// Validity window of every entry
    ttl: Duration,
    inner: Mutex<Inner<T>>,
}

#[derive(Debug)]
struct Inner<T> {
    entries: HashMap<String, CacheEntry<T>>,
    stats: CacheStats,
}

impl<T: Clone> TtlCache<T> {
    // == Constructor ==
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                stats: CacheStats::new(),
            }),
        }
    }

    // == Get ==
    /// Returns a copy of the value if present and not expired.
    ///
    /// An expired entry counts as a miss but stays in the map until it is
    /// overwritten, invalidated or swept.
    pub fn get(&self, key: &str) -> Option<T> {
        let mut inner = self.inner.lock();
        let hit = match inner.entries.get(key) {
            Some(entry) if !entry.is_expired(self.ttl) => Some(entry.data.clone()),
            _ => None,
        };

        if hit.is_some() {
            inner.stats.record_hit();
        } else {
            inner.stats.record_miss();
        }
        hit
    }

    // == Set ==
    /// Stores a value, overwriting any previous entry and resetting its age.
    pub fn set(&self, key: impl Into<String>, data: T) {
        let key = key.into();
        debug!(cache = self.name, key = %key, "cache set");
        self.inner.lock().entries.insert(key, CacheEntry::new(data));
    }

    // == Invalidate ==
    /// Removes one entry, or every entry when `key` is `None`.
    ///
    /// Returns the number of entries removed.
    pub fn invalidate(&self, key: Option<&str>) -> usize {
        let mut inner = self.inner.lock();
        let removed = match key {
            Some(key) => usize::from(inner.entries.remove(key).is_some()),
            None => {
                let count = inner.entries.len();
                inner.entries.clear();
                count
            }
        };
        inner.stats.record_invalidations(removed);
        if removed > 0 {
            debug!(cache = self.name, ?key, removed, "cache invalidated");
        }
        removed
    }

    /// Removes every entry whose key satisfies `predicate`.
    pub fn invalidate_where(&self, predicate: impl Fn(&str) -> bool) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|key, _| !predicate(key));
        let removed = before - inner.entries.len();
        inner.stats.record_invalidations(removed);
        removed
    }

    // == Cleanup Expired ==
    /// Removes all expired entries. Returns the number removed.
    pub fn cleanup_expired(&self) -> usize {
        let ttl = self.ttl;
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !entry.is_expired(ttl));
        before - inner.entries.len()
    }

    /// Whether a valid entry exists, without touching statistics.
    pub fn contains(&self, key: &str) -> bool {
        self.inner
            .lock()
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(self.ttl))
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let mut stats = inner.stats.clone();
        stats.set_total_entries(inner.entries.len());
        stats
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}
