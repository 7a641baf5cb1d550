use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::extensions::{Clock, SystemClock};
use crate::util::lock_unpoisoned;

pub const DEFAULT_CACHE_CAPACITY: usize = 100;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 120);

/// Fixed-capacity map with least-recently-used eviction and a per-entry
/// time to live counted from insertion.
pub struct TimedLruCache<V> {
    entries: Mutex<LruCache<String, (Instant, V)>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> TimedLruCache<V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self::with_clock(capacity, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            clock,
        }
    }

    pub fn capacity(&self) -> usize {
        lock_unpoisoned(&self.entries).cap().get()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut entries = lock_unpoisoned(&self.entries);
        let (inserted_at, value) = entries.get(key)?;
        if now.duration_since(*inserted_at) < self.ttl {
            return Some(value.clone());
        }
        entries.pop(key);
        None
    }

    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now();
        lock_unpoisoned(&self.entries)
            .peek(key)
            .is_some_and(|(inserted_at, _)| now.duration_since(*inserted_at) < self.ttl)
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let now = self.clock.now();
        let mut entries = lock_unpoisoned(&self.entries);
        if entries.len() >= entries.cap().get() && !entries.contains(&key) {
            self.drop_expired(&mut entries, now);
        }
        entries.put(key, (now, value));
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        lock_unpoisoned(&self.entries)
            .pop(key)
            .map(|(_, value)| value)
    }

    pub fn clear(&self) {
        lock_unpoisoned(&self.entries).clear();
    }

    /// Number of stored entries, expired ones included until they are touched.
    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn drop_expired(&self, entries: &mut LruCache<String, (Instant, V)>, now: Instant) {
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, (inserted_at, _))| now.duration_since(*inserted_at) >= self.ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            entries.pop(&key);
        }
    }
}

impl<V> std::fmt::Debug for TimedLruCache<V> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TimedLruCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
