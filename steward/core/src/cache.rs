//! Settings Cache
//!
//! A small TTL cache with an injected [`Clock`], passed by reference to the
//! code that reads frequently used settings. Entries expire on read; writers
//! invalidate explicitly after mutating the backing document.
//!
//! Readers that fill the cache after a miss use [`TtlCache::generation`] and
//! [`TtlCache::fill`]: a fill is dropped when an invalidation happened while
//! the value was being loaded, so a slow reader cannot park a pre-write copy
//! in the cache for a whole TTL.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

/// Default time-to-live for cached settings
pub const DEFAULT_SETTINGS_TTL: Duration = Duration::from_secs(300);

/// Source of the current instant
pub trait Clock: Send + Sync {
    /// Now
    fn now(&self) -> Instant;
}

/// Wall-clock time
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }
}

impl ManualClock {
    /// A clock frozen at the current instant
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock()
    }
}

struct Entry<V> {
    stored_at: Instant,
    value: V,
}

/// Key/value cache whose entries expire `ttl` after insertion
pub struct TtlCache<K, V> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<K, Entry<V>>>,
    /// Bumped by every invalidation, under the entries write lock
    generation: AtomicU64,
}

impl<K, V> std::fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("ttl", &self.ttl)
            .field("entries", &self.entries.read().len())
            .finish()
    }
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    /// Create a cache on the system clock
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    /// Create a cache on an explicit clock
    #[must_use]
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Configured time-to-live
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// A live entry; expired entries are evicted and miss
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => return None,
                Some(e) if now.duration_since(e.stored_at) < self.ttl => {
                    return Some(e.value.clone())
                }
                Some(_) => {}
            }
        }
        let mut entries = self.entries.write();
        if entries
            .get(key)
            .is_some_and(|e| now.duration_since(e.stored_at) >= self.ttl)
        {
            entries.remove(key);
        }
        None
    }

    /// Store a value, replacing any previous one
    pub fn insert(&self, key: K, value: V) {
        let stored_at = self.clock.now();
        self.entries
            .write()
            .insert(key, Entry { stored_at, value });
    }

    /// Current invalidation generation; take it before loading a value to
    /// [`fill`](Self::fill) with
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Store a value loaded after a miss, unless an invalidation happened
    /// since `seen` was taken. Returns whether it was stored.
    pub fn fill(&self, key: K, value: V, seen: u64) -> bool {
        let mut entries = self.entries.write();
        if self.generation.load(Ordering::Acquire) != seen {
            return false;
        }
        let stored_at = self.clock.now();
        entries.insert(key, Entry { stored_at, value });
        true
    }

    /// Drop an entry
    pub fn invalidate(&self, key: &K) -> bool {
        let mut entries = self.entries.write();
        self.generation.fetch_add(1, Ordering::AcqRel);
        entries.remove(key).is_some()
    }

    /// Drop everything
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        self.generation.fetch_add(1, Ordering::AcqRel);
        entries.clear();
    }

    /// Entries currently held, live or not yet evicted
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing is held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(ttl_secs: u64) -> (Arc<ManualClock>, TtlCache<&'static str, u32>) {
        let clock = Arc::new(ManualClock::new());
        let cache = TtlCache::with_clock(Duration::from_secs(ttl_secs), clock.clone());
        (clock, cache)
    }

    #[test]
    fn test_entries_expire() {
        let (clock, cache) = cache(10);
        cache.insert("a", 1);

        clock.advance(Duration::from_secs(9));
        assert_eq!(cache.get(&"a"), Some(1));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get(&"a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_insert_refreshes_age() {
        let (clock, cache) = cache(10);
        cache.insert("a", 1);
        clock.advance(Duration::from_secs(8));
        cache.insert("a", 2);
        clock.advance(Duration::from_secs(8));
        assert_eq!(cache.get(&"a"), Some(2));
    }

    #[test]
    fn test_invalidate() {
        let (_, cache) = cache(10);
        cache.insert("a", 1);
        assert!(cache.invalidate(&"a"));
        assert!(!cache.invalidate(&"a"));
        assert_eq!(cache.get(&"a"), None);
    }

    #[test]
    fn test_fill_after_invalidation_is_dropped() {
        let (_, cache) = cache(10);
        let seen = cache.generation();
        // A writer invalidates while the reader is still loading
        cache.invalidate(&"a");
        assert!(!cache.fill("a", 1, seen));
        assert_eq!(cache.get(&"a"), None);

        let seen = cache.generation();
        assert!(cache.fill("a", 2, seen));
        assert_eq!(cache.get(&"a"), Some(2));
    }

    #[test]
    fn test_zero_ttl_never_hits() {
        let (_, cache) = cache(0);
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), None);
    }
}
