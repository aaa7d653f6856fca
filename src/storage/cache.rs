//! Thread-Safe TTL Cache
//!
//! This module implements the store half of SweepCache: a single `HashMap`
//! from string keys to values with an absolute expiry deadline, guarded by
//! one `RwLock`.
//!
//! ## Lock Discipline
//!
//! - `get` and every other read takes the lock in **shared** mode, so readers
//!   never block each other.
//! - `set`, `delete` and the sweeper's scan take it in **exclusive** mode.
//! - Critical sections cover the map access only. Entries are built (and
//!   replaced values dropped) outside the lock.
//!
//! ## Lazy Expiry
//!
//! An entry whose deadline has passed is *logically absent*: `get` reports it
//! as missing, exactly like a key that was never set. It is not removed on
//! read, though. It stays physically in the map until the background sweeper
//! (see [`crate::storage::sweeper`]) or an explicit `delete` reclaims it.
//!
//! ```text
//!   set(k, v, ttl)          get(k)                     sweeper
//!        │                    │                          │
//!        ▼                    ▼                          ▼
//!   ┌─────────┐  now < exp  ┌──────┐  exp < now   ┌────────────┐
//!   │  live   │────────────>│ hit  │   ┌─────────>│ reclaimed  │
//!   └────┬────┘             └──────┘   │          └────────────┘
//!        │ deadline passes             │
//!        ▼                             │
//!   ┌─────────┐  get(k) -> None        │
//!   │  stale  │────────────────────────┘
//!   └─────────┘
//! ```

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// A stored value together with its expiry deadline.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The value exactly as it was handed to `set`
    pub value: V,
    /// When this entry expires (None = the deadline overflowed the clock, never expires)
    pub expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    /// Creates an entry that expires `ttl` from now.
    ///
    /// A zero `ttl` yields an entry that is already expired.
    pub fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now().checked_add(ttl),
        }
    }

    /// Whether the entry may be returned to a reader at `now`.
    ///
    /// Readers only see an entry while `now` is strictly before its deadline.
    #[inline]
    pub fn is_live_at(&self, now: Instant) -> bool {
        self.expires_at.map(|exp| now < exp).unwrap_or(true)
    }

    /// Whether the sweeper should reclaim the entry at `now`.
    #[inline]
    pub fn is_stale_at(&self, now: Instant) -> bool {
        self.expires_at.map(|exp| exp < now).unwrap_or(false)
    }

    /// Remaining lifetime at `now`, zero once expired.
    pub fn remaining_at(&self, now: Instant) -> Duration {
        self.expires_at
            .map(|exp| exp.saturating_duration_since(now))
            .unwrap_or(Duration::MAX)
    }
}

type EntryMap<V> = HashMap<String, CacheEntry<V>>;

/// An in-process key-value cache with per-entry TTL.
///
/// Values are opaque: the cache never inspects them, it only moves them in on
/// `set` and clones them out on `get`. Store an `Arc<T>` to share one
/// allocation between the cache and its readers.
///
/// # Thread Safety
///
/// Wrap the cache in an `Arc` to share it between threads and with a
/// [`Sweeper`](crate::storage::Sweeper). All operations are thread-safe and
/// none of them can fail.
///
/// # Example
///
/// ```
/// use sweepcache::Cache;
/// use std::time::Duration;
///
/// let cache = Cache::new();
/// cache.set("username", "Dima", Duration::from_secs(2));
/// assert_eq!(cache.get("username"), Some("Dima"));
///
/// cache.delete("username");
/// assert_eq!(cache.get("username"), None);
/// ```
pub struct Cache<V> {
    /// The entry map, the only shared mutable state
    entries: RwLock<EntryMap<V>>,

    /// Statistics: total SET operations
    set_count: AtomicU64,

    /// Statistics: total GET operations
    get_count: AtomicU64,

    /// Statistics: GET operations that returned a value
    hit_count: AtomicU64,

    /// Statistics: explicit DELETE operations
    del_count: AtomicU64,

    /// Statistics: entries reclaimed by the sweeper
    swept_count: AtomicU64,
}

impl<V> std::fmt::Debug for Cache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("entries", &self.len())
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("swept_count", &self.swept_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl<V> Default for Cache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Cache<V> {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            set_count: AtomicU64::new(0),
            get_count: AtomicU64::new(0),
            hit_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            swept_count: AtomicU64::new(0),
        }
    }

    // Every critical section is a single map read, insert or remove, so a
    // panic in another holder cannot leave the map half-updated.
    #[inline]
    fn read(&self) -> RwLockReadGuard<'_, EntryMap<V>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    fn write(&self) -> RwLockWriteGuard<'_, EntryMap<V>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `value` under `key` for `ttl`.
    ///
    /// Any existing entry for the key is replaced wholesale, value and
    /// deadline alike. The empty string is an ordinary key. A zero `ttl`
    /// stores an entry that `get` already treats as absent; it still occupies
    /// the map until swept or deleted.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let key = key.into();
        let entry = CacheEntry::new(value, ttl);

        let replaced = self.write().insert(key, entry);
        // The old value is dropped after the guard is released.
        drop(replaced);
    }

    /// Removes `key` if present.
    ///
    /// Deleting a missing key is a no-op.
    ///
    /// # Returns
    ///
    /// Returns `true` if an entry (live or expired) was removed.
    pub fn delete(&self, key: &str) -> bool {
        self.del_count.fetch_add(1, Ordering::Relaxed);

        let removed = self.write().remove(key);
        removed.is_some()
    }

    /// Removes `key` only if it is still expired when the write lock is held.
    ///
    /// An entry renewed by `set` after the sweeper discovered it is kept.
    ///
    /// # Returns
    ///
    /// Returns `true` if an entry was removed.
    pub fn delete_if_expired(&self, key: &str) -> bool {
        let removed = {
            let mut entries = self.write();
            let now = Instant::now();
            let stale = entries
                .get(key)
                .map(|e| e.is_stale_at(now))
                .unwrap_or(false);
            if stale {
                entries.remove(key)
            } else {
                None
            }
        };
        removed.is_some()
    }

    /// Returns `true` if `key` holds a live entry.
    pub fn contains_key(&self, key: &str) -> bool {
        let entries = self.read();
        entries
            .get(key)
            .map(|e| e.is_live_at(Instant::now()))
            .unwrap_or(false)
    }

    /// Returns `true` if `key` is physically stored, whether expired or not.
    pub fn is_resident(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    /// Remaining lifetime of a live entry.
    ///
    /// Returns `None` for missing and expired keys. An entry whose deadline
    /// overflowed the clock reports `Duration::MAX`.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let entries = self.read();
        let now = Instant::now();
        entries
            .get(key)
            .filter(|e| e.is_live_at(now))
            .map(|e| e.remaining_at(now))
    }

    /// Returns the number of physically stored entries.
    ///
    /// Expired entries that have not been swept yet are counted.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns true if nothing is stored, not even expired entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let drained = std::mem::take(&mut *self.write());
        drop(drained);
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> CacheStats {
        let gets = self.get_count.load(Ordering::Relaxed);
        let hits = self.hit_count.load(Ordering::Relaxed);
        CacheStats {
            entries: self.len(),
            sets: self.set_count.load(Ordering::Relaxed),
            gets,
            hits,
            misses: gets.saturating_sub(hits),
            deletes: self.del_count.load(Ordering::Relaxed),
            swept: self.swept_count.load(Ordering::Relaxed),
        }
    }

    /// Visits every stale key while holding the write lock.
    ///
    /// `now` is captured once, after the lock is acquired, so every entry is
    /// judged against the same instant. No writer can interleave with the
    /// scan. The visitor may stop the scan early with `ControlFlow::Break`.
    pub(crate) fn scan_stale<F>(&self, mut visit: F) -> ControlFlow<()>
    where
        F: FnMut(String) -> ControlFlow<()>,
    {
        let entries = self.write();
        let now = Instant::now();

        for (key, entry) in entries.iter() {
            if entry.is_stale_at(now) {
                if visit(key.clone()).is_break() {
                    return ControlFlow::Break(());
                }
            }
        }

        ControlFlow::Continue(())
    }

    /// Removes a key on behalf of a sweeper worker.
    ///
    /// With `verify` unset this is a plain `delete`, so a key renewed between
    /// discovery and removal is lost. With `verify` set the deadline is
    /// re-checked under the write lock first.
    pub(crate) fn evict(&self, key: &str, verify: bool) -> bool {
        let removed = if verify {
            self.delete_if_expired(key)
        } else {
            let removed = self.write().remove(key);
            removed.is_some()
        };

        if removed {
            self.swept_count.fetch_add(1, Ordering::Relaxed);
        }

        removed
    }
}

impl<V: Clone> Cache<V> {
    /// Gets the value for `key`.
    ///
    /// Returns `None` if the key was never set, was deleted, or has reached
    /// its deadline. Expired entries are left in place for the sweeper.
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let value = {
            let entries = self.read();
            let now = Instant::now();
            entries
                .get(key)
                .filter(|e| e.is_live_at(now))
                .map(|e| e.value.clone())
        };

        if value.is_some() {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
        }

        value
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Physically stored entries, expired ones included
    pub entries: usize,
    /// Total SET operations
    pub sets: u64,
    /// Total GET operations
    pub gets: u64,
    /// GETs that returned a value
    pub hits: u64,
    /// GETs that found nothing live
    pub misses: u64,
    /// Explicit DELETE operations
    pub deletes: u64,
    /// Entries reclaimed by the sweeper
    pub swept: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    /// Sleeps long enough for a zero-TTL entry to be strictly in the past.
    fn let_clock_advance() {
        thread::sleep(Duration::from_millis(5));
    }

    #[test]
    fn test_set_and_get() {
        let cache = Cache::new();
        cache.set("username", "Dima", Duration::from_secs(2));

        assert_eq!(cache.get("username"), Some("Dima"));
    }

    #[test]
    fn test_ttl_expiration() {
        let cache = Cache::new();
        cache.set("username", "Dima", Duration::from_secs(1));

        thread::sleep(Duration::from_secs(2));

        assert_eq!(cache.get("username"), None);
    }

    #[test]
    fn test_delete() {
        let cache = Cache::new();
        cache.set("username", "Dima", Duration::from_secs(10));
        cache.delete("username");

        assert_eq!(cache.get("username"), None);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let cache = Cache::new();
        cache.set("key", 1, Duration::from_secs(10));

        assert!(cache.delete("key"));
        assert!(!cache.delete("key")); // Already deleted
        assert_eq!(cache.get("key"), None);
        assert!(cache.is_empty());

        // Never set at all
        assert!(!cache.delete("missing"));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn test_get_nonexistent() {
        let cache: Cache<String> = Cache::new();
        assert_eq!(cache.get("nonexistent"), None);
    }

    #[test]
    fn test_overwrite_replaces_value_and_deadline() {
        let cache = Cache::new();

        cache.set("key", "old", Duration::ZERO);
        cache.set("key", "new", Duration::from_secs(60));
        assert_eq!(cache.get("key"), Some("new"));
        assert_eq!(cache.len(), 1);

        // Shortening works the same way
        cache.set("key", "short", Duration::ZERO);
        assert_eq!(cache.get("key"), None);
        assert!(cache.is_resident("key"));
    }

    #[test]
    fn test_zero_ttl_is_lazily_expired() {
        let cache = Cache::new();
        cache.set("ghost", "boo", Duration::ZERO);

        assert_eq!(cache.get("ghost"), None);
        assert!(!cache.contains_key("ghost"));

        // Still occupying the map, and get() did not remove it
        assert!(cache.is_resident("ghost"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_get_does_not_remove_expired_entry() {
        let cache = Cache::new();
        cache.set("key", "value", Duration::from_millis(10));
        thread::sleep(Duration::from_millis(30));

        for _ in 0..3 {
            assert_eq!(cache.get("key"), None);
        }
        assert!(cache.is_resident("key"));

        // An explicit delete still reclaims it
        assert!(cache.delete("key"));
        assert!(!cache.is_resident("key"));
    }

    #[test]
    fn test_empty_key_is_ordinary() {
        let cache = Cache::new();
        cache.set("", "blank", Duration::from_secs(10));

        assert_eq!(cache.get(""), Some("blank"));
        assert!(cache.delete(""));
        assert_eq!(cache.get(""), None);
    }

    #[test]
    fn test_value_identity_is_preserved() {
        let cache = Cache::new();
        let payload = Arc::new(vec![1u8, 2, 3]);
        cache.set("blob", Arc::clone(&payload), Duration::from_secs(10));

        let fetched = cache.get("blob").unwrap();
        assert!(Arc::ptr_eq(&fetched, &payload));
    }

    #[test]
    fn test_huge_ttl_never_expires() {
        let cache = Cache::new();
        cache.set("forever", 42, Duration::MAX);

        assert_eq!(cache.get("forever"), Some(42));
        assert_eq!(cache.ttl("forever"), Some(Duration::MAX));
    }

    #[test]
    fn test_ttl() {
        let cache = Cache::new();

        // No TTL on non-existent key
        assert_eq!(cache.ttl("nonexistent"), None);

        cache.set("expiring", "value", Duration::from_secs(100));
        let ttl = cache.ttl("expiring").unwrap();
        assert!(ttl > Duration::from_secs(99) && ttl <= Duration::from_secs(100));

        // No TTL on an expired key
        cache.set("expired", "value", Duration::ZERO);
        assert_eq!(cache.ttl("expired"), None);
    }

    #[test]
    fn test_clear() {
        let cache = Cache::new();
        cache.set("key1", "value1", Duration::from_secs(10));
        cache.set("key2", "value2", Duration::ZERO);

        assert_eq!(cache.len(), 2);

        cache.clear();

        assert_eq!(cache.len(), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_stats() {
        let cache = Cache::new();
        cache.set("a", 1, Duration::from_secs(10));
        cache.set("b", 2, Duration::ZERO);

        cache.get("a");
        cache.get("b");
        cache.get("c");
        cache.delete("a");

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.sets, 2);
        assert_eq!(stats.gets, 3);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.deletes, 1);
        assert_eq!(stats.swept, 0);
    }

    #[test]
    fn test_scan_stale_visits_only_expired_keys() {
        let cache = Cache::new();
        cache.set("stale1", "v", Duration::ZERO);
        cache.set("stale2", "v", Duration::ZERO);
        cache.set("fresh", "v", Duration::from_secs(60));
        let_clock_advance();

        let mut seen = Vec::new();
        let flow = cache.scan_stale(|key| {
            seen.push(key);
            ControlFlow::Continue(())
        });
        seen.sort();

        assert!(flow.is_continue());
        assert_eq!(seen, vec!["stale1".to_string(), "stale2".to_string()]);

        // Scanning removes nothing by itself
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_scan_stale_stops_on_break() {
        let cache = Cache::new();
        for i in 0..5 {
            cache.set(format!("stale{}", i), i, Duration::ZERO);
        }
        let_clock_advance();

        let mut visited = 0;
        let flow = cache.scan_stale(|_| {
            visited += 1;
            ControlFlow::Break(())
        });

        assert!(flow.is_break());
        assert_eq!(visited, 1);
    }

    #[test]
    fn test_evict_without_verify_removes_renewed_key() {
        let cache = Cache::new();
        cache.set("session", "old", Duration::ZERO);
        let_clock_advance();

        // Renewed after the sweeper would have discovered it
        cache.set("session", "new", Duration::from_secs(60));

        assert!(cache.evict("session", false));
        assert_eq!(cache.get("session"), None);
        assert_eq!(cache.stats().swept, 1);
    }

    #[test]
    fn test_evict_with_verify_keeps_renewed_key() {
        let cache = Cache::new();
        cache.set("session", "old", Duration::ZERO);
        let_clock_advance();

        cache.set("session", "new", Duration::from_secs(60));

        assert!(!cache.evict("session", true));
        assert_eq!(cache.get("session"), Some("new"));
        assert_eq!(cache.stats().swept, 0);

        // A genuinely stale key is still removed
        cache.set("other", "v", Duration::ZERO);
        let_clock_advance();
        assert!(cache.evict("other", true));
        assert!(!cache.is_resident("other"));
    }

    #[test]
    fn test_delete_if_expired() {
        let cache = Cache::new();
        cache.set("live", 1, Duration::from_secs(60));
        cache.set("dead", 2, Duration::ZERO);
        let_clock_advance();

        assert!(!cache.delete_if_expired("live"));
        assert!(cache.delete_if_expired("dead"));
        assert!(!cache.delete_if_expired("missing"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_concurrent_writers_and_readers() {
        let cache = Arc::new(Cache::new());
        let mut handles = vec![];

        // Spawn multiple writers on distinct keys
        for i in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                for j in 0..200 {
                    let key = format!("key-{}-{}", i, j);
                    cache.set(key, i * 1000 + j, Duration::from_secs(60));
                }
            }));
        }

        // And readers hammering the same key space
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                for i in 0..8 {
                    for j in 0..200 {
                        if let Some(v) = cache.get(&format!("key-{}-{}", i, j)) {
                            assert_eq!(v, i * 1000 + j);
                        }
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 1600);
        for i in 0..8 {
            for j in 0..200 {
                assert_eq!(cache.get(&format!("key-{}-{}", i, j)), Some(i * 1000 + j));
            }
        }
    }

    #[test]
    fn test_set_then_get_same_thread_under_contention() {
        let cache = Arc::new(Cache::new());
        let mut handles = vec![];

        for t in 0..4 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                let key = format!("own-{}", t);
                for n in 0..500 {
                    cache.set(key.clone(), n, Duration::from_secs(60));
                    assert_eq!(cache.get(&key), Some(n));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
