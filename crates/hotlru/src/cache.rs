//! Lru: thread-safe LRU cache over the recency list

use std::borrow::Borrow;
use std::hash::Hash;

use parking_lot::{RwLock, RwLockReadGuard};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::lru::LruList;
use crate::stats::CacheStats;

/// Capacity used when none is given
pub const DEFAULT_SIZE: usize = 256;

/// Fixed-capacity LRU cache safe to share between threads.
///
/// All access goes through one reader/writer lock. `get` takes the write
/// lock because it reorders the list; `peek`, `contains`, `len`, `capacity`,
/// `range` and `reverse` take the read lock recursively, so they never queue
/// behind a waiting writer. A steady stream of readers can therefore delay
/// writers.
///
/// A value built with [`Lru::new`] or [`Default`] allocates nothing until the
/// first `set` or `resize`, and starts out with [`DEFAULT_SIZE`].
///
/// ```
/// use hotlru::Lru;
///
/// let cache = Lru::with_capacity(2).unwrap();
/// cache.set(1, "a");
/// cache.set(2, "b");
///
/// let (_, evicted) = cache.set_evicted(3, "c");
/// assert_eq!(evicted, Some((1, "a")));
/// assert_eq!(cache.get(&2), Some("b"));
/// ```
pub struct Lru<K, V> {
    /// `None` until the first mutating call
    inner: RwLock<Option<LruList<K, V>>>,

    /// Cache statistics
    stats: CacheStats,
}

impl<K, V> Default for Lru<K, V> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(None),
            stats: CacheStats::new(),
        }
    }
}

impl<K, V> Lru<K, V>
where
    K: Hash + Eq,
{
    /// Create an empty cache with the default capacity
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cache holding at most `capacity` entries
    ///
    /// # Returns
    /// * `Err(Error::InvalidCapacity)` if `capacity` is zero
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidCapacity(capacity));
        }

        Ok(Self {
            inner: RwLock::new(Some(LruList::new(capacity))),
            stats: CacheStats::new(),
        })
    }

    /// Insert or replace a value and mark it most recently used.
    ///
    /// Returns the previous value if the key was present. Inserting a new key
    /// into a full cache silently evicts the least recently used entry; use
    /// [`Lru::set_evicted`] to receive it.
    pub fn set(&self, key: K, value: V) -> Option<V> {
        self.set_evicted(key, value).0
    }

    /// Like [`Lru::set`], also returning the entry evicted to make room.
    ///
    /// Replacing an existing key never evicts.
    pub fn set_evicted(&self, key: K, value: V) -> (Option<V>, Option<(K, V)>) {
        let mut guard = self.inner.write();
        let list = guard.get_or_insert_with(|| LruList::new(DEFAULT_SIZE));

        let (prev, evicted) = list.put(key, value);
        if prev.is_none() {
            self.stats.record_insert();
        }
        if evicted.is_some() {
            trace!(len = list.len(), "evicted least recently used entry");
            self.stats.record_evictions(1);
        }

        (prev, evicted)
    }

    /// Look up a value and mark it most recently used
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        let mut guard = self.inner.write();
        let value = guard.as_mut().and_then(|list| list.get(key).cloned());

        if value.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        value
    }

    /// Look up a value without changing its recency
    pub fn peek<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.read()
            .as_ref()
            .and_then(|list| list.peek(key).cloned())
    }

    /// Check whether a key is cached, without changing its recency
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.read()
            .as_ref()
            .is_some_and(|list| list.contains(key))
    }

    /// Remove a key, returning its value if it was present
    pub fn delete<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.write().as_mut().and_then(|list| list.remove(key))
    }

    /// Change the capacity, evicting least recently used entries until the
    /// cache fits.
    ///
    /// # Returns
    /// * Evicted entries, oldest first
    /// * `Err(Error::InvalidCapacity)` if `capacity` is zero; the cache is
    ///   left untouched
    pub fn resize(&self, capacity: usize) -> Result<Vec<(K, V)>> {
        if capacity == 0 {
            return Err(Error::InvalidCapacity(capacity));
        }

        let mut guard = self.inner.write();
        let list = guard.get_or_insert_with(|| LruList::new(capacity));

        let old_capacity = list.capacity();
        let evicted = list.resize(capacity);
        self.stats.record_evictions(evicted.len() as u64);

        debug!(
            from = old_capacity,
            to = capacity,
            evicted = evicted.len(),
            "resized cache"
        );
        Ok(evicted)
    }

    /// Remove every entry, keeping the capacity
    pub fn clear(&self) {
        let mut guard = self.inner.write();
        if let Some(list) = guard.as_mut() {
            debug!(dropped = list.len(), "cleared cache");
            list.clear();
        }
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.read().as_ref().map_or(0, |list| list.len())
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.read()
            .as_ref()
            .map_or(DEFAULT_SIZE, |list| list.capacity())
    }

    /// Visit entries from most to least recently used, stopping early when
    /// `visit` returns `false`.
    ///
    /// # Deadlocks
    ///
    /// The read lock is held for the whole walk. Calling `set`,
    /// `set_evicted`, `get`, `delete`, `resize` or `clear` on this cache from
    /// inside `visit` never returns. The read-only methods (`peek`,
    /// `contains`, `len`, `is_empty`, `capacity`, `range`, `reverse`) may be
    /// called from `visit`.
    pub fn range<F>(&self, visit: F)
    where
        F: FnMut(&K, &V) -> bool,
    {
        if let Some(list) = self.read().as_ref() {
            list.range(visit);
        }
    }

    /// Visit entries from least to most recently used, stopping early when
    /// `visit` returns `false`.
    ///
    /// # Deadlocks
    ///
    /// Same rule as [`Lru::range`]: any method of this cache that modifies it,
    /// or that reorders it like `get`, never returns when called from `visit`.
    pub fn reverse<F>(&self, visit: F)
    where
        F: FnMut(&K, &V) -> bool,
    {
        if let Some(list) = self.read().as_ref() {
            list.reverse(visit);
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Shared access that may nest inside another shared access on the same
    /// thread, even with a writer waiting.
    fn read(&self) -> RwLockReadGuard<'_, Option<LruList<K, V>>> {
        self.inner.read_recursive()
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        if let Some(list) = self.inner.read().as_ref() {
            list.check_invariants().unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

    fn collect<K: Clone, V: Clone>(cache: &Lru<K, V>) -> Vec<(K, V)>
    where
        K: Hash + Eq,
    {
        let mut out = Vec::new();
        cache.range(|k, v| {
            out.push((k.clone(), v.clone()));
            true
        });
        out
    }

    fn collect_reversed<K: Clone, V: Clone>(cache: &Lru<K, V>) -> Vec<(K, V)>
    where
        K: Hash + Eq,
    {
        let mut out = Vec::new();
        cache.reverse(|k, v| {
            out.push((k.clone(), v.clone()));
            true
        });
        out
    }

    #[test]
    fn test_cache_scenario() {
        let cache = Lru::with_capacity(2).unwrap();

        assert_eq!(cache.set(1, "a"), None);
        assert_eq!(cache.set(2, "b"), None);

        let (prev, evicted) = cache.set_evicted(3, "c");
        assert_eq!(prev, None);
        assert_eq!(evicted, Some((1, "a")));

        assert_eq!(cache.get(&2), Some("b"));
        assert_eq!(collect(&cache), vec![(2, "b"), (3, "c")]);

        assert_eq!(cache.delete(&3), Some("c"));
        assert_eq!(cache.len(), 1);
        cache.check_invariants();
    }

    #[test]
    fn test_cache_touch_order() {
        let cache = Lru::new();

        cache.set('A', 1);
        cache.set('B', 2);
        cache.set('C', 3);
        cache.get(&'A');

        let forward: Vec<char> = collect(&cache).into_iter().map(|(k, _)| k).collect();
        let backward: Vec<char> = collect_reversed(&cache)
            .into_iter()
            .map(|(k, _)| k)
            .collect();

        assert_eq!(forward, vec!['A', 'C', 'B']);
        assert_eq!(backward, vec!['B', 'C', 'A']);
    }

    #[test]
    fn test_cache_peek_does_not_touch() {
        let cache = Lru::with_capacity(2).unwrap();

        cache.set(1, 10);
        cache.set(2, 20);
        assert_eq!(cache.peek(&1), Some(10));
        assert!(cache.contains(&1));

        // 1 is still the least recently used
        let (_, evicted) = cache.set_evicted(3, 30);
        assert_eq!(evicted, Some((1, 10)));
        assert_eq!(cache.stats().hits(), 0);
    }

    #[test]
    fn test_cache_overwrite() {
        let cache = Lru::with_capacity(2).unwrap();

        cache.set(1, "a");
        cache.set(2, "b");

        let (prev, evicted) = cache.set_evicted(1, "z");
        assert_eq!(prev, Some("a"));
        assert_eq!(evicted, None);
        assert_eq!(cache.len(), 2);
        assert_eq!(collect(&cache), vec![(1, "z"), (2, "b")]);
    }

    #[test]
    fn test_cache_int_overwrite() {
        let cache = Lru::new();

        cache.set(123, 123);
        cache.set(123, 456);
        assert_eq!(cache.get(&123), Some(456));
    }

    #[test]
    fn test_cache_missing_key() {
        let cache: Lru<String, i32> = Lru::new();

        assert_eq!(cache.get("hello"), None);
        assert_eq!(cache.peek("hello"), None);
        assert_eq!(cache.delete("hello"), None);
        assert!(!cache.contains("hello"));

        assert_eq!(cache.set("hello".to_string(), 1), None);
        assert_eq!(cache.get("hello"), Some(1));
    }

    #[test]
    fn test_cache_lazy_default() {
        let cache: Lru<u32, u32> = Lru::default();

        assert_eq!(cache.len(), 0);
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), DEFAULT_SIZE);
        assert!(cache.inner.read().is_none());

        cache.range(|_, _| panic!("empty cache has no entries"));
        cache.clear();
        assert!(cache.inner.read().is_none());

        cache.set(1, 1);
        assert_eq!(cache.capacity(), DEFAULT_SIZE);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_resize_before_first_set() {
        let cache: Lru<u32, u32> = Lru::new();

        assert!(cache.resize(3).unwrap().is_empty());
        assert_eq!(cache.capacity(), 3);

        for i in 0..5 {
            cache.set(i, i);
        }
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_cache_resize_shrink() {
        let cache = Lru::with_capacity(5).unwrap();

        for i in 0..5 {
            cache.set(i, i * 10);
        }
        cache.get(&0);

        let evicted = cache.resize(2).unwrap();
        assert_eq!(evicted, vec![(1, 10), (2, 20), (3, 30)]);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.capacity(), 2);
        assert_eq!(collect(&cache), vec![(0, 0), (4, 40)]);
        assert_eq!(cache.stats().evictions(), 3);
        cache.check_invariants();
    }

    #[test]
    fn test_cache_resize_rejects_zero() {
        let cache = Lru::with_capacity(4).unwrap();
        cache.set(1, 1);
        cache.set(2, 2);

        assert_eq!(cache.resize(0), Err(Error::InvalidCapacity(0)));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.capacity(), 4);

        assert!(matches!(
            Lru::<u8, u8>::with_capacity(0),
            Err(Error::InvalidCapacity(0))
        ));
    }

    #[test]
    fn test_cache_range_stops_early() {
        let cache = Lru::new();
        for i in 0..10 {
            cache.set(i, ());
        }

        let mut seen = Vec::new();
        cache.range(|k, _| {
            seen.push(*k);
            seen.len() < 3
        });
        assert_eq!(seen, vec![9, 8, 7]);

        let mut least = None;
        cache.reverse(|k, _| {
            least = Some(*k);
            false
        });
        assert_eq!(least, Some(0));
    }

    #[test]
    fn test_cache_clear() {
        let cache = Lru::with_capacity(10).unwrap();

        cache.set(1, "a");
        cache.set(2, "b");
        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), 10);
        assert_eq!(cache.get(&1), None);
        cache.check_invariants();
    }

    #[test]
    fn test_cache_clear_keeps_stats() {
        let cache = Lru::with_capacity(1).unwrap();

        cache.set(1, "a");
        cache.set(2, "b"); // evicts 1
        cache.get(&2);
        cache.get(&1);
        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.stats().inserts(), 2);
        assert_eq!(cache.stats().evictions(), 1);
        assert_eq!(cache.stats().hits(), 1);
        assert_eq!(cache.stats().misses(), 1);
    }

    #[test]
    fn test_cache_key_without_clone() {
        #[derive(Debug, PartialEq, Eq, Hash)]
        struct Id(u32);

        let cache = Lru::with_capacity(1).unwrap();

        cache.set(Id(1), 10);
        let (_, evicted) = cache.set_evicted(Id(2), 20);

        assert_eq!(evicted, Some((Id(1), 10)));
        assert_eq!(cache.get(&Id(2)), Some(20));
        assert!(!cache.contains(&Id(1)));
    }

    #[test]
    fn test_cache_reads_inside_visitor() {
        let cache = Lru::new();
        cache.set(1, "a");
        cache.set(2, "b");

        let mut seen = Vec::new();
        cache.reverse(|k, _| {
            seen.push((*k, cache.peek(k), cache.len()));
            true
        });
        assert_eq!(seen, vec![(1, Some("a"), 2), (2, Some("b"), 2)]);
    }

    #[test]
    fn test_cache_stats() {
        let cache = Lru::with_capacity(2).unwrap();

        cache.set(1, "a");
        cache.set(2, "b");
        cache.set(1, "c"); // replace, not an insert
        cache.set(3, "d"); // evicts 2

        cache.get(&1); // hit
        cache.get(&2); // miss
        cache.get(&3); // hit

        assert_eq!(cache.stats().inserts(), 3);
        assert_eq!(cache.stats().evictions(), 1);
        assert_eq!(cache.stats().hits(), 2);
        assert_eq!(cache.stats().misses(), 1);
    }

    #[test]
    fn test_cache_bulk_random() {
        let n = DEFAULT_SIZE * 10;
        let mut vals: Vec<usize> = (0..n).collect();
        vals.shuffle(&mut StdRng::seed_from_u64(0x5eed));
        let mut items: Vec<(String, usize)> =
            vals.into_iter().map(|v| (v.to_string(), v)).collect();

        let mut size = DEFAULT_SIZE;
        let cache: Lru<String, usize> = Lru::new();

        for (i, (key, val)) in items.iter().enumerate() {
            let (prev, evicted) = cache.set_evicted(key.clone(), *val);
            assert_eq!(prev, None);
            if let Some(evicted) = evicted {
                assert!(i >= size, "evicted too soon: {}", i);
                assert_eq!(evicted, items[i - size]);
            }
            assert!(cache.len() <= cache.capacity());
        }
        assert_eq!(cache.len(), size);

        let evicted = cache.resize(size / 2).unwrap();
        assert_eq!(evicted.len(), DEFAULT_SIZE / 2);
        assert_eq!(evicted[..], items[n - size..n - size / 2]);
        size /= 2;
        cache.check_invariants();

        let live = &items[n - size..];

        let mut forward = collect(&cache);
        forward.reverse();
        assert_eq!(forward[..], live[..]);
        assert_eq!(collect_reversed(&cache)[..], live[..]);

        for (i, (key, val)) in items.iter().enumerate() {
            let expected = if i < n - size { None } else { Some(*val) };
            assert_eq!(cache.contains(key), expected.is_some());
            assert_eq!(cache.peek(key), expected);
            assert_eq!(cache.get(key), expected);
        }

        for (key, val) in items[n - size..].iter_mut() {
            let prev = *val;
            *val += 1;
            let (old, evicted) = cache.set_evicted(key.clone(), *val);
            assert_eq!(old, Some(prev));
            assert_eq!(evicted, None);
        }

        for (key, val) in &items[n - size..] {
            assert_eq!(cache.delete(key), Some(*val));
        }
        assert!(cache.is_empty());

        assert_eq!(cache.resize(0), Err(Error::InvalidCapacity(0)));
        assert_eq!(cache.delete("hello"), None);
        assert_eq!(cache.set("hello".to_string(), 1), None);
        cache.check_invariants();
    }
}
