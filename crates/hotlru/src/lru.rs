//! LRU (Least Recently Used) recency list
//!
//! Entries live in a slot arena and are linked by index, so touch and
//! eviction are O(1) index rewrites. Slots `HEAD` and `TAIL` are permanent
//! sentinels: they never hold an entry and are never counted.
//!
//! The index is a `HashTable` of slot numbers. Keys are stored once, in their
//! slot, together with their hash.

use std::borrow::Borrow;
use std::hash::Hash;
use std::mem;

use ahash::RandomState;
use hashbrown::hash_table::{Entry as HashTableEntry, HashTable};

/// Arena slot of the head sentinel (most recently used side)
const HEAD: usize = 0;

/// Arena slot of the tail sentinel (least recently used side)
const TAIL: usize = 1;

/// Upper bound on slots reserved up front, whatever the capacity
const MAX_PREALLOC: usize = 4096;

/// Slot in the recency list
struct Node<K, V> {
    /// `None` for sentinels and free slots
    entry: Option<(K, V)>,
    hash: u64,
    more_recent: usize,
    less_recent: usize,
}

impl<K, V> Node<K, V> {
    fn sentinel() -> Self {
        Self {
            entry: None,
            hash: 0,
            more_recent: HEAD,
            less_recent: TAIL,
        }
    }

    fn key(&self) -> Option<&K> {
        self.entry.as_ref().map(|(key, _)| key)
    }
}

/// Unsynchronized LRU list with a fixed capacity
pub(crate) struct LruList<K, V> {
    table: HashTable<usize>,
    hasher: RandomState,
    nodes: Vec<Node<K, V>>,
    free_list: Vec<usize>,
    capacity: usize,
}

impl<K, V> LruList<K, V>
where
    K: Hash + Eq,
{
    /// Create an empty list. `capacity` must be non-zero.
    pub(crate) fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0, "capacity must be greater than 0");

        let reserve = capacity.min(MAX_PREALLOC);
        let mut nodes = Vec::with_capacity(reserve + 2);
        nodes.push(Node::sentinel());
        nodes.push(Node::sentinel());

        Self {
            table: HashTable::with_capacity(reserve),
            hasher: RandomState::new(),
            nodes,
            free_list: Vec::new(),
            capacity,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.table.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find(key).is_some()
    }

    /// Look up without touching
    pub(crate) fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = self.find(key)?;
        self.value(idx)
    }

    /// Look up and move the entry to the head
    pub(crate) fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = self.find(key)?;
        self.touch(idx);
        self.value(idx)
    }

    /// Insert or replace, returning the previous value and the entry evicted
    /// to make room, if any.
    pub(crate) fn put(&mut self, key: K, value: V) -> (Option<V>, Option<(K, V)>) {
        let hash = self.hasher.hash_one(&key);

        if let Some(idx) = self.find_hashed(hash, &key) {
            let prev = self.nodes[idx]
                .entry
                .as_mut()
                .map(|(_, slot)| mem::replace(slot, value));
            self.touch(idx);
            return (prev, None);
        }

        let evicted = if self.table.len() >= self.capacity {
            self.pop_lru()
        } else {
            None
        };

        let idx = self.alloc_node(hash, key, value);
        self.link_front(idx);
        let nodes = &self.nodes;
        self.table.insert_unique(hash, idx, |&i| nodes[i].hash);

        (None, evicted)
    }

    /// Remove a key, returning its value
    pub(crate) fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hasher.hash_one(key);
        let nodes = &self.nodes;
        let idx = match self.table.entry(
            hash,
            |&i| nodes[i].key().is_some_and(|k| Borrow::<Q>::borrow(k) == key),
            |&i| nodes[i].hash,
        ) {
            HashTableEntry::Occupied(o) => o.remove().0,
            HashTableEntry::Vacant(_) => return None,
        };

        self.unlink(idx);
        self.free_node(idx).map(|(_, value)| value)
    }

    /// Evict the tail-adjacent entry
    pub(crate) fn pop_lru(&mut self) -> Option<(K, V)> {
        let idx = self.nodes[TAIL].more_recent;
        if idx == HEAD {
            return None;
        }

        if let Ok(o) = self.table.find_entry(self.nodes[idx].hash, |&i| i == idx) {
            o.remove();
        }
        self.unlink(idx);
        self.free_node(idx)
    }

    /// Set a new capacity, evicting from the tail until the list fits.
    /// Evicted entries are returned oldest first. `capacity` must be non-zero.
    pub(crate) fn resize(&mut self, capacity: usize) -> Vec<(K, V)> {
        debug_assert!(capacity > 0, "capacity must be greater than 0");

        let mut evicted = Vec::with_capacity(self.len().saturating_sub(capacity));
        while self.table.len() > capacity {
            match self.pop_lru() {
                Some(entry) => evicted.push(entry),
                None => break,
            }
        }
        self.capacity = capacity;
        evicted
    }

    /// Drop every entry; capacity is kept
    pub(crate) fn clear(&mut self) {
        self.table.clear();
        self.nodes.truncate(2);
        self.free_list.clear();
        self.nodes[HEAD] = Node::sentinel();
        self.nodes[TAIL] = Node::sentinel();
    }

    /// Visit entries from most to least recently used until `visit` returns
    /// `false`.
    pub(crate) fn range<F>(&self, mut visit: F)
    where
        F: FnMut(&K, &V) -> bool,
    {
        let mut idx = self.nodes[HEAD].less_recent;
        while idx != TAIL {
            let node = &self.nodes[idx];
            if let Some((key, value)) = &node.entry {
                if !visit(key, value) {
                    return;
                }
            }
            idx = node.less_recent;
        }
    }

    /// Visit entries from least to most recently used until `visit` returns
    /// `false`.
    pub(crate) fn reverse<F>(&self, mut visit: F)
    where
        F: FnMut(&K, &V) -> bool,
    {
        let mut idx = self.nodes[TAIL].more_recent;
        while idx != HEAD {
            let node = &self.nodes[idx];
            if let Some((key, value)) = &node.entry {
                if !visit(key, value) {
                    return;
                }
            }
            idx = node.more_recent;
        }
    }

    fn find<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find_hashed(self.hasher.hash_one(key), key)
    }

    fn find_hashed<Q>(&self, hash: u64, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let nodes = &self.nodes;
        self.table
            .find(hash, |&i| {
                nodes[i].key().is_some_and(|k| Borrow::<Q>::borrow(k) == key)
            })
            .copied()
    }

    fn value(&self, idx: usize) -> Option<&V> {
        self.nodes[idx].entry.as_ref().map(|(_, value)| value)
    }

    fn touch(&mut self, idx: usize) {
        if self.nodes[HEAD].less_recent == idx {
            return; // Already at front
        }

        self.unlink(idx);
        self.link_front(idx);
    }

    fn unlink(&mut self, idx: usize) {
        let (more, less) = {
            let node = &self.nodes[idx];
            (node.more_recent, node.less_recent)
        };
        self.nodes[more].less_recent = less;
        self.nodes[less].more_recent = more;
    }

    fn link_front(&mut self, idx: usize) {
        let first = self.nodes[HEAD].less_recent;

        let node = &mut self.nodes[idx];
        node.more_recent = HEAD;
        node.less_recent = first;

        self.nodes[first].more_recent = idx;
        self.nodes[HEAD].less_recent = idx;
    }

    fn alloc_node(&mut self, hash: u64, key: K, value: V) -> usize {
        let node = Node {
            entry: Some((key, value)),
            hash,
            more_recent: HEAD,
            less_recent: TAIL,
        };

        if let Some(idx) = self.free_list.pop() {
            self.nodes[idx] = node;
            idx
        } else {
            self.nodes.push(node);
            self.nodes.len() - 1
        }
    }

    fn free_node(&mut self, idx: usize) -> Option<(K, V)> {
        self.free_list.push(idx);
        self.nodes[idx].entry.take()
    }

    /// Walk the list both ways and cross-check it against the index
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) -> Result<(), String> {
        let len = self.table.len();
        if self.capacity == 0 {
            return Err("capacity is zero".to_string());
        }
        if len > self.capacity {
            return Err(format!("len {} exceeds capacity {}", len, self.capacity));
        }

        let mut forward = 0;
        let mut prev = HEAD;
        let mut idx = self.nodes[HEAD].less_recent;
        while idx != TAIL {
            let node = &self.nodes[idx];
            if node.more_recent != prev {
                return Err(format!("slot {} has a broken back link", idx));
            }
            let key = node
                .key()
                .ok_or_else(|| format!("slot {} is linked but empty", idx))?;
            if node.hash != self.hasher.hash_one(key) {
                return Err(format!("slot {} caches a stale hash", idx));
            }
            if self.find(key) != Some(idx) {
                return Err(format!("slot {} is not indexed by its key", idx));
            }
            forward += 1;
            if forward > len {
                return Err("forward walk longer than index".to_string());
            }
            prev = idx;
            idx = node.less_recent;
        }
        if self.nodes[TAIL].more_recent != prev {
            return Err("tail sentinel has a broken back link".to_string());
        }

        let mut backward = 0;
        let mut idx = self.nodes[TAIL].more_recent;
        while idx != HEAD {
            backward += 1;
            if backward > len {
                return Err("backward walk longer than index".to_string());
            }
            idx = self.nodes[idx].more_recent;
        }

        if forward != len || backward != len {
            return Err(format!(
                "index has {} keys, list has {} forward / {} backward",
                len, forward, backward
            ));
        }
        if self.nodes[HEAD].entry.is_some() || self.nodes[TAIL].entry.is_some() {
            return Err("sentinel holds an entry".to_string());
        }
        Ok(())
    }
}
