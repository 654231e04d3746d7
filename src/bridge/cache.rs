use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// Map capped at `capacity` entries. When an insert overflows it, the
/// `evict_batch` oldest entries (by insertion order) are dropped together.
/// Re-inserting a key makes it the newest.
#[derive(Debug, Clone)]
pub struct BoundedCache<K, V> {
    entries: HashMap<K, V>,
    order: VecDeque<K>,
    capacity: usize,
    evict_batch: usize,
}

impl<K: Eq + Hash + Clone, V> BoundedCache<K, V> {
    pub fn new(capacity: usize, evict_batch: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
            evict_batch: evict_batch.clamp(1, capacity),
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        if self.entries.insert(key.clone(), value).is_some() {
            self.order.retain(|k| k != &key);
        }
        self.order.push_back(key);
        if self.entries.len() > self.capacity {
            let n = self.evict_batch.min(self.order.len());
            for old in self.order.drain(..n) {
                self.entries.remove(&old);
            }
            tracing::debug!(evicted = n, capacity = self.capacity, "bounded cache evicted");
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let value = self.entries.remove(key)?;
        self.order.retain(|k| k != key);
        Some(value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
