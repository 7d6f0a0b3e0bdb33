//! Separate-chaining hash table.

use std::hash::{DefaultHasher, Hash, Hasher};

const INITIAL_BUCKETS: usize = 8;

/// Hash table with per-bucket chains and a power-of-two bucket array.
///
/// The table doubles its bucket array when the load factor reaches 1.0.
/// Lookups answer misses with `None`; a missing key is an ordinary outcome,
/// not an error. Not internally synchronized.
pub struct HashTable<K, V> {
    buckets: Vec<Vec<(K, V)>>,
    len: usize,
}

impl<K: Hash + Eq, V> HashTable<K, V> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_BUCKETS)
    }

    /// Create an empty table sized for at least `capacity` entries before
    /// the first rehash.
    pub fn with_capacity(capacity: usize) -> Self {
        let buckets = capacity.next_power_of_two().max(INITIAL_BUCKETS);
        HashTable {
            buckets: (0..buckets).map(|_| Vec::new()).collect(),
            len: 0,
        }
    }

    fn bucket_of(&self, key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        // Bucket count is a power of two.
        (hasher.finish() as usize) & (self.buckets.len() - 1)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Is the table empty?
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert or replace. Returns the previous value for the key, if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        if self.len >= self.buckets.len() {
            self.grow();
        }
        let at = self.bucket_of(&key);
        let chain = &mut self.buckets[at];
        for slot in chain.iter_mut() {
            if slot.0 == key {
                return Some(std::mem::replace(&mut slot.1, value));
            }
        }
        chain.push((key, value));
        self.len += 1;
        None
    }

    /// Look up a key.
    pub fn find(&self, key: &K) -> Option<&V> {
        let at = self.bucket_of(key);
        self.buckets[at]
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Look up a key for mutation.
    pub fn find_mut(&mut self, key: &K) -> Option<&mut V> {
        let at = self.bucket_of(key);
        self.buckets[at]
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Is the key present?
    pub fn contains(&self, key: &K) -> bool {
        self.find(key).is_some()
    }

    /// Remove a key, returning its value if it was present.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let at = self.bucket_of(key);
        let chain = &mut self.buckets[at];
        let index = chain.iter().position(|(k, _)| k == key)?;
        self.len -= 1;
        Some(chain.swap_remove(index).1)
    }

    /// Drop every entry, keeping the bucket array.
    pub fn clear(&mut self) {
        for chain in &mut self.buckets {
            chain.clear();
        }
        self.len = 0;
    }

    /// Visit every entry, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.buckets
            .iter()
            .flat_map(|chain| chain.iter().map(|(k, v)| (k, v)))
    }

    /// Visit every entry mutably, in no particular order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut V)> {
        self.buckets
            .iter_mut()
            .flat_map(|chain| chain.iter_mut().map(|(k, v)| (&*k, v)))
    }

    /// Keys, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(k, _)| k)
    }

    fn grow(&mut self) {
        let doubled = self.buckets.len() * 2;
        let old = std::mem::replace(
            &mut self.buckets,
            (0..doubled).map(|_| Vec::new()).collect(),
        );
        for (key, value) in old.into_iter().flatten() {
            let at = self.bucket_of(&key);
            self.buckets[at].push((key, value));
        }
    }
}

impl<K: Hash + Eq, V> Default for HashTable<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq + std::fmt::Debug, V: std::fmt::Debug> std::fmt::Debug for HashTable<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_find_remove() {
        let mut t = HashTable::new();
        assert!(t.is_empty());
        assert_eq!(t.insert("a", 1), None);
        assert_eq!(t.insert("b", 2), None);
        assert_eq!(t.insert("a", 10), Some(1));
        assert_eq!(t.len(), 2);

        assert_eq!(t.find(&"a"), Some(&10));
        assert_eq!(t.find(&"c"), None);
        assert!(t.contains(&"b"));

        *t.find_mut(&"b").unwrap() += 1;
        assert_eq!(t.remove(&"b"), Some(3));
        assert_eq!(t.remove(&"b"), None);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_grow_keeps_entries() {
        let mut t = HashTable::new();
        for i in 0..1000 {
            t.insert(i, i * 2);
        }
        assert_eq!(t.len(), 1000);
        for i in 0..1000 {
            assert_eq!(t.find(&i), Some(&(i * 2)));
        }
    }

    #[test]
    fn test_clear_and_iter() {
        let mut t = HashTable::new();
        for i in 0..10 {
            t.insert(i, ());
        }
        let mut keys: Vec<_> = t.keys().copied().collect();
        keys.sort_unstable();
        assert_eq!(keys, (0..10).collect::<Vec<_>>());

        t.clear();
        assert!(t.is_empty());
        assert_eq!(t.iter().count(), 0);
    }
}
