//! Direct-mapped computed table.
//!
//! Each key hashes to exactly one slot and collisions overwrite. The full key is
//! stored next to the value, so a lookup never returns a result computed for a
//! different operation.

use crate::utils::{mix64, MyHash};

pub struct Cache<K, V> {
    entries: Vec<Option<(K, V)>>,
    bitmask: u64,
    hits: usize,
    misses: usize,
    faults: usize,
}

impl<K, V> Default for Cache<K, V> {
    fn default() -> Self {
        Self::new(14)
    }
}

impl<K, V> Cache<K, V> {
    /// Creates a new cache with `2^bits` slots.
    pub fn new(bits: usize) -> Self {
        assert!(bits <= 31, "Cache bits must be in range 0..=31, got {}", bits);

        let size = 1usize << bits;
        Self {
            entries: (0..size).map(|_| None).collect(),
            bitmask: (size - 1) as u64,
            hits: 0,
            misses: 0,
            faults: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }

    /// Misses caused by a slot holding a different key.
    pub fn faults(&self) -> usize {
        self.faults
    }

    pub fn clear(&mut self) {
        self.entries.fill_with(|| None);
    }
}

impl<K, V> Cache<K, V>
where
    K: MyHash + Eq,
    V: Copy,
{
    #[inline]
    fn index(&self, key: &K) -> usize {
        (mix64(key.hash()) & self.bitmask) as usize
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        let idx = self.index(key);
        match &self.entries[idx] {
            Some((k, v)) if k == key => {
                self.hits += 1;
                Some(*v)
            }
            Some(_) => {
                self.faults += 1;
                self.misses += 1;
                None
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        let idx = self.index(&key);
        self.entries[idx] = Some((key, value));
    }
}
