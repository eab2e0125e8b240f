use std::cmp::min;
use std::ops::{Index, IndexMut};

use log::debug;

use crate::utils::{mix64, MyHash};

#[derive(Clone)]
struct Entry<T> {
    value: T,
    next: usize,
    occupied: bool,
}

impl<T> Entry<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            next: 0,
            occupied: false,
        }
    }
}

impl<T> Default for Entry<T>
where
    T: Default,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Hash-consing table with separate chaining.
///
/// Cell `0` is a sentry and is never handed out. Both the cell storage and the
/// bucket array grow on demand, so the table never fills up.
pub struct Table<T> {
    data: Vec<Entry<T>>,

    buckets: Vec<usize>,
    bitmask: u64,

    /// Index of the first *possibly* free (non-occupied) cell.
    min_free: usize,
    /// Index of the last occupied cell.
    last_index: usize,
    /// Number of occupied cells.
    real_size: usize,
}

impl<T> Table<T>
where
    T: Default,
{
    /// Create a new table with initial capacity `2^bits`.
    pub fn new(bits: usize) -> Self {
        assert!(bits <= 31, "Storage bits should be in the range 0..=31");

        let capacity = 1 << bits;
        let mut data: Vec<Entry<T>> = Vec::with_capacity(capacity);
        data.resize_with(capacity, Entry::default);
        data[0].occupied = true; // sentry

        let buckets_size = 1 << min(bits, 16);
        Self {
            data,
            buckets: vec![0; buckets_size],
            bitmask: (buckets_size - 1) as u64,
            min_free: 1,
            last_index: 0,
            real_size: 0,
        }
    }

    fn grow(&mut self) {
        let new_capacity = (self.data.len() * 2).max(2);
        debug!("Growing table storage from {} to {}", self.data.len(), new_capacity);
        self.data.resize_with(new_capacity, Entry::default);
    }

    /// Allocate a new cell in the table and return its index.
    pub(crate) fn alloc(&mut self) -> usize {
        let index = (self.min_free..=self.last_index)
            .find(|&i| !self.data[i].occupied)
            .unwrap_or_else(|| {
                self.last_index += 1;
                self.last_index
            });

        if index >= self.capacity() {
            self.grow();
        }

        self.data[index].occupied = true;
        self.min_free = index + 1;
        self.real_size += 1;

        index
    }

    /// Add a new value to the table (outside any bucket) and return its index.
    pub fn add(&mut self, value: T) -> usize {
        let index = self.alloc();
        self.data[index].value = value;
        self.data[index].next = 0;
        index
    }
}

impl<T> Table<T> {
    /// Get the capacity of the table.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }
    /// Get the index of the last occupied cell.
    pub fn size(&self) -> usize {
        self.last_index
    }
    /// Get the number of occupied cells.
    pub fn real_size(&self) -> usize {
        self.real_size
    }

    /// Get the reference to the value at the given index.
    pub fn value(&self, index: usize) -> &T {
        assert_ne!(index, 0, "Index is 0");
        &self.data[index].value
    }
    /// Get the mutable reference to the value at the given index.
    pub fn value_mut(&mut self, index: usize) -> &mut T {
        assert_ne!(index, 0, "Index is 0");
        &mut self.data[index].value
    }

    /// Check if the cell at the given index is occupied.
    pub fn is_occupied(&self, index: usize) -> bool {
        assert_ne!(index, 0, "Index is 0");
        self.data[index].occupied
    }
    /// Get the index of the next cell in the chain.
    pub fn next(&self, index: usize) -> usize {
        assert_ne!(index, 0, "Index is 0");
        self.data[index].next
    }
    /// Set the index of the next cell in the chain.
    pub fn set_next(&mut self, index: usize, next: usize) {
        assert_ne!(index, 0, "Index is 0");
        self.data[index].next = next;
    }

    /// Number of hash buckets.
    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }
    /// Head of the chain for the given bucket (`0` for an empty bucket).
    pub fn bucket(&self, i: usize) -> usize {
        self.buckets[i]
    }
    /// Relink the head of the chain for the given bucket.
    pub fn set_bucket(&mut self, i: usize, index: usize) {
        self.buckets[i] = index;
    }

    /// Drop the value at the given index.
    pub fn drop(&mut self, index: usize) {
        assert_ne!(index, 0, "Index is 0");
        assert!(self.data[index].occupied, "Double drop of cell {}", index);

        self.data[index].occupied = false;
        self.data[index].next = 0;
        self.min_free = min(self.min_free, index);
        self.real_size -= 1;
        while self.last_index > 0 && !self.data[self.last_index].occupied {
            self.last_index -= 1;
        }
    }
}

impl<T> Table<T>
where
    T: MyHash + Eq + Default,
{
    fn bucket_index(&self, value: &T) -> usize {
        (mix64(value.hash()) & self.bitmask) as usize
    }

    /// Put a value into the table, returning the index of the (possibly existing) equal cell.
    pub fn put(&mut self, value: T) -> usize {
        if self.real_size > 2 * self.buckets.len() {
            self.rehash(self.buckets.len() * 2);
        }

        let bucket_index = self.bucket_index(&value);
        let mut index = self.buckets[bucket_index];

        if index == 0 {
            let i = self.add(value);
            self.buckets[bucket_index] = i;
            return i;
        }

        loop {
            if &value == self.value(index) {
                return index;
            }

            let next = self.next(index);
            if next == 0 {
                let i = self.add(value);
                self.set_next(index, i);
                return i;
            }
            index = next;
        }
    }

    fn rehash(&mut self, new_size: usize) {
        debug!("Rehashing table: {} -> {} buckets", self.buckets.len(), new_size);

        let mut chained = Vec::with_capacity(self.real_size);
        for &head in &self.buckets {
            let mut index = head;
            while index != 0 {
                chained.push(index);
                index = self.data[index].next;
            }
        }

        self.buckets = vec![0; new_size];
        self.bitmask = (new_size - 1) as u64;
        for index in chained {
            let b = self.bucket_index(&self.data[index].value);
            self.data[index].next = self.buckets[b];
            self.buckets[b] = index;
        }
    }
}

impl<T> Index<usize> for Table<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        self.value(index)
    }
}

impl<T> IndexMut<usize> for Table<T> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        self.value_mut(index)
    }
}
