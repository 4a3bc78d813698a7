//! Hash-bucketed array of lock-free stacks.

use crate::stack::AtomicStack;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// A lock-free map from keys to bags of values, built as a fixed array of
/// [`AtomicStack`] buckets.
///
/// Supports concurrent `insert` and `steal_matching`; there is no lookup or
/// per-entry removal. Values under one key come back in no particular order.
pub struct BucketMap<K, V> {
    buckets: Box<[AtomicStack<(K, V)>]>,
    mask: usize,
}

impl<K: Hash + Eq, V> BucketMap<K, V> {
    /// `bucket_count` is rounded up to a power of two.
    pub fn new(bucket_count: usize) -> Self {
        let count = bucket_count.max(1).next_power_of_two();
        let buckets = (0..count)
            .map(|_| AtomicStack::new())
            .collect::<Vec<_>>()
            .into_boxed_slice();
        BucketMap {
            buckets,
            mask: count - 1,
        }
    }

    fn bucket_for(&self, key: &K) -> &AtomicStack<(K, V)> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.buckets[(hasher.finish() as usize) & self.mask]
    }

    pub fn insert(&self, key: K, value: V) {
        self.bucket_for(&key).push((key, value));
    }

    /// Steals every entry in `probe`'s bucket whose key satisfies `matches`
    /// and returns the matched values. Non-matching entries are threaded back
    /// into the bucket unchanged.
    ///
    /// Safe to run concurrently with inserts: an insert that lands after the
    /// detach simply stays in the bucket for the next steal, and callers that
    /// insert re-validate their own condition afterwards.
    pub fn steal_matching(&self, probe: &K, matches: impl Fn(&K) -> bool) -> Vec<V> {
        let bucket = self.bucket_for(probe);
        let mut taken = Vec::new();
        for (key, value) in bucket.steal_all() {
            if matches(&key) {
                taken.push(value);
            } else {
                bucket.push((key, value));
            }
        }
        taken
    }
}
