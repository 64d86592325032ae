//! Routing of records from the ingest stage to partition workers.

use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};

use ahash::AHasher;

use crate::config::Partitioning;
use crate::record::EventRecord;
use crate::types::GroupKey;

/// Picks the partition (0..num_partitions) a value goes to.
pub trait Partitioner<T>: Send + Sync {
    fn partition(&self, value: &T, num_partitions: usize) -> usize;
}

/// Hash-based partitioner using a key selector function.
///
/// `AHasher::default()` uses fixed keys, so routing is stable across runs.
pub struct HashPartitioner<K, F> {
    key_selector: F,
    _phantom: PhantomData<K>,
}

impl<K, F> HashPartitioner<K, F> {
    pub fn new(key_selector: F) -> Self {
        Self {
            key_selector,
            _phantom: PhantomData,
        }
    }
}

impl<K, T, F> Partitioner<T> for HashPartitioner<K, F>
where
    K: Hash + Send + Sync,
    F: Fn(&T) -> K + Send + Sync,
{
    fn partition(&self, value: &T, num_partitions: usize) -> usize {
        let key = (self.key_selector)(value);
        let mut hasher = AHasher::default();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % num_partitions
    }
}

/// Cycles through partitions in order.
#[derive(Default)]
pub struct RoundRobinPartitioner {
    counter: AtomicUsize,
}

impl RoundRobinPartitioner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T> Partitioner<T> for RoundRobinPartitioner {
    fn partition(&self, _value: &T, num_partitions: usize) -> usize {
        self.counter.fetch_add(1, Ordering::Relaxed) % num_partitions
    }
}

/// Build the record router for `strategy`.
///
/// Neither strategy keeps a key on one partition: cells of one school are
/// spread over workers and reconciled by the reduce stage.
pub fn record_partitioner<K: GroupKey>(
    strategy: Partitioning,
) -> Box<dyn Partitioner<EventRecord<K>>> {
    match strategy {
        Partitioning::RoundRobin => Box::new(RoundRobinPartitioner::new()),
        Partitioning::Hash => Box::new(HashPartitioner::new(|r: &EventRecord<K>| {
            (r.event_id.clone(), r.key.clone(), r.timestamp)
        })),
    }
}

#[cfg(test)]
#[path = "tests/partitioner_tests.rs"]
mod tests;
