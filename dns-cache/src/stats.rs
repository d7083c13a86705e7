//! RRset statistics (§6: "Cache statistics counters (emitted, not
//! consumed)").
//!
//! Plain atomic counters, as the spec's own Non-goals exclude an
//! admin-plane RPC surface to export them through; a caller wanting a
//! metrics backend wraps [`CacheStats::snapshot`] in whatever exporter
//! it likes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use dns_types::protocol::types::RecordType;

/// The three shapes an RRset bucket can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BucketKind {
    Normal,
    NxdomainNegative,
    NxrrsetNegative,
}

/// The header's lifecycle stage at the moment it was counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BucketState {
    Active,
    Stale,
    Ancient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BucketKey {
    pub rtype: RecordType,
    pub kind: BucketKind,
    pub state: BucketState,
}

/// Global and per-RRtype cache statistics.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub coveringnsec: AtomicU64,
    pub deletettl: AtomicU64,
    pub deletelru: AtomicU64,
    buckets: Mutex<HashMap<BucketKey, u64>>,
}

impl CacheStats {
    pub fn new() -> Self {
        CacheStats {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            coveringnsec: AtomicU64::new(0),
            deletettl: AtomicU64::new(0),
            deletelru: AtomicU64::new(0),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_coveringnsec(&self) {
        self.coveringnsec.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deletettl(&self) {
        self.deletettl.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deletelru(&self) {
        self.deletelru.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_bucket(&self, key: BucketKey) {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        *buckets.entry(key).or_insert(0) += 1;
    }

    pub fn decrement_bucket(&self, key: BucketKey) {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(count) = buckets.get_mut(&key) {
            *count = count.saturating_sub(1);
        }
    }

    pub fn bucket_count(&self, key: BucketKey) -> u64 {
        *self
            .buckets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .unwrap_or(&0)
    }

    pub fn snapshot(&self) -> HashMap<BucketKey, u64> {
        self.buckets.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_and_decrement_track_bucket_count() {
        let stats = CacheStats::new();
        let key = BucketKey {
            rtype: RecordType::A,
            kind: BucketKind::Normal,
            state: BucketState::Active,
        };
        stats.bump_bucket(key);
        stats.bump_bucket(key);
        assert_eq!(2, stats.bucket_count(key));
        stats.decrement_bucket(key);
        assert_eq!(1, stats.bucket_count(key));
    }

    #[test]
    fn hits_and_misses_count_independently() {
        let stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        assert_eq!(2, stats.hits.load(Ordering::Relaxed));
        assert_eq!(1, stats.misses.load(Ordering::Relaxed));
    }
}
