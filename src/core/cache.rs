//! Shared caches for decoded dirents and decompressed clusters
//!
//! Both caches are owned by one open archive and shared by every thread
//! reading from it. Each keeps its bookkeeping behind a `parking_lot::Mutex`
//! that is only held for map operations, never across decoding or
//! decompression.
//!
//! - [`ClusterCache`]: LRU bounded by total decompressed bytes
//! - [`DirentCache`]: LRU bounded by entry count
//!
//! A capacity of zero disables a cache; reads still work, they just always
//! miss.

use crate::core::cluster::Cluster;
use crate::core::dirent::Dirent;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Total cache hits
    pub hits: u64,
    /// Total cache misses
    pub misses: u64,
    /// Entries currently cached
    pub entries: usize,
    /// Current weight (bytes for clusters, entries for dirents)
    pub weight: usize,
    /// Maximum weight
    pub capacity: usize,
}

impl CacheStats {
    /// Calculate hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

struct ClusterCacheInner {
    lru: LruCache<u32, Arc<Cluster>>,
    weight: usize,
    hits: u64,
    misses: u64,
}

/// Decompressed-cluster cache bounded by memory size
pub struct ClusterCache {
    inner: Mutex<ClusterCacheInner>,
    capacity: usize,
}

impl ClusterCache {
    /// Create a cache holding at most `capacity` bytes of decompressed clusters
    pub fn new(capacity: usize) -> Self {
        ClusterCache {
            inner: Mutex::new(ClusterCacheInner {
                lru: LruCache::unbounded(),
                weight: 0,
                hits: 0,
                misses: 0,
            }),
            capacity,
        }
    }

    /// Get a cluster from the cache
    pub fn get(&self, index: u32) -> Option<Arc<Cluster>> {
        let mut inner = self.inner.lock();
        match inner.lru.get(&index).cloned() {
            Some(cluster) => {
                inner.hits += 1;
                Some(cluster)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Insert `cluster` unless another thread already cached this index
    ///
    /// Returns the cached value, so racing readers converge on a single
    /// decompressed copy and the loser's copy is dropped.
    pub fn insert_if_absent(&self, index: u32, cluster: Arc<Cluster>) -> Arc<Cluster> {
        let size = cluster.memory_size();
        if size > self.capacity {
            return cluster;
        }

        let mut inner = self.inner.lock();
        if let Some(existing) = inner.lru.get(&index) {
            return Arc::clone(existing);
        }

        while inner.weight + size > self.capacity {
            match inner.lru.pop_lru() {
                Some((_, evicted)) => inner.weight -= evicted.memory_size(),
                None => break,
            }
        }

        inner.lru.put(index, Arc::clone(&cluster));
        inner.weight += size;
        cluster
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            entries: inner.lru.len(),
            weight: inner.weight,
            capacity: self.capacity,
        }
    }

    /// Drop every cached cluster
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.lru.clear();
        inner.weight = 0;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct DirentCacheInner {
    lru: Option<LruCache<u32, Dirent>>,
    hits: u64,
    misses: u64,
}

/// LRU cache of decoded dirents keyed by position
pub struct DirentCache {
    inner: Mutex<DirentCacheInner>,
    capacity: usize,
}

impl DirentCache {
    /// Create a new dirent cache with given capacity
    pub fn new(capacity: usize) -> Self {
        DirentCache {
            inner: Mutex::new(DirentCacheInner {
                lru: NonZeroUsize::new(capacity).map(LruCache::new),
                hits: 0,
                misses: 0,
            }),
            capacity,
        }
    }

    /// Get cached dirent
    pub fn get(&self, position: u32) -> Option<Dirent> {
        let mut inner = self.inner.lock();
        let found = inner.lru.as_mut().and_then(|lru| lru.get(&position).cloned());
        if found.is_some() {
            inner.hits += 1;
        } else {
            inner.misses += 1;
        }
        found
    }

    /// Put dirent in cache
    pub fn put(&self, position: u32, dirent: Dirent) {
        if let Some(lru) = self.inner.lock().lru.as_mut() {
            lru.put(position, dirent);
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let entries = inner.lru.as_ref().map_or(0, |lru| lru.len());
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            entries,
            weight: entries,
            capacity: self.capacity,
        }
    }

    /// Clear the cache
    pub fn clear(&self) {
        if let Some(lru) = self.inner.lock().lru.as_mut() {
            lru.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::compression::Compression;

    fn cluster_of(size: usize) -> Arc<Cluster> {
        let blob = vec![0xAB; size];
        let body = Cluster::encode_body(&[blob.as_slice()]);
        Arc::new(Cluster::parse(Compression::None, body).unwrap())
    }

    fn dirent(position: u32) -> Dirent {
        Dirent::content(position, 'A', format!("page{}", position), "", 0, 0, position)
    }

    #[test]
    fn test_cluster_cache_hit_and_miss() {
        let cache = ClusterCache::new(1 << 20);
        assert!(cache.get(1).is_none());

        cache.insert_if_absent(1, cluster_of(100));
        assert!(cache.get(1).is_some());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert!((stats.hit_rate() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_insert_if_absent_keeps_first() {
        let cache = ClusterCache::new(1 << 20);
        let first = cache.insert_if_absent(7, cluster_of(10));
        let second = cache.insert_if_absent(7, cluster_of(10));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cluster_cache_evicts_by_weight() {
        let one = cluster_of(1000).memory_size();
        let cache = ClusterCache::new(one * 2);

        cache.insert_if_absent(0, cluster_of(1000));
        cache.insert_if_absent(1, cluster_of(1000));
        cache.insert_if_absent(2, cluster_of(1000));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(0).is_none());
        assert!(cache.get(2).is_some());
        assert!(cache.stats().weight <= one * 2);
    }

    #[test]
    fn test_oversized_cluster_not_cached() {
        let cache = ClusterCache::new(64);
        let cluster = cache.insert_if_absent(0, cluster_of(1000));
        assert_eq!(cluster.blob(0).unwrap().len(), 1000);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_disables_cluster_cache() {
        let cache = ClusterCache::new(0);
        cache.insert_if_absent(0, cluster_of(1));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_dirent_cache_lru_eviction() {
        let cache = DirentCache::new(2);

        cache.put(0, dirent(0));
        cache.put(1, dirent(1));
        cache.put(2, dirent(2));

        assert!(cache.get(0).is_none());
        assert_eq!(cache.get(1).unwrap().url(), "page1");
        assert_eq!(cache.get(2).unwrap().url(), "page2");
        assert_eq!(cache.stats().entries, 2);
    }

    #[test]
    fn test_dirent_cache_disabled() {
        let cache = DirentCache::new(0);
        cache.put(0, dirent(0));
        assert!(cache.get(0).is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_clear() {
        let cache = DirentCache::new(10);
        cache.put(1, dirent(1));
        cache.clear();
        assert!(cache.get(1).is_none());

        let clusters = ClusterCache::new(1 << 20);
        clusters.insert_if_absent(1, cluster_of(8));
        clusters.clear();
        assert!(clusters.is_empty());
        assert_eq!(clusters.stats().weight, 0);
    }
}
