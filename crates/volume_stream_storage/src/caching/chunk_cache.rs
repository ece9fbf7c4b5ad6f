use crate::{RegionData, SmallKeyLruCache};

use volume_stream_core::prelude::*;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Identifies one decoded chunk across every store a process reads from.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ChunkKey {
    pub store: String,
    pub path: String,
    /// `(z, y, x)` grid coordinates.
    pub chunk: Point3i,
}

impl ChunkKey {
    pub fn new(store: impl Into<String>, path: impl Into<String>, chunk: Point3i) -> Self {
        Self {
            store: store.into(),
            path: path.into(),
            chunk,
        }
    }
}

/// Counters describing how well a `ChunkCache` is doing.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ChunkCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
    pub capacity: usize,
}

/// A thread-safe, entry-bounded LRU cache of decoded chunks.
///
/// One cache is meant to be shared by every level and every consumer reading through the same stores, so overlapping regions
/// only decode their common chunks once. A capacity of zero disables caching entirely.
#[derive(Debug)]
pub struct ChunkCache {
    lru: Mutex<SmallKeyLruCache<ChunkKey, Arc<RegionData>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for ChunkCache {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ChunkCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            lru: Mutex::new(SmallKeyLruCache::with_capacity(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.lock().capacity() > 0
    }

    /// Looks up `key`, marking it as most recently used on a hit.
    pub fn get(&self, key: &ChunkKey) -> Option<Arc<RegionData>> {
        let found = self.lock().get(key).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(store = %key.store, path = %key.path, chunk = ?key.chunk.0, "chunk cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }

        found
    }

    pub fn insert(&self, key: ChunkKey, chunk: Arc<RegionData>) {
        let (_, evicted) = self.lock().insert(key, chunk);
        if let Some((k, _)) = evicted {
            tracing::trace!(store = %k.store, path = %k.path, chunk = ?k.chunk.0, "chunk cache eviction");
        }
    }

    /// Changes the entry bound, evicting least-recently used chunks if it shrank.
    pub fn set_capacity(&self, capacity: usize) {
        let evicted = self.lock().set_capacity(capacity);
        if !evicted.is_empty() {
            tracing::debug!(evicted = evicted.len(), capacity, "chunk cache shrunk");
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> ChunkCacheStats {
        let lru = self.lock();

        ChunkCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            len: lru.len(),
            capacity: lru.capacity(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SmallKeyLruCache<ChunkKey, Arc<RegionData>>> {
        self.lru.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod tests {
    use super::*;

    use crate::DataType;

    use pretty_assertions::assert_eq;

    fn chunk(value: u8) -> Arc<RegionData> {
        Arc::new(RegionData::from_elements(DataType::U8, PointN([1, 1, 1]), 1, &[value]).unwrap())
    }

    fn key(x: i64) -> ChunkKey {
        ChunkKey::new("mem://a", "0", PointN([0, 0, x]))
    }

    #[test]
    fn hits_and_misses_are_counted() {
        let cache = ChunkCache::new(2);
        assert!(cache.get(&key(0)).is_none());

        cache.insert(key(0), chunk(7));
        assert_eq!(cache.get(&key(0)).unwrap().as_bytes(), &[7]);

        let stats = cache.stats();
        assert_eq!(
            stats,
            ChunkCacheStats {
                hits: 1,
                misses: 1,
                len: 1,
                capacity: 2
            }
        );
    }

    #[test]
    fn keys_differ_by_store_and_path() {
        let cache = ChunkCache::new(4);
        cache.insert(key(0), chunk(1));

        assert!(cache.get(&ChunkKey::new("mem://b", "0", PointN([0, 0, 0]))).is_none());
        assert!(cache.get(&ChunkKey::new("mem://a", "1", PointN([0, 0, 0]))).is_none());
    }

    #[test]
    fn least_recently_used_chunk_is_evicted() {
        let cache = ChunkCache::new(2);
        cache.insert(key(0), chunk(0));
        cache.insert(key(1), chunk(1));
        cache.get(&key(0));
        cache.insert(key(2), chunk(2));

        assert!(cache.get(&key(1)).is_none());
        assert!(cache.get(&key(0)).is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn zero_capacity_disables_caching() {
        let cache = ChunkCache::new(0);
        cache.insert(key(0), chunk(0));

        assert!(!cache.is_enabled());
        assert!(cache.is_empty());

        cache.set_capacity(1);
        cache.insert(key(0), chunk(0));
        assert!(cache.is_enabled());
        assert_eq!(cache.len(), 1);
    }
}
