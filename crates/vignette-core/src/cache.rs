//! Byte-bounded in-memory cache of finished images.
//!
//! Keyed by [`CacheKey`], evicting least-recently-used entries whenever
//! the total pixel-buffer budget is exceeded. Entries are shared
//! `Arc<DecodedImage>`s, so a hit never copies pixels.

use std::sync::Mutex;

use lru::LruCache;
use std::sync::Arc;

use crate::request::CacheKey;
use crate::types::DecodedImage;

struct CacheEntry {
    image: Arc<DecodedImage>,
    bytes: usize,
}

struct CacheInner {
    entries: LruCache<CacheKey, CacheEntry>,
    total_bytes: usize,
}

/// Thread-safe LRU cache bounded by total byte size.
pub struct MemoryCache {
    max_bytes: usize,
    inner: Mutex<CacheInner>,
}

impl MemoryCache {
    /// Create a cache with the given byte budget (minimum 1).
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes: max_bytes.max(1),
            inner: Mutex::new(CacheInner {
                entries: LruCache::unbounded(),
                total_bytes: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Look up a finished image, updating its recency on a hit.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<DecodedImage>> {
        self.lock().entries.get(key).map(|entry| entry.image.clone())
    }

    /// Check for an entry without touching recency.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock().entries.peek(key).is_some()
    }

    /// Insert a finished image, evicting least-recently-used entries
    /// until the byte budget is satisfied. An artifact larger than the
    /// whole budget is not cached at all.
    pub fn put(&self, key: CacheKey, image: Arc<DecodedImage>) {
        let bytes = image.byte_size();
        if bytes > self.max_bytes {
            tracing::debug!(key = %key, bytes, "artifact exceeds cache budget, not cached");
            return;
        }

        let mut inner = self.lock();
        if let Some(old) = inner.entries.put(key, CacheEntry { image, bytes }) {
            inner.total_bytes -= old.bytes;
        }
        inner.total_bytes += bytes;

        while inner.total_bytes > self.max_bytes {
            match inner.entries.pop_lru() {
                Some((evicted_key, evicted)) => {
                    inner.total_bytes -= evicted.bytes;
                    tracing::trace!(key = %evicted_key, bytes = evicted.bytes, "evicted");
                }
                None => break,
            }
        }
    }

    /// Remove one entry.
    pub fn remove(&self, key: &CacheKey) {
        let mut inner = self.lock();
        if let Some(entry) = inner.entries.pop(key) {
            inner.total_bytes -= entry.bytes;
        }
    }

    /// Drop all entries.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.total_bytes = 0;
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Current total of cached pixel-buffer bytes.
    pub fn total_bytes(&self) -> usize {
        self.lock().total_bytes
    }

    /// The configured byte budget.
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("MemoryCache")
            .field("entries", &inner.entries.len())
            .field("total_bytes", &inner.total_bytes)
            .field("max_bytes", &self.max_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Frame;
    use image::DynamicImage;

    fn key(name: &str) -> CacheKey {
        CacheKey::compose(name, 0, 0, false, &[])
    }

    /// A w x h RGBA image accounts for w*h*4 bytes.
    fn artifact(w: u32, h: u32) -> Arc<DecodedImage> {
        Arc::new(DecodedImage::single(
            Frame::new(DynamicImage::new_rgba8(w, h)),
            None,
        ))
    }

    #[test]
    fn test_get_put_roundtrip() {
        let cache = MemoryCache::new(1024 * 1024);
        let image = artifact(10, 10);

        assert!(cache.get(&key("a")).is_none());
        cache.put(key("a"), image.clone());

        let hit = cache.get(&key("a")).unwrap();
        assert!(Arc::ptr_eq(&hit, &image));
        assert_eq!(cache.total_bytes(), 10 * 10 * 4);
    }

    #[test]
    fn test_eviction_is_least_recently_used() {
        // Budget fits exactly two 10x10 RGBA entries
        let cache = MemoryCache::new(2 * 10 * 10 * 4);
        cache.put(key("a"), artifact(10, 10));
        cache.put(key("b"), artifact(10, 10));

        // Touch "a" so "b" is the LRU entry
        assert!(cache.get(&key("a")).is_some());

        cache.put(key("c"), artifact(10, 10));
        assert!(cache.contains(&key("a")));
        assert!(!cache.contains(&key("b")));
        assert!(cache.contains(&key("c")));
        assert!(cache.total_bytes() <= cache.max_bytes());
    }

    #[test]
    fn test_oversized_artifact_not_cached() {
        let cache = MemoryCache::new(16);
        cache.put(key("big"), artifact(100, 100));
        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
    }

    #[test]
    fn test_put_replaces_and_accounts_bytes() {
        let cache = MemoryCache::new(1024 * 1024);
        cache.put(key("a"), artifact(10, 10));
        cache.put(key("a"), artifact(20, 20));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_bytes(), 20 * 20 * 4);
    }

    #[test]
    fn test_eviction_may_remove_several_entries() {
        let cache = MemoryCache::new(4 * 10 * 10 * 4);
        for name in ["a", "b", "c", "d"] {
            cache.put(key(name), artifact(10, 10));
        }
        // One entry as large as three evicts several old ones
        cache.put(key("e"), artifact(10, 30));
        assert!(cache.total_bytes() <= cache.max_bytes());
        assert!(cache.contains(&key("e")));
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = MemoryCache::new(1024 * 1024);
        cache.put(key("a"), artifact(10, 10));
        cache.put(key("b"), artifact(10, 10));

        cache.remove(&key("a"));
        assert!(!cache.contains(&key("a")));
        assert_eq!(cache.total_bytes(), 10 * 10 * 4);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
    }
}
