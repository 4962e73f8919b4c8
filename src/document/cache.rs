//! Render cache with LRU eviction
//!
//! Bounded cache for rendered page bitmaps. When full, only the least
//! recently used entry is evicted.
//!
//! # Thread Safety
//!
//! The cache is guarded by a `parking_lot::Mutex`; entries are shared as
//! `Arc<RenderedPage>` so a hit never copies pixel data.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use super::types::RenderedPage;

/// Default number of rendered pages kept in memory
pub const DEFAULT_RENDER_CACHE_CAPACITY: usize = 10;

/// Cache key for rendered output
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct RenderCacheKey {
    /// Page index
    pub page: usize,
    /// Target width in pixels
    pub width: u32,
    /// Target height in pixels
    pub height: u32,
}

impl RenderCacheKey {
    pub fn new(page: usize, width: u32, height: u32) -> Self {
        Self {
            page,
            width,
            height,
        }
    }
}

/// LRU cache of rendered pages
pub struct RenderCache {
    entries: Mutex<LruCache<RenderCacheKey, Arc<RenderedPage>>>,
}

impl Default for RenderCache {
    fn default() -> Self {
        Self::new(DEFAULT_RENDER_CACHE_CAPACITY)
    }
}

impl RenderCache {
    /// Create a cache holding at most `capacity` pages (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Look up a page, marking it most recently used
    pub fn get(&self, key: &RenderCacheKey) -> Option<Arc<RenderedPage>> {
        let mut entries = self.entries.lock();
        let hit = entries.get(key).cloned();
        if hit.is_some() {
            tracing::trace!(page = key.page, width = key.width, height = key.height, "Render cache hit");
        }
        hit
    }

    /// Insert a page, evicting the least recently used entry when full
    pub fn put(&self, key: RenderCacheKey, page: Arc<RenderedPage>) {
        let mut entries = self.entries.lock();
        if let Some((evicted, _)) = entries.push(key, page) {
            if evicted != key {
                tracing::debug!(page = evicted.page, "Evicted rendered page from cache");
            }
        }
    }

    /// Whether the key is cached, without touching recency
    pub fn contains(&self, key: &RenderCacheKey) -> bool {
        self.entries.lock().contains(key)
    }

    /// Drop every cached page
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        CacheStats {
            used: entries.len(),
            capacity: entries.cap().get(),
            bytes: entries.iter().map(|(_, page)| page.byte_size()).sum(),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached pages
    pub used: usize,
    /// Maximum number of pages
    pub capacity: usize,
    /// Total pixel bytes held
    pub bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn page(index: usize) -> Arc<RenderedPage> {
        Arc::new(RenderedPage {
            page_index: index,
            image: RgbaImage::new(2, 2),
        })
    }

    #[test]
    fn test_cache_creation() {
        let cache = RenderCache::default();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().capacity, DEFAULT_RENDER_CACHE_CAPACITY);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cache = RenderCache::new(0);
        assert_eq!(cache.stats().capacity, 1);
    }

    #[test]
    fn test_evicts_only_least_recently_used() {
        let cache = RenderCache::new(3);
        let keys: Vec<_> = (0..3).map(|i| RenderCacheKey::new(i, 100, 100)).collect();
        for (i, key) in keys.iter().enumerate() {
            cache.put(*key, page(i));
        }

        // Touch page 0 so page 1 becomes the oldest
        assert!(cache.get(&keys[0]).is_some());

        cache.put(RenderCacheKey::new(3, 100, 100), page(3));

        assert_eq!(cache.len(), 3);
        assert!(cache.contains(&keys[0]));
        assert!(!cache.contains(&keys[1]));
        assert!(cache.contains(&keys[2]));
        assert!(cache.contains(&RenderCacheKey::new(3, 100, 100)));
    }

    #[test]
    fn test_key_includes_dimensions() {
        let cache = RenderCache::new(4);
        cache.put(RenderCacheKey::new(0, 100, 200), page(0));
        assert!(cache.get(&RenderCacheKey::new(0, 100, 200)).is_some());
        assert!(cache.get(&RenderCacheKey::new(0, 200, 100)).is_none());
    }

    #[test]
    fn test_stats_and_clear() {
        let cache = RenderCache::new(4);
        cache.put(RenderCacheKey::new(0, 2, 2), page(0));
        cache.put(RenderCacheKey::new(1, 2, 2), page(1));
        let stats = cache.stats();
        assert_eq!(stats.used, 2);
        assert_eq!(stats.bytes, 2 * 2 * 2 * 4);

        cache.clear();
        assert!(cache.is_empty());
    }
}
