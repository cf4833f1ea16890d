//! In-memory LRU image cache bounded by total cost.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::domain::entities::CachedImage;
use crate::infrastructure::config::DEFAULT_MEMORY_CAPACITY;

struct LruState {
    entries: LruCache<String, Arc<CachedImage>>,
    total_cost: usize,
    capacity: usize,
}

impl LruState {
    fn new(capacity: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            total_cost: 0,
            capacity,
        }
    }
}

/// In-memory LRU cache for decoded images, keyed by locator.
///
/// After every insert the summed cost of all entries is at most the
/// capacity, unless a single entry is larger than the capacity on its own;
/// that entry is then the only resident.
pub struct MemoryImageCache {
    state: Mutex<LruState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryImageCache {
    /// Creates a cache holding at most `capacity` bytes of decoded pixels.
    /// Zero selects [`DEFAULT_MEMORY_CAPACITY`].
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(LruState::new(effective_capacity(capacity))),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Creates a new cache with the default capacity.
    #[must_use]
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_MEMORY_CAPACITY)
    }

    /// Returns the image and marks it most recently used.
    pub fn get(&self, locator: &str) -> Option<Arc<CachedImage>> {
        let mut state = self.state.lock();
        if let Some(img) = state.entries.get(locator) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(locator = %locator, "Memory cache hit");
            Some(Arc::clone(img))
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(locator = %locator, "Memory cache miss");
            None
        }
    }

    /// Peeks at an image without promoting it in the LRU.
    pub fn peek(&self, locator: &str) -> Option<Arc<CachedImage>> {
        self.state.lock().entries.peek(locator).cloned()
    }

    /// Inserts or replaces an image, then evicts least recently used
    /// entries until the total cost fits or only the new entry is left.
    pub fn put(&self, locator: impl Into<String>, image: Arc<CachedImage>) {
        let locator = locator.into();
        let cost = image.cost();
        let mut state = self.state.lock();

        if let Some((_, replaced)) = state.entries.push(locator.clone(), image) {
            state.total_cost -= replaced.cost();
        }
        state.total_cost += cost;
        debug!(locator = %locator, cost, total = state.total_cost, "Stored image in memory cache");

        while state.total_cost > state.capacity && state.entries.len() > 1 {
            let Some((evicted, img)) = state.entries.pop_lru() else {
                break;
            };
            state.total_cost -= img.cost();
            debug!(locator = %evicted, cost = img.cost(), "Evicted image from memory cache");
        }
    }

    /// Empties the cache.
    pub fn evict_all(&self) {
        let mut state = self.state.lock();
        let count = state.entries.len();
        state.entries.clear();
        state.total_cost = 0;
        debug!(count, "Cleared memory image cache");
    }

    /// Replaces the cache with an empty one of the new capacity.
    /// Existing entries are dropped, not migrated.
    pub fn resize(&self, capacity: usize) {
        let capacity = effective_capacity(capacity);
        *self.state.lock() = LruState::new(capacity);
        debug!(capacity, "Resized memory image cache");
    }

    /// Returns the number of cached images.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Summed cost of all cached images.
    #[must_use]
    pub fn total_cost(&self) -> usize {
        self.state.lock().total_cost
    }

    /// Maximum total cost in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.state.lock().capacity
    }

    /// Returns cache statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        let state = self.state.lock();
        CacheStats {
            hits,
            misses,
            hit_rate,
            size: state.entries.len(),
            total_cost: state.total_cost,
            capacity: state.capacity,
        }
    }
}

impl Default for MemoryImageCache {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

impl std::fmt::Debug for MemoryImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryImageCache")
            .field("stats", &self.stats())
            .finish()
    }
}

const fn effective_capacity(capacity: usize) -> usize {
    if capacity == 0 {
        DEFAULT_MEMORY_CAPACITY
    } else {
        capacity
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of cached images.
    pub size: usize,
    /// Summed cost of the cached images.
    pub total_cost: usize,
    /// Configured capacity.
    pub capacity: usize,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} images, {}/{} bytes, {:.1}% hit rate ({} hits, {} misses)",
            self.size, self.total_cost, self.capacity, self.hit_rate, self.hits, self.misses
        )
    }
}
