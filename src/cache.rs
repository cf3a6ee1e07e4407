//! Size-aware LRU cache for rendered page content
//!
//! Entries are weighed in kilobytes and the cache evicts least-recently-used
//! entries until the resident total fits the capacity. Each entry carries an
//! optional release hook that fires exactly once when the entry leaves the
//! cache, whatever the reason (capacity eviction, replacement, removal or
//! recycle). Hooks always run after the internal lock is released.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, warn};
use lru::LruCache;

use crate::geometry::Rect;

/// Default divisor applied to the memory budget
pub const DEFAULT_MEMORY_FACTOR: usize = 4;

/// What the cached raster is
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContentKind {
    /// Full resolution page raster
    Page,
    /// Downsampled raster drawn while a scale gesture is active
    Snapshot,
}

/// Cache key: page plus the exact raster it was rendered for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContentKey {
    pub page: usize,
    pub width_px: u32,
    pub height_px: u32,
    /// Rendered page region, relative coordinates stored as millionths for
    /// stable hashing
    pub region_millionths: [i32; 4],
    pub kind: ContentKind,
}

impl ContentKey {
    #[must_use]
    pub fn new(
        page: usize,
        width_px: u32,
        height_px: u32,
        region: Rect,
        kind: ContentKind,
    ) -> Self {
        let q = |v: f32| (v * 1_000_000.0).round() as i32;
        Self {
            page,
            width_px,
            height_px,
            region_millionths: [
                q(region.left),
                q(region.top),
                q(region.right),
                q(region.bottom),
            ],
            kind,
        }
    }
}

type ReleaseHook = Box<dyn FnOnce(&ContentKey) + Send>;

/// One cache entry. The cache owns the payload once offered; readers get
/// shared handles.
pub struct Blob<T> {
    key: ContentKey,
    size_kb: usize,
    payload: Arc<T>,
    on_evict: Option<ReleaseHook>,
}

impl<T> Blob<T> {
    #[must_use]
    pub fn new(key: ContentKey, size_kb: usize, payload: Arc<T>) -> Self {
        Self {
            key,
            size_kb,
            payload,
            on_evict: None,
        }
    }

    /// Hook invoked once when the entry leaves the cache
    #[must_use]
    pub fn on_evict(mut self, hook: impl FnOnce(&ContentKey) + Send + 'static) -> Self {
        self.on_evict = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn key(&self) -> &ContentKey {
        &self.key
    }

    #[must_use]
    pub fn size_kb(&self) -> usize {
        self.size_kb
    }

    #[must_use]
    pub fn payload(&self) -> &Arc<T> {
        &self.payload
    }

    fn release(self) {
        let Blob {
            key,
            on_evict,
            payload,
            ..
        } = self;
        drop(payload);
        if let Some(hook) = on_evict {
            if panic::catch_unwind(AssertUnwindSafe(|| hook(&key))).is_err() {
                warn!("Eviction hook for page {} panicked", key.page);
            }
        }
    }
}

impl<T> std::fmt::Debug for Blob<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blob")
            .field("key", &self.key)
            .field("size_kb", &self.size_kb)
            .field("has_hook", &self.on_evict.is_some())
            .finish()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub resident_kb: usize,
    pub capacity_kb: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.capacity_kb == 0 {
            0.0
        } else {
            self.resident_kb as f64 / self.capacity_kb as f64
        }
    }
}

struct CacheState<T> {
    entries: LruCache<ContentKey, Blob<T>>,
    resident_kb: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Thread-safe LRU cache keyed by [`ContentKey`]
pub struct ContentCache<T> {
    state: Mutex<CacheState<T>>,
    capacity_kb: usize,
}

impl<T> ContentCache<T> {
    #[must_use]
    pub fn new(capacity_kb: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                resident_kb: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            capacity_kb,
        }
    }

    /// Capacity is `available_kb / memory_factor`
    #[must_use]
    pub fn with_memory_budget(available_kb: usize, memory_factor: usize) -> Self {
        let capacity = available_kb / memory_factor.max(1);
        debug!("Content cache capacity {capacity} KB (budget {available_kb} KB / {memory_factor})");
        Self::new(capacity)
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn capacity_kb(&self) -> usize {
        self.capacity_kb
    }

    /// Inserts or replaces the entry for `blob.key()`, then evicts LRU entries
    /// until the resident size fits. The new entry itself is evicted if it is
    /// larger than the whole cache.
    pub fn offer(&self, blob: Blob<T>) {
        let mut released = Vec::new();
        {
            let mut state = self.lock();
            let size_kb = blob.size_kb;
            if let Some(previous) = state.entries.put(blob.key, blob) {
                state.resident_kb -= previous.size_kb;
                released.push(previous);
            }
            state.resident_kb += size_kb;

            while state.resident_kb > self.capacity_kb {
                let Some((_, evicted)) = state.entries.pop_lru() else {
                    break;
                };
                state.resident_kb -= evicted.size_kb;
                state.evictions += 1;
                released.push(evicted);
            }
        }
        Self::release_all(released);
    }

    /// Payload for `key`, promoting the entry to most recently used
    #[must_use]
    pub fn get(&self, key: &ContentKey) -> Option<Arc<T>> {
        let mut state = self.lock();
        let found = state.entries.get(key).map(|blob| Arc::clone(&blob.payload));
        if found.is_some() {
            state.hits += 1;
        } else {
            state.misses += 1;
        }
        found
    }

    /// Payload for `key` without touching LRU order or statistics
    #[must_use]
    pub fn peek(&self, key: &ContentKey) -> Option<Arc<T>> {
        self.lock()
            .entries
            .peek(key)
            .map(|blob| Arc::clone(&blob.payload))
    }

    #[must_use]
    pub fn contains(&self, key: &ContentKey) -> bool {
        self.lock().entries.contains(key)
    }

    /// Removes one entry, firing its release hook
    pub fn remove(&self, key: &ContentKey) -> bool {
        let removed = {
            let mut state = self.lock();
            let removed = state.entries.pop(key);
            if let Some(blob) = &removed {
                state.resident_kb -= blob.size_kb;
            }
            removed
        };
        match removed {
            Some(blob) => {
                blob.release();
                true
            }
            None => false,
        }
    }

    /// Drops every raster of `page`, returns how many were removed
    pub fn invalidate_page(&self, page: usize) -> usize {
        let released: Vec<Blob<T>> = {
            let mut state = self.lock();
            let keys: Vec<ContentKey> = state
                .entries
                .iter()
                .filter(|(k, _)| k.page == page)
                .map(|(k, _)| *k)
                .collect();
            let mut out = Vec::with_capacity(keys.len());
            for key in keys {
                if let Some(blob) = state.entries.pop(&key) {
                    state.resident_kb -= blob.size_kb;
                    out.push(blob);
                }
            }
            out
        };
        let count = released.len();
        Self::release_all(released);
        count
    }

    /// Empties the cache, firing every release hook
    pub fn recycle(&self) {
        let released: Vec<Blob<T>> = {
            let mut state = self.lock();
            state.resident_kb = 0;
            let mut out = Vec::with_capacity(state.entries.len());
            while let Some((_, blob)) = state.entries.pop_lru() {
                out.push(blob);
            }
            out
        };
        if !released.is_empty() {
            debug!("Recycling {} cached rasters", released.len());
        }
        Self::release_all(released);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    #[must_use]
    pub fn resident_kb(&self) -> usize {
        self.lock().resident_kb
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            entries: state.entries.len(),
            resident_kb: state.resident_kb,
            capacity_kb: self.capacity_kb,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }

    fn release_all(released: Vec<Blob<T>>) {
        for blob in released {
            blob.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn key(page: usize) -> ContentKey {
        ContentKey::new(page, 100, 100, Rect::UNIT, ContentKind::Page)
    }

    fn counted(page: usize, size_kb: usize, counter: &Arc<AtomicUsize>) -> Blob<usize> {
        let counter = Arc::clone(counter);
        Blob::new(key(page), size_kb, Arc::new(page)).on_evict(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn get_promotes_entry() {
        let cache = ContentCache::new(2);
        let evicted = Arc::new(AtomicUsize::new(0));
        cache.offer(counted(0, 1, &evicted));
        cache.offer(counted(1, 1, &evicted));

        assert_eq!(cache.get(&key(0)).as_deref(), Some(&0));
        cache.offer(counted(2, 1, &evicted));

        assert!(cache.contains(&key(0)));
        assert!(!cache.contains(&key(1)));
        assert!(cache.contains(&key(2)));
        assert_eq!(evicted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn peek_does_not_promote() {
        let cache = ContentCache::new(2);
        let evicted = Arc::new(AtomicUsize::new(0));
        cache.offer(counted(0, 1, &evicted));
        cache.offer(counted(1, 1, &evicted));

        assert!(cache.peek(&key(0)).is_some());
        cache.offer(counted(2, 1, &evicted));
        assert!(!cache.contains(&key(0)));
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn replacement_releases_previous_entry() {
        let cache = ContentCache::new(10);
        let evicted = Arc::new(AtomicUsize::new(0));
        cache.offer(counted(0, 3, &evicted));
        cache.offer(counted(0, 4, &evicted));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.resident_kb(), 4);
        assert_eq!(evicted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn oversized_entry_is_evicted_immediately() {
        let cache = ContentCache::new(5);
        let evicted = Arc::new(AtomicUsize::new(0));
        cache.offer(counted(0, 6, &evicted));

        assert!(cache.is_empty());
        assert_eq!(cache.resident_kb(), 0);
        assert_eq!(evicted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalidate_page_keeps_other_pages() {
        let cache = ContentCache::new(100);
        let evicted = Arc::new(AtomicUsize::new(0));
        cache.offer(counted(0, 1, &evicted));
        cache.offer(Blob::new(
            ContentKey::new(0, 25, 25, Rect::UNIT, ContentKind::Snapshot),
            1,
            Arc::new(0),
        ));
        cache.offer(counted(1, 1, &evicted));

        assert_eq!(cache.invalidate_page(0), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.resident_kb(), 1);
        assert_eq!(evicted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn recycle_releases_everything_once() {
        let cache = ContentCache::new(100);
        let evicted = Arc::new(AtomicUsize::new(0));
        for page in 0..5 {
            cache.offer(counted(page, 2, &evicted));
        }
        cache.recycle();
        cache.recycle();

        assert!(cache.is_empty());
        assert_eq!(cache.resident_kb(), 0);
        assert_eq!(evicted.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn panicking_hook_keeps_bookkeeping_consistent() {
        let cache = ContentCache::new(1);
        cache.offer(Blob::new(key(0), 1, Arc::new(0)).on_evict(|_| panic!("boom")));
        cache.offer(Blob::new(key(1), 1, Arc::new(1)));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.resident_kb(), 1);
        assert!(cache.contains(&key(1)));
    }

    #[test]
    fn memory_budget_divides_by_factor() {
        let cache: ContentCache<()> = ContentCache::with_memory_budget(1024, 4);
        assert_eq!(cache.capacity_kb(), 256);
        let cache: ContentCache<()> = ContentCache::with_memory_budget(1024, 0);
        assert_eq!(cache.capacity_kb(), 1024);
    }

    #[test]
    fn stats_track_hits_and_misses() {
        let cache = ContentCache::new(10);
        cache.offer(Blob::new(key(0), 1, Arc::new(0)));
        let _ = cache.get(&key(0));
        let _ = cache.get(&key(1));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }
}
