use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use pageview::cache::{Blob, ContentCache, ContentKey, ContentKind};
use pageview::geometry::Rect;

fn key(page: usize) -> ContentKey {
    ContentKey::new(page, 200, 300, Rect::UNIT, ContentKind::Page)
}

/// Blob whose eviction hook records the departing page
fn tracked(page: usize, size_kb: usize, log: &Arc<Mutex<Vec<usize>>>) -> Blob<String> {
    let log = Arc::clone(log);
    Blob::new(key(page), size_kb, Arc::new(format!("page {page}")))
        .on_evict(move |k| log.lock().unwrap().push(k.page))
}

#[test]
fn test_third_entry_evicts_least_recently_used() {
    // room for exactly two 1 KB entries
    let cache = ContentCache::new(2);
    let evicted = Arc::new(Mutex::new(Vec::new()));

    cache.offer(tracked(0, 1, &evicted));
    cache.offer(tracked(1, 1, &evicted));
    cache.offer(tracked(2, 1, &evicted));

    assert_eq!(*evicted.lock().unwrap(), vec![0]);
    assert!(!cache.contains(&key(0)));
    assert!(cache.contains(&key(1)));
    assert!(cache.contains(&key(2)));
    assert_eq!(cache.resident_kb(), 2);
}

#[test]
fn test_get_protects_entry_from_eviction() {
    let cache = ContentCache::new(2);
    let evicted = Arc::new(Mutex::new(Vec::new()));

    cache.offer(tracked(0, 1, &evicted));
    cache.offer(tracked(1, 1, &evicted));
    assert_eq!(cache.get(&key(0)).as_deref().map(String::as_str), Some("page 0"));
    cache.offer(tracked(2, 1, &evicted));

    assert_eq!(*evicted.lock().unwrap(), vec![1]);
    assert!(cache.contains(&key(0)));
}

#[test]
fn test_on_evict_fires_once_per_departure() {
    let cache = ContentCache::new(10);
    let evicted = Arc::new(Mutex::new(Vec::new()));

    for page in 0..5 {
        cache.offer(tracked(page, 2, &evicted));
    }
    assert!(cache.remove(&key(3)));
    assert!(!cache.remove(&key(3)));
    cache.recycle();
    cache.recycle();

    let mut pages = evicted.lock().unwrap().clone();
    pages.sort_unstable();
    assert_eq!(pages, vec![0, 1, 2, 3, 4]);
    assert!(cache.is_empty());
    assert_eq!(cache.resident_kb(), 0);
}

#[test]
fn test_replacing_a_key_releases_the_old_payload() {
    let cache = ContentCache::new(10);
    let evicted = Arc::new(Mutex::new(Vec::new()));

    cache.offer(tracked(7, 3, &evicted));
    cache.offer(tracked(7, 4, &evicted));

    assert_eq!(*evicted.lock().unwrap(), vec![7]);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.resident_kb(), 4);
}

#[test]
fn test_resident_size_never_exceeds_capacity() {
    let capacity = 64;
    let cache: ContentCache<usize> = ContentCache::new(capacity);
    let released = Arc::new(AtomicUsize::new(0));
    let mut live: HashMap<usize, ()> = HashMap::new();

    // deterministic pseudo-random mix of offers and removals
    let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
    for _ in 0..2_000 {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        let page = (seed % 40) as usize;
        let size = (seed >> 8) as usize % 20 + 1;
        if seed % 5 == 0 {
            cache.remove(&key(page));
            live.remove(&page);
        } else {
            let counter = Arc::clone(&released);
            cache.offer(
                Blob::new(key(page), size, Arc::new(page))
                    .on_evict(move |_| {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }),
            );
            live.insert(page, ());
        }
        assert!(cache.resident_kb() <= capacity);
    }
    assert!(cache.len() <= live.len());
    assert!(released.load(Ordering::SeqCst) > 0);
}

#[test]
fn test_concurrent_offers_respect_capacity() {
    let cache = Arc::new(ContentCache::new(32));
    let released = Arc::new(AtomicUsize::new(0));
    let offered = 8 * 50;

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let cache = Arc::clone(&cache);
            let released = Arc::clone(&released);
            thread::spawn(move || {
                for i in 0..50 {
                    let released = Arc::clone(&released);
                    cache.offer(
                        Blob::new(key(t * 1000 + i), 3, Arc::new(i)).on_evict(move |_| {
                            released.fetch_add(1, Ordering::SeqCst);
                        }),
                    );
                    let _ = cache.get(&key(t * 1000 + i / 2));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(cache.resident_kb() <= 32);
    // every entry is either resident or was released exactly once
    assert_eq!(cache.len() + released.load(Ordering::SeqCst), offered);
}

#[test]
fn test_invalidate_page_drops_all_rasters_of_that_page() {
    let cache = ContentCache::new(100);
    let full = ContentKey::new(4, 200, 300, Rect::UNIT, ContentKind::Page);
    let snapshot = ContentKey::new(4, 50, 75, Rect::UNIT, ContentKind::Snapshot);
    let other = ContentKey::new(5, 200, 300, Rect::UNIT, ContentKind::Page);
    for k in [full, snapshot, other] {
        cache.offer(Blob::new(k, 1, Arc::new(())));
    }

    assert_eq!(cache.invalidate_page(4), 2);
    assert!(cache.contains(&other));
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_stats_report_hits_misses_and_evictions() {
    let cache = ContentCache::new(1);
    cache.offer(Blob::new(key(0), 1, Arc::new(())));
    cache.offer(Blob::new(key(1), 1, Arc::new(())));
    let _ = cache.get(&key(1));
    let _ = cache.get(&key(0));

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.entries, 1);
    assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    assert!((stats.utilization() - 1.0).abs() < f64::EPSILON);
}

#[test]
fn test_memory_budget_is_divided_by_factor() {
    let cache: ContentCache<()> = ContentCache::with_memory_budget(4096, 4);
    assert_eq!(cache.capacity_kb(), 1024);
    let cache: ContentCache<()> = ContentCache::with_memory_budget(4096, 0);
    assert_eq!(cache.capacity_kb(), 4096);
}
