//! Page render scheduler
//!
//! Resolves page raster requests from the content cache or by submitting a
//! job to the worker pool. At most `max_concurrent_renders` jobs execute at
//! once (the pool size); once the in-flight count reaches that cap, stale
//! jobs (finished, cancelled, or for pages far from the current page) are
//! cancelled before the next submission. Results are cached and delivered
//! through the main-thread poster; a cancelled job neither caches nor
//! delivers.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use log::{debug, warn};

use super::pool::{CancellationToken, TaskHandle, WorkerPool};
use super::poster::MainThread;
use super::rasterizer::SharedRasterizer;
use super::request::{JobId, PixelBuffer, RenderCallback, RenderFault, RenderTarget};
use crate::cache::{Blob, ContentCache, ContentKey, ContentKind};

/// Default cap on concurrently executing renders
pub const DEFAULT_MAX_CONCURRENT_RENDERS: usize = 16;
/// Jobs for pages farther than this from the current page are stale
pub const DEFAULT_REMOVABLE_PAGE_DISTANCE: usize = 10;
pub const DEFAULT_PREFETCH_RADIUS: usize = 2;
pub const DEFAULT_SNAPSHOT_SCALE: f32 = 0.25;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SchedulerConfig {
    pub max_concurrent_renders: usize,
    pub removable_page_distance: usize,
    pub prefetch_radius: usize,
    pub snapshot_scale: f32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_renders: DEFAULT_MAX_CONCURRENT_RENDERS,
            removable_page_distance: DEFAULT_REMOVABLE_PAGE_DISTANCE,
            prefetch_radius: DEFAULT_PREFETCH_RADIUS,
            snapshot_scale: DEFAULT_SNAPSHOT_SCALE,
        }
    }
}

/// How a load request was resolved
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Served from the cache
    Cached,
    /// Attached to a job already rendering the same raster
    Joined(JobId),
    Submitted(JobId),
    /// Invalid target, callback received `None`
    Rejected,
}

struct InFlight {
    page: usize,
    key: ContentKey,
    handle: TaskHandle,
    created: Instant,
    waiters: Vec<RenderCallback>,
}

impl InFlight {
    fn is_live(&self) -> bool {
        !self.handle.is_done() && !self.handle.is_cancelled()
    }
}

type Registry = Arc<Mutex<HashMap<JobId, InFlight>>>;

fn lock_registry(
    registry: &Mutex<HashMap<JobId, InFlight>>,
) -> MutexGuard<'_, HashMap<JobId, InFlight>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Counts a job from submission until its closure finishes or is dropped
/// unrun
struct RunningGuard {
    running: Arc<AtomicUsize>,
}

impl RunningGuard {
    fn new(running: &Arc<AtomicUsize>) -> Self {
        running.fetch_add(1, Ordering::AcqRel);
        Self {
            running: Arc::clone(running),
        }
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.running.fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct RenderScheduler {
    rasterizer: SharedRasterizer,
    cache: Arc<ContentCache<PixelBuffer>>,
    poster: Arc<dyn MainThread>,
    registry: Registry,
    running: Arc<AtomicUsize>,
    current_page: AtomicUsize,
    next_id: AtomicU64,
    config: SchedulerConfig,
    pool: WorkerPool,
}

impl RenderScheduler {
    pub fn new(
        rasterizer: SharedRasterizer,
        cache: Arc<ContentCache<PixelBuffer>>,
        poster: Arc<dyn MainThread>,
        config: SchedulerConfig,
    ) -> std::io::Result<Self> {
        let pool = WorkerPool::new("pageview-render", config.max_concurrent_renders)?;
        Ok(Self {
            rasterizer,
            cache,
            poster,
            registry: Arc::new(Mutex::new(HashMap::new())),
            running: Arc::new(AtomicUsize::new(0)),
            current_page: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            config,
            pool,
        })
    }

    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<ContentCache<PixelBuffer>> {
        &self.cache
    }

    #[must_use]
    pub fn rasterizer(&self) -> &SharedRasterizer {
        &self.rasterizer
    }

    /// Page distance for staleness is measured from here
    pub fn set_current_page(&self, page: usize) {
        self.current_page.store(page, Ordering::Release);
    }

    #[must_use]
    pub fn current_page(&self) -> usize {
        self.current_page.load(Ordering::Acquire)
    }

    /// Jobs submitted and not yet finished or discarded
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_in_flight(&self, key: &ContentKey) -> bool {
        lock_registry(&self.registry)
            .values()
            .any(|job| job.key == *key && job.is_live())
    }

    /// Full resolution raster of `page`
    pub fn load_page(
        &self,
        page: usize,
        target: RenderTarget,
        callback: RenderCallback,
    ) -> LoadOutcome {
        self.load(page, target, ContentKind::Page, callback)
    }

    /// Downsampled raster of `page` used while a scale gesture is active
    pub fn load_snapshot(
        &self,
        page: usize,
        target: RenderTarget,
        callback: RenderCallback,
    ) -> LoadOutcome {
        let target = target.downsampled(self.config.snapshot_scale);
        self.load(page, target, ContentKind::Snapshot, callback)
    }

    fn load(
        &self,
        page: usize,
        target: RenderTarget,
        kind: ContentKind,
        callback: RenderCallback,
    ) -> LoadOutcome {
        if !target.is_valid() {
            warn!(
                "Rejecting render of page {page}: invalid target {}x{}",
                target.width, target.height
            );
            self.poster.post(Box::new(move || callback(None)));
            return LoadOutcome::Rejected;
        }

        let key = target.cache_key(page, kind);
        if let Some(payload) = self.cache.get(&key) {
            self.poster.post(Box::new(move || callback(Some(payload))));
            return LoadOutcome::Cached;
        }

        let mut registry = lock_registry(&self.registry);
        if let Some((id, job)) = registry
            .iter_mut()
            .find(|(_, job)| job.key == key && job.is_live())
        {
            job.waiters.push(callback);
            return LoadOutcome::Joined(*id);
        }
        // a job may have finished between the cache miss and taking the lock
        if let Some(payload) = self.cache.peek(&key) {
            drop(registry);
            self.poster.post(Box::new(move || callback(Some(payload))));
            return LoadOutcome::Cached;
        }

        if self.in_flight() >= self.config.max_concurrent_renders {
            self.cleanup_locked(&mut registry);
        }

        let id = JobId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let job = RenderJob {
            id,
            page,
            key,
            target,
            rasterizer: Arc::clone(&self.rasterizer),
            cache: Arc::clone(&self.cache),
            poster: Arc::clone(&self.poster),
            registry: Arc::clone(&self.registry),
            _running: RunningGuard::new(&self.running),
        };
        let handle = self.pool.submit(move |token| job.run(token));
        registry.insert(
            id,
            InFlight {
                page,
                key,
                handle,
                created: Instant::now(),
                waiters: vec![callback],
            },
        );
        debug!("Submitted render job {} for page {page} ({kind:?})", id.0);
        LoadOutcome::Submitted(id)
    }

    /// Warms the cache for pages around `center`. `target_for` maps a page to
    /// its raster, `None` skips the page. Returns how many jobs were started.
    pub fn prefetch(
        &self,
        center: usize,
        page_count: usize,
        target_for: impl Fn(usize) -> Option<RenderTarget>,
    ) -> usize {
        if page_count == 0 {
            return 0;
        }
        let radius = self.config.prefetch_radius;
        let first = center.saturating_sub(radius);
        let last = center.saturating_add(radius).min(page_count - 1);
        let mut started = 0;
        for page in first..=last {
            let Some(target) = target_for(page) else {
                continue;
            };
            let key = target.cache_key(page, ContentKind::Page);
            if self.cache.contains(&key) || self.is_in_flight(&key) {
                continue;
            }
            if let LoadOutcome::Submitted(_) = self.load_page(page, target, Box::new(|_| {})) {
                started += 1;
            }
        }
        started
    }

    /// Cancels jobs that are finished, cancelled, or too far from the current
    /// page. Returns how many registry entries were dropped.
    pub fn cleanup_stale(&self) -> usize {
        let mut registry = lock_registry(&self.registry);
        self.cleanup_locked(&mut registry)
    }

    fn cleanup_locked(&self, registry: &mut HashMap<JobId, InFlight>) -> usize {
        let current = self.current_page();
        let distance = self.config.removable_page_distance;
        let before = registry.len();
        registry.retain(|id, job| {
            let stale = !job.is_live() || job.page.abs_diff(current) > distance;
            if stale {
                job.handle.cancel(true);
                debug!(
                    "Dropping render job {} for page {} (current {current}, age {:?})",
                    id.0,
                    job.page,
                    job.created.elapsed()
                );
            }
            !stale
        });
        before - registry.len()
    }

    /// Cancels every job for `page`
    pub fn cancel_page(&self, page: usize) -> usize {
        let mut registry = lock_registry(&self.registry);
        let before = registry.len();
        registry.retain(|_, job| {
            if job.page == page {
                job.handle.cancel(true);
                false
            } else {
                true
            }
        });
        before - registry.len()
    }

    pub fn cancel_all(&self) {
        let mut registry = lock_registry(&self.registry);
        for job in registry.values() {
            job.handle.cancel(true);
        }
        if !registry.is_empty() {
            debug!("Cancelled {} render jobs", registry.len());
        }
        registry.clear();
    }
}

impl Drop for RenderScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

struct RenderJob {
    id: JobId,
    page: usize,
    key: ContentKey,
    target: RenderTarget,
    rasterizer: SharedRasterizer,
    cache: Arc<ContentCache<PixelBuffer>>,
    poster: Arc<dyn MainThread>,
    registry: Registry,
    _running: RunningGuard,
}

impl RenderJob {
    fn run(self, token: &CancellationToken) {
        let page = self.page;
        if token.is_cancelled() {
            debug!("Render job {} for page {page} cancelled before start", self.id.0);
            return;
        }

        let result = rasterize(&self.rasterizer, page, &self.target);

        let (waiters, payload) = {
            let mut registry = lock_registry(&self.registry);
            // cancellation happens under the registry lock, so this check is final
            if token.is_cancelled() {
                debug!("Discarding cancelled render of page {page}");
                return;
            }
            let waiters = registry
                .remove(&self.id)
                .map(|job| job.waiters)
                .unwrap_or_default();
            let payload = match result {
                Ok(buffer) => {
                    let payload = Arc::new(buffer);
                    self.cache
                        .offer(Blob::new(self.key, payload.size_kb(), Arc::clone(&payload)));
                    Some(payload)
                }
                Err(e) => {
                    warn!("Rendering page {page} failed: {e}");
                    None
                }
            };
            (waiters, payload)
        };

        for waiter in waiters {
            let payload = payload.clone();
            self.poster.post(Box::new(move || waiter(payload)));
        }
    }
}

fn rasterize(
    rasterizer: &SharedRasterizer,
    page: usize,
    target: &RenderTarget,
) -> Result<PixelBuffer, RenderFault> {
    panic::catch_unwind(AssertUnwindSafe(|| rasterizer.render_page(page, target))).unwrap_or_else(
        |_| {
            Err(RenderFault::generic(format!(
                "rasterizer panicked on page {page}"
            )))
        },
    )
}
