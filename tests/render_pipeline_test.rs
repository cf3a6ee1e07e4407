use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use pageview::cache::{ContentCache, ContentKind};
use pageview::canvas::PixelCanvas;
use pageview::document::DocumentConfig;
use pageview::geometry::{Rect, Size};
use pageview::render::{
    ChannelPoster, LoadOutcome, MainThread, PixelBuffer, RenderFault, RenderScheduler,
    RenderTarget, Rasterizer, SchedulerConfig, share,
};
use pageview::view::{DocumentView, ViewOptions};

const WAIT: Duration = Duration::from_secs(10);

/// Closed gate blocks every render until opened
#[derive(Default)]
struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    fn wait(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.cond.wait(open).unwrap();
        }
    }

    fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cond.notify_all();
    }
}

struct FakeRasterizer {
    pages: usize,
    delay: Duration,
    gate: Option<Arc<Gate>>,
    failing_page: Option<usize>,
    active: AtomicUsize,
    peak: AtomicUsize,
    renders: AtomicUsize,
}

impl FakeRasterizer {
    fn new(pages: usize) -> Self {
        Self {
            pages,
            delay: Duration::ZERO,
            gate: None,
            failing_page: None,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            renders: AtomicUsize::new(0),
        }
    }
}

impl Rasterizer for FakeRasterizer {
    fn page_count(&self) -> usize {
        self.pages
    }

    fn page_size(&self, page: usize) -> Result<Size, RenderFault> {
        if page >= self.pages {
            return Err(RenderFault::PageOutOfRange {
                page,
                count: self.pages,
            });
        }
        Ok(Size::new(100, 150))
    }

    fn render_page(&self, page: usize, target: &RenderTarget) -> Result<PixelBuffer, RenderFault> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.renders.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.failing_page == Some(page) {
            return Err(RenderFault::generic("broken page"));
        }
        Ok(PixelBuffer::filled(target.width, target.height, [page as u8, 0, 0, 255]))
    }
}

type Delivered = Arc<Mutex<Vec<(usize, bool)>>>;

fn recorder(delivered: &Delivered, page: usize) -> pageview::render::RenderCallback {
    let delivered = Arc::clone(delivered);
    Box::new(move |result| delivered.lock().unwrap().push((page, result.is_some())))
}

fn scheduler_with(
    rasterizer: Arc<FakeRasterizer>,
    config: SchedulerConfig,
) -> (RenderScheduler, Arc<ChannelPoster>) {
    let poster = Arc::new(ChannelPoster::new());
    let scheduler = RenderScheduler::new(
        rasterizer,
        Arc::new(ContentCache::new(1024 * 1024)),
        Arc::clone(&poster) as Arc<dyn MainThread>,
        config,
    )
    .unwrap();
    (scheduler, poster)
}

fn config(max: usize, distance: usize) -> SchedulerConfig {
    SchedulerConfig {
        max_concurrent_renders: max,
        removable_page_distance: distance,
        ..SchedulerConfig::default()
    }
}

#[test]
fn test_concurrent_renders_never_exceed_cap() {
    let mut fake = FakeRasterizer::new(30);
    fake.delay = Duration::from_millis(5);
    let fake = Arc::new(fake);
    let (scheduler, poster) = scheduler_with(Arc::clone(&fake), config(3, 100));
    let delivered: Delivered = Arc::default();

    for page in 0..30 {
        scheduler.load_page(page, RenderTarget::full(10, 10), recorder(&delivered, page));
    }
    assert!(poster.run_until(WAIT, || delivered.lock().unwrap().len() == 30));

    assert!(fake.peak.load(Ordering::SeqCst) <= 3);
    assert!(delivered.lock().unwrap().iter().all(|(_, ok)| *ok));
    assert_eq!(scheduler.cache().len(), 30);
}

#[test]
fn test_duplicate_requests_share_one_render() {
    let gate = Arc::new(Gate::default());
    let mut fake = FakeRasterizer::new(5);
    fake.gate = Some(Arc::clone(&gate));
    let fake = Arc::new(fake);
    let (scheduler, poster) = scheduler_with(Arc::clone(&fake), config(4, 10));
    let delivered: Delivered = Arc::default();
    let target = RenderTarget::full(20, 30);

    let first = scheduler.load_page(2, target, recorder(&delivered, 2));
    let second = scheduler.load_page(2, target, recorder(&delivered, 2));
    let LoadOutcome::Submitted(id) = first else {
        panic!("expected a new job, got {first:?}");
    };
    assert_eq!(second, LoadOutcome::Joined(id));

    gate.open();
    assert!(poster.run_until(WAIT, || delivered.lock().unwrap().len() == 2));

    assert_eq!(fake.renders.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.cache().len(), 1);
    assert_eq!(*delivered.lock().unwrap(), vec![(2, true), (2, true)]);

    // now served straight from the cache
    let third = scheduler.load_page(2, target, recorder(&delivered, 2));
    assert_eq!(third, LoadOutcome::Cached);
}

#[test]
fn test_failed_render_delivers_none_and_caches_nothing() {
    let mut fake = FakeRasterizer::new(3);
    fake.failing_page = Some(1);
    let (scheduler, poster) = scheduler_with(Arc::new(fake), config(2, 10));
    let delivered: Delivered = Arc::default();

    scheduler.load_page(1, RenderTarget::full(10, 10), recorder(&delivered, 1));
    assert!(poster.run_until(WAIT, || !delivered.lock().unwrap().is_empty()));

    assert_eq!(*delivered.lock().unwrap(), vec![(1, false)]);
    assert!(scheduler.cache().is_empty());
}

#[test]
fn test_invalid_target_is_rejected() {
    let (scheduler, poster) = scheduler_with(Arc::new(FakeRasterizer::new(3)), config(2, 10));
    let delivered: Delivered = Arc::default();

    let outcome = scheduler.load_page(0, RenderTarget::full(0, 10), recorder(&delivered, 0));
    assert_eq!(outcome, LoadOutcome::Rejected);
    poster.run_pending();
    assert_eq!(*delivered.lock().unwrap(), vec![(0, false)]);
}

#[test]
fn test_far_jobs_are_cancelled_when_cap_is_reached() {
    let gate = Arc::new(Gate::default());
    let mut fake = FakeRasterizer::new(20);
    fake.gate = Some(Arc::clone(&gate));
    let fake = Arc::new(fake);
    let (scheduler, poster) = scheduler_with(Arc::clone(&fake), config(2, 2));
    let delivered: Delivered = Arc::default();
    let target = RenderTarget::full(10, 10);

    scheduler.set_current_page(0);
    scheduler.load_page(0, target, recorder(&delivered, 0));
    scheduler.load_page(10, target, recorder(&delivered, 10));
    assert_eq!(scheduler.in_flight(), 2);

    // cap reached: page 10 is too far from page 0 and gets dropped
    scheduler.load_page(1, target, recorder(&delivered, 1));
    assert!(!scheduler.is_in_flight(&target.cache_key(10, ContentKind::Page)));

    gate.open();
    assert!(poster.run_until(WAIT, || delivered.lock().unwrap().len() == 2));
    // let the cancelled render finish and confirm it delivers nothing
    let deadline = Instant::now() + WAIT;
    while scheduler.in_flight() > 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    poster.run_pending();

    let mut pages: Vec<usize> = delivered.lock().unwrap().iter().map(|(p, _)| *p).collect();
    pages.sort_unstable();
    assert_eq!(pages, vec![0, 1]);
    assert!(!scheduler.cache().contains(&target.cache_key(10, ContentKind::Page)));
}

#[test]
fn test_cancel_all_suppresses_delivery() {
    let gate = Arc::new(Gate::default());
    let mut fake = FakeRasterizer::new(4);
    fake.gate = Some(Arc::clone(&gate));
    let fake = Arc::new(fake);
    let (scheduler, poster) = scheduler_with(Arc::clone(&fake), config(2, 10));
    let delivered: Delivered = Arc::default();

    for page in 0..4 {
        scheduler.load_page(page, RenderTarget::full(10, 10), recorder(&delivered, page));
    }
    scheduler.cancel_all();
    gate.open();

    let deadline = Instant::now() + WAIT;
    while scheduler.in_flight() > 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    poster.run_pending();
    assert!(delivered.lock().unwrap().is_empty());
    assert!(scheduler.cache().is_empty());
}

#[test]
fn test_prefetch_warms_neighbouring_pages() {
    let (scheduler, poster) = scheduler_with(Arc::new(FakeRasterizer::new(10)), config(4, 10));
    let target = RenderTarget::full(8, 8);

    let started = scheduler.prefetch(5, 10, |_| Some(target));
    assert_eq!(started, 5);
    assert!(poster.run_until(WAIT, || scheduler.cache().len() == 5));
    for page in 3..=7 {
        assert!(scheduler.cache().contains(&target.cache_key(page, ContentKind::Page)));
    }

    // already cached pages are skipped
    assert_eq!(scheduler.prefetch(5, 10, |_| Some(target)), 0);
}

#[test]
fn test_snapshot_requests_are_downsampled() {
    let (scheduler, poster) = scheduler_with(Arc::new(FakeRasterizer::new(2)), config(2, 10));
    let delivered: Delivered = Arc::default();
    let target = RenderTarget {
        width: 400,
        height: 600,
        region: Rect::UNIT,
    };

    scheduler.load_snapshot(0, target, recorder(&delivered, 0));
    assert!(poster.run_until(WAIT, || !delivered.lock().unwrap().is_empty()));

    let snapshot = target.downsampled(scheduler.config().snapshot_scale);
    let cached = scheduler
        .cache()
        .peek(&snapshot.cache_key(0, ContentKind::Snapshot))
        .unwrap();
    assert_eq!((cached.width, cached.height), (100, 150));
}

#[test]
fn test_document_view_draws_rendered_pages() {
    let rasterizer = share(FakeRasterizer::new(3));
    let config = DocumentConfig::default();
    let viewport = Size::new(200, 300);
    let mut view =
        DocumentView::open(rasterizer, config, viewport, ViewOptions::default()).unwrap();

    let mut canvas = PixelCanvas::new(viewport);
    // first draw only requests the raster
    view.draw(&mut canvas);
    let poster = Arc::clone(view.poster());
    assert!(poster.run_until(WAIT, || view.visible_pages_ready()));
    assert!(view.pump(Instant::now()));

    view.draw(&mut canvas);
    // page 0 is filled with red 0 and green 0 -> black
    assert_eq!(canvas.pixel(100, 100), Some([0, 0, 0, 255]));

    view.close();
    assert!(view.scheduler().cache().is_empty());
}
