//! Document view
//!
//! Ties the open [`Document`], the [`ViewportController`] and the
//! [`RenderScheduler`] together. Owned by the UI thread: input goes through
//! the gesture methods, [`DocumentView::pump`] drains results posted by the
//! worker threads and [`DocumentView::draw`] paints the visible pages.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::cache::{ContentCache, ContentKind, DEFAULT_MEMORY_FACTOR};
use crate::canvas::Canvas;
use crate::document::{Document, DocumentConfig, DocumentLayout};
use crate::element::PageElement;
use crate::geometry::{Color, Rect, Size};
use crate::render::{
    ChannelPoster, LoadOutcome, MainThread, PixelBuffer, RenderCallback, RenderScheduler,
    RenderTarget, SchedulerConfig, SharedRasterizer, WorkerPool,
};
use crate::viewport::{
    Animator, DEFAULT_ANIMATION_DURATION, DEFAULT_FLING_DECELERATION, GestureFlags, ScrollHandle,
    ViewState, ViewportController, ZoomLimits,
};

pub const DEFAULT_MAX_RASTER_DIMENSION: u32 = 4096;
pub const DEFAULT_MEMORY_BUDGET_KB: usize = 512 * 1024;

/// Tunables of a view, normally taken from the settings file
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewOptions {
    pub scheduler: SchedulerConfig,
    pub memory_budget_kb: usize,
    pub memory_factor: usize,
    /// Longest side of a page raster; larger pages are upscaled when drawn
    pub max_raster_dimension: u32,
    pub zoom: ZoomLimits,
    pub animation_duration: Duration,
    pub fling_deceleration: f32,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            memory_budget_kb: DEFAULT_MEMORY_BUDGET_KB,
            memory_factor: DEFAULT_MEMORY_FACTOR,
            max_raster_dimension: DEFAULT_MAX_RASTER_DIMENSION,
            zoom: ZoomLimits::default(),
            animation_duration: DEFAULT_ANIMATION_DURATION,
            fling_deceleration: DEFAULT_FLING_DECELERATION,
        }
    }
}

/// Layout computed off the UI thread, tagged with the request generation
type PendingLayout = Arc<Mutex<Option<(u64, Size, DocumentLayout)>>>;

pub struct DocumentView {
    document: Document,
    controller: ViewportController,
    scheduler: RenderScheduler,
    poster: Arc<ChannelPoster>,
    elements: Vec<Box<dyn PageElement>>,
    options: ViewOptions,
    layout_pool: WorkerPool,
    layout_generation: Arc<AtomicU64>,
    pending_layout: PendingLayout,
    raster_ready: Arc<AtomicBool>,
}

impl DocumentView {
    /// Lays out the pages of `rasterizer` for `viewport` and starts the
    /// render workers
    pub fn open(
        rasterizer: SharedRasterizer,
        config: DocumentConfig,
        viewport: Size,
        options: ViewOptions,
    ) -> anyhow::Result<Self> {
        let originals = rasterizer.page_sizes();
        let document = Document::new(originals, config, viewport);
        let cache = Arc::new(ContentCache::with_memory_budget(
            options.memory_budget_kb,
            options.memory_factor,
        ));
        let poster = Arc::new(ChannelPoster::new());
        let scheduler = RenderScheduler::new(
            rasterizer,
            cache,
            Arc::clone(&poster) as Arc<dyn MainThread>,
            options.scheduler,
        )?;
        let layout_pool = WorkerPool::new("pageview-layout", 1)?;

        let mut controller = ViewportController::new(
            viewport,
            options.zoom,
            Animator::new(options.animation_duration, options.fling_deceleration),
        );
        controller.reclamp(&document);

        info!(
            "Opened document: {} pages, cache {} KB",
            document.page_count(),
            scheduler.cache().capacity_kb()
        );
        Ok(Self {
            document,
            controller,
            scheduler,
            poster,
            elements: Vec::new(),
            options,
            layout_pool,
            layout_generation: Arc::new(AtomicU64::new(0)),
            pending_layout: Arc::new(Mutex::new(None)),
            raster_ready: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Cancels outstanding renders and releases every cached raster
    pub fn close(&mut self) {
        self.scheduler.cancel_all();
        self.scheduler.cache().recycle();
        self.elements.clear();
        info!("Closed document");
    }

    #[must_use]
    pub fn document(&self) -> &Document {
        &self.document
    }

    #[must_use]
    pub fn controller(&self) -> &ViewportController {
        &self.controller
    }

    #[must_use]
    pub fn scheduler(&self) -> &RenderScheduler {
        &self.scheduler
    }

    #[must_use]
    pub fn poster(&self) -> &Arc<ChannelPoster> {
        &self.poster
    }

    #[must_use]
    pub fn options(&self) -> &ViewOptions {
        &self.options
    }

    pub fn set_scroll_handle(&mut self, handle: Option<Box<dyn ScrollHandle>>) {
        self.controller.set_scroll_handle(handle);
    }

    pub fn add_element(&mut self, element: Box<dyn PageElement>) {
        self.elements.push(element);
        self.controller.request_redraw();
    }

    pub fn clear_elements(&mut self) {
        self.elements.clear();
        self.controller.request_redraw();
    }

    /// Replaces the document options and lays the pages out again
    pub fn set_config(&mut self, config: DocumentConfig) {
        let anchor = self.controller.relative_center(&self.document);
        self.document.set_config(config);
        let viewport = self.document.viewport();
        self.controller
            .on_viewport_changed(&self.document, viewport, anchor);
    }

    /// Synchronous relayout for a new viewport size
    pub fn resize(&mut self, viewport: Size) {
        let anchor = self.controller.relative_center(&self.document);
        self.document.recalculate_page_sizes(viewport);
        self.controller
            .on_viewport_changed(&self.document, viewport, anchor);
        debug!("Resized to {}x{}", viewport.width, viewport.height);
    }

    /// Computes the layout for `viewport` on a worker; it is applied by a
    /// later [`Self::pump`]. Superseded requests are dropped.
    pub fn relayout_in_background(&self, viewport: Size) {
        let generation = self.layout_generation.fetch_add(1, Ordering::AcqRel) + 1;
        let originals = self.document.originals().to_vec();
        let config = self.document.config().clone();
        let poster = Arc::clone(&self.poster);
        let slot = Arc::clone(&self.pending_layout);
        self.layout_pool.submit(move |token| {
            if token.is_cancelled() {
                return;
            }
            let layout = DocumentLayout::compute(&originals, &config, viewport);
            poster.post(Box::new(move || {
                let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
                if slot.as_ref().is_none_or(|(current, _, _)| *current < generation) {
                    *slot = Some((generation, viewport, layout));
                }
            }));
        });
    }

    fn apply_pending_layout(&mut self) -> bool {
        let pending = self
            .pending_layout
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some((generation, viewport, layout)) = pending else {
            return false;
        };
        if generation != self.layout_generation.load(Ordering::Acquire) {
            debug!("Dropping superseded layout {generation}");
            return false;
        }
        let anchor = self.controller.relative_center(&self.document);
        if !self.document.apply_layout(layout) {
            return false;
        }
        self.controller
            .on_viewport_changed(&self.document, viewport, anchor);
        true
    }

    /// Runs posted callbacks, installs finished layouts and advances the
    /// active animation. Returns true when the view needs to be drawn.
    pub fn pump(&mut self, now: Instant) -> bool {
        self.poster.run_pending();
        self.apply_pending_layout();
        if let Some(frame) = self.controller.compute_scroll(&self.document, now) {
            if frame.finished {
                debug!("Animation settled on page {}", self.controller.current_page());
            }
        }
        self.scheduler
            .set_current_page(self.controller.current_page());
        self.needs_redraw()
    }

    /// Takes both the viewport redraw request and the raster-ready flag
    pub fn needs_redraw(&mut self) -> bool {
        let moved = self.controller.take_redraw_request();
        let rendered = self.raster_ready.swap(false, Ordering::AcqRel);
        moved || rendered
    }

    // input

    pub fn scroll_by(&mut self, dx: f32, dy: f32) {
        self.controller.on_scroll(&self.document, dx, dy);
    }

    pub fn scale_by(&mut self, factor: f32, focus: (f32, f32)) {
        self.controller.on_scale(&self.document, factor, focus);
    }

    pub fn end_scale(&mut self) {
        self.controller.on_scale_end();
    }

    pub fn fling(&mut self, velocity: (f32, f32), drag: (f32, f32), now: Instant) -> bool {
        self.controller
            .on_fling(&self.document, velocity, drag, now)
    }

    pub fn pointer_up(&mut self, now: Instant) {
        self.controller.on_pointer_up(&self.document, now);
    }

    pub fn double_tap(&mut self, x: f32, y: f32, now: Instant) {
        self.controller.on_double_tap(x, y, now);
    }

    pub fn jump_to_page(&mut self, page: usize) {
        self.controller.jump_to_page(&self.document, page);
    }

    pub fn animate_to_page(&mut self, page: usize, now: Instant) {
        self.controller.animate_to_page(&self.document, page, now);
    }

    pub fn zoom_to(&mut self, zoom: f32) {
        let center = (
            self.controller.viewport().width / 2.0,
            self.controller.viewport().height / 2.0,
        );
        self.controller
            .zoom_centered_to(&self.document, zoom, center);
    }

    /// Routes a tap to the topmost interactive element under it
    pub fn tap(&mut self, x: f32, y: f32) -> bool {
        let Some(pages) = self.controller.visible_pages(&self.document) else {
            return false;
        };
        let zoom = self.controller.zoom();
        for element in self.elements.iter_mut().rev() {
            let page = element.page();
            if !pages.contains(&page) {
                continue;
            }
            let page_rect = self.controller.page_screen_rect(&self.document, page);
            let bounds = element.bounds_in(page_rect, zoom);
            if !bounds.contains(x, y) {
                continue;
            }
            if let Some(interactive) = element.as_interactive() {
                if interactive.on_tap(x - bounds.left, y - bounds.top) {
                    return true;
                }
            }
        }
        false
    }

    #[must_use]
    pub fn save_state(&self) -> ViewState {
        self.controller.save_state()
    }

    pub fn restore_state(&mut self, state: &ViewState) {
        self.controller.restore_state(&self.document, state);
        self.scheduler
            .set_current_page(self.controller.current_page());
    }

    // drawing

    /// Screen rectangle of the page content, inside the page margins
    fn content_rect(&self, page: usize) -> Rect {
        let zoom = self.controller.zoom();
        let m = self.document.config().margins;
        let rect = self.controller.page_screen_rect(&self.document, page);
        Rect::new(
            rect.left + m.left * zoom,
            rect.top + m.top * zoom,
            rect.right - m.right * zoom,
            rect.bottom - m.bottom * zoom,
        )
    }

    /// Full-page raster for the current zoom, capped to the max dimension
    #[must_use]
    pub fn target_for(&self, page: usize) -> Option<RenderTarget> {
        let rect = self.content_rect(page);
        if rect.is_empty() {
            return None;
        }
        let target = RenderTarget::full(rect.width().round() as u32, rect.height().round() as u32);
        target
            .is_valid()
            .then(|| target.clamped(self.options.max_raster_dimension))
    }

    fn ready_callback(&self) -> RenderCallback {
        let ready = Arc::clone(&self.raster_ready);
        Box::new(move |result: Option<Arc<PixelBuffer>>| {
            if result.is_some() {
                ready.store(true, Ordering::Release);
            }
        })
    }

    /// Every visible page has its full raster cached
    #[must_use]
    pub fn visible_pages_ready(&self) -> bool {
        let Some(pages) = self.controller.visible_pages(&self.document) else {
            return true;
        };
        pages.into_iter().all(|page| {
            self.target_for(page).is_none_or(|target| {
                self.scheduler
                    .cache()
                    .contains(&target.cache_key(page, ContentKind::Page))
            })
        })
    }

    /// Paints visible pages and overlays. Pages without a raster get a
    /// placeholder (or their snapshot) and a render request.
    pub fn draw(&self, canvas: &mut dyn Canvas) {
        let config = self.document.config();
        let night = config.night_mode;
        let shade = |c: Color| if night { c.inverted() } else { c };
        canvas.clear(shade(config.background));

        let Some(pages) = self.controller.visible_pages(&self.document) else {
            return;
        };
        let scaling = self.controller.gestures().contains(GestureFlags::SCALING);
        let cache = self.scheduler.cache();
        let zoom = self.controller.zoom();

        for page in pages {
            let page_rect = self.controller.page_screen_rect(&self.document, page);
            canvas.fill_rect(page_rect, shade(Color::WHITE));
            let Some(target) = self.target_for(page) else {
                continue;
            };
            let dest = self.content_rect(page);

            if let Some(bitmap) = cache.get(&target.cache_key(page, ContentKind::Page)) {
                canvas.draw_bitmap(&bitmap, dest, night);
            } else {
                let snapshot = target.downsampled(self.scheduler.config().snapshot_scale);
                match cache.peek(&snapshot.cache_key(page, ContentKind::Snapshot)) {
                    Some(bitmap) => canvas.draw_bitmap(&bitmap, dest, night),
                    None => canvas.stroke_rect(page_rect, shade(Color::LIGHT_GRAY), 1.0),
                }
                let outcome = if scaling {
                    self.scheduler
                        .load_snapshot(page, target, self.ready_callback())
                } else {
                    self.scheduler
                        .load_page(page, target, self.ready_callback())
                };
                if let LoadOutcome::Submitted(id) = outcome {
                    debug!("Requested page {page} as job {}", id.0);
                }
            }

            for element in self.elements.iter().filter(|e| e.page() == page) {
                let bounds = element.bounds_in(page_rect, zoom);
                element.draw(canvas, bounds, night);
            }
        }

        if !scaling {
            self.scheduler.prefetch(
                self.controller.current_page(),
                self.document.page_count(),
                |page| self.target_for(page),
            );
        }
    }
}
