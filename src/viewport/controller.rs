//! Viewport controller
//!
//! Owns pan offsets, zoom and the current page of the UI-thread viewport.
//! Offsets follow the screen convention of the content origin: 0 means the
//! document start is at the viewport edge, scrolling further into the
//! document makes the offset more negative. Every movement goes through
//! [`ViewportController::move_to`], which clamps (or centers) each axis.
//!
//! All geometry is expressed along two axes: the scroll ("main") axis pages
//! are stacked on and the cross axis. Vertical and horizontal documents share
//! the same code path.

use std::ops::RangeInclusive;
use std::time::Instant;

use chrono::Utc;
use log::{debug, trace};

use super::animation::{AnimationFrame, AnimationStep, Animator, Axis, FlingBounds};
use super::gesture::{GestureEvent, GestureFlags, GestureTracker};
use super::view_state::ViewState;
use crate::document::Document;
use crate::geometry::{Rect, Size, SizeF};

pub const DEFAULT_MIN_ZOOM: f32 = 1.0;
pub const DEFAULT_MAX_ZOOM: f32 = 5.0;

/// Last movement direction along the scroll axis
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScrollDir {
    #[default]
    None,
    /// Towards the document start
    Start,
    /// Towards the document end
    End,
}

/// Which edge of a page the viewport snaps to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapEdge {
    Start,
    Center,
    End,
    None,
}

/// Scrollbar-like indicator driven by the controller
pub trait ScrollHandle: Send {
    /// Normalized position in `[0, 1]`
    fn set_scroll(&mut self, position: f32);
    fn show(&mut self);
    fn hide_delayed(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoomLimits {
    pub min: f32,
    pub mid: f32,
    pub max: f32,
}

impl Default for ZoomLimits {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_ZOOM, DEFAULT_MAX_ZOOM)
    }
}

impl ZoomLimits {
    /// Orders the bounds and keeps them positive; mid is half the max zoom,
    /// kept within the bounds
    #[must_use]
    pub fn new(min: f32, max: f32) -> Self {
        let min = if min.is_finite() && min > 0.0 {
            min
        } else {
            DEFAULT_MIN_ZOOM
        };
        let max = if max.is_finite() { max.max(min) } else { min };
        Self {
            min,
            mid: (max / 2.0).clamp(min, max),
            max,
        }
    }

    #[must_use]
    pub fn clamp(&self, zoom: f32) -> f32 {
        if zoom.is_nan() {
            return self.min;
        }
        zoom.clamp(self.min, self.max)
    }
}

/// Clamps one axis: centered when the content is shorter than the view,
/// otherwise kept within `[view - content, 0]`
fn clamp_axis(offset: f32, content: f32, view: f32) -> f32 {
    let offset = if offset.is_finite() { offset } else { 0.0 };
    if content < view {
        (view - content) / 2.0
    } else if offset > 0.0 {
        0.0
    } else if offset + content < view {
        view - content
    } else {
        offset
    }
}

pub struct ViewportController {
    offset_x: f32,
    offset_y: f32,
    zoom: f32,
    current_page: usize,
    viewport: SizeF,
    limits: ZoomLimits,
    scroll_dir: ScrollDir,
    gestures: GestureTracker,
    animator: Animator,
    scroll_handle: Option<Box<dyn ScrollHandle>>,
    redraw_requested: bool,
    redraws: u64,
}

impl ViewportController {
    #[must_use]
    pub fn new(viewport: Size, limits: ZoomLimits, animator: Animator) -> Self {
        Self {
            offset_x: 0.0,
            offset_y: 0.0,
            zoom: limits.min,
            current_page: 0,
            viewport: viewport.coerced().to_f32(),
            limits,
            scroll_dir: ScrollDir::None,
            gestures: GestureTracker::default(),
            animator,
            scroll_handle: None,
            redraw_requested: false,
            redraws: 0,
        }
    }

    pub fn set_scroll_handle(&mut self, handle: Option<Box<dyn ScrollHandle>>) {
        self.scroll_handle = handle;
    }

    #[must_use]
    pub fn offset_x(&self) -> f32 {
        self.offset_x
    }

    #[must_use]
    pub fn offset_y(&self) -> f32 {
        self.offset_y
    }

    #[must_use]
    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    #[must_use]
    pub fn limits(&self) -> ZoomLimits {
        self.limits
    }

    #[must_use]
    pub fn current_page(&self) -> usize {
        self.current_page
    }

    #[must_use]
    pub fn viewport(&self) -> SizeF {
        self.viewport
    }

    #[must_use]
    pub fn scroll_dir(&self) -> ScrollDir {
        self.scroll_dir
    }

    #[must_use]
    pub fn gestures(&self) -> GestureFlags {
        self.gestures.flags()
    }

    #[must_use]
    pub fn is_zooming(&self) -> bool {
        self.zoom != self.limits.min
    }

    #[must_use]
    pub fn is_animating(&self) -> bool {
        self.animator.is_running()
    }

    /// Total redraw requests so far
    #[must_use]
    pub fn redraw_count(&self) -> u64 {
        self.redraws
    }

    pub fn request_redraw(&mut self) {
        self.redraw_requested = true;
        self.redraws += 1;
    }

    /// Returns and clears the pending redraw flag
    pub fn take_redraw_request(&mut self) -> bool {
        std::mem::take(&mut self.redraw_requested)
    }

    fn main_offset(&self, vertical: bool) -> f32 {
        if vertical {
            self.offset_y
        } else {
            self.offset_x
        }
    }

    fn main_view(&self, vertical: bool) -> f32 {
        if vertical {
            self.viewport.height
        } else {
            self.viewport.width
        }
    }

    fn cross_view(&self, vertical: bool) -> f32 {
        if vertical {
            self.viewport.width
        } else {
            self.viewport.height
        }
    }

    fn main_axis(vertical: bool) -> Axis {
        if vertical { Axis::Y } else { Axis::X }
    }

    /// Moves the content origin to `(x, y)` after clamping, updates the
    /// current page and optionally the scroll handle
    pub fn move_to(&mut self, doc: &Document, x: f32, y: f32, move_handle: bool) {
        let vertical = doc.is_vertical();
        let (main, cross) = if vertical { (y, x) } else { (x, y) };
        let main = clamp_axis(main, doc.doc_length(self.zoom), self.main_view(vertical));
        let cross = clamp_axis(cross, doc.cross_length(self.zoom), self.cross_view(vertical));

        let previous = self.main_offset(vertical);
        self.scroll_dir = if main < previous {
            ScrollDir::End
        } else if main > previous {
            ScrollDir::Start
        } else {
            ScrollDir::None
        };

        (self.offset_x, self.offset_y) = if vertical { (cross, main) } else { (main, cross) };
        self.update_current_page(doc);

        if move_handle && !self.document_fits_view(doc) {
            let position = self.position_offset(doc);
            if let Some(handle) = self.scroll_handle.as_mut() {
                handle.set_scroll(position);
            }
        }
        trace!(
            "move_to ({:.1}, {:.1}) zoom {:.3} page {}",
            self.offset_x, self.offset_y, self.zoom, self.current_page
        );
        self.request_redraw();
    }

    pub fn move_relative(&mut self, doc: &Document, dx: f32, dy: f32) {
        self.move_to(doc, self.offset_x + dx, self.offset_y + dy, true);
    }

    /// Re-applies clamping with the current offsets
    pub fn reclamp(&mut self, doc: &Document) {
        self.move_to(doc, self.offset_x, self.offset_y, false);
    }

    fn update_current_page(&mut self, doc: &Document) {
        if doc.is_empty() {
            self.current_page = 0;
            return;
        }
        let vertical = doc.is_vertical();
        let center = -(self.main_offset(vertical) - self.main_view(vertical) / 2.0);
        self.current_page = doc.page_at_offset(center, self.zoom);
    }

    /// Sets zoom without moving; clamped to the limits
    pub fn zoom_to(&mut self, zoom: f32) {
        self.zoom = self.limits.clamp(zoom);
    }

    /// Zooms keeping the content point under `pivot` (viewport coordinates)
    /// in place
    pub fn zoom_centered_to(&mut self, doc: &Document, zoom: f32, pivot: (f32, f32)) {
        let zoom = self.limits.clamp(zoom);
        let dz = zoom / self.zoom;
        self.zoom = zoom;
        let x = self.offset_x * dz + pivot.0 * (1.0 - dz);
        let y = self.offset_y * dz + pivot.1 * (1.0 - dz);
        self.move_to(doc, x, y, true);
    }

    pub fn zoom_centered_relative(&mut self, doc: &Document, factor: f32, pivot: (f32, f32)) {
        self.zoom_centered_to(doc, self.zoom * factor, pivot);
    }

    pub fn zoom_with_animation(&mut self, target: f32, pivot: (f32, f32), now: Instant) {
        let target = self.limits.clamp(target);
        self.end_animation();
        self.animator.start_zoom(self.zoom, target, pivot, now);
    }

    pub fn reset_zoom(&mut self, doc: &Document) {
        let center = (self.viewport.width / 2.0, self.viewport.height / 2.0);
        self.zoom_centered_to(doc, self.limits.min, center);
    }

    /// Next zoom step of the double-tap cycle min -> mid -> max -> min
    #[must_use]
    pub fn double_tap_zoom_target(&self) -> f32 {
        if self.zoom < self.limits.mid {
            self.limits.mid
        } else if self.zoom < self.limits.max {
            self.limits.max
        } else {
            self.limits.min
        }
    }

    pub fn on_double_tap(&mut self, x: f32, y: f32, now: Instant) {
        let target = self.double_tap_zoom_target();
        self.zoom_with_animation(target, (x, y), now);
    }

    /// Offset along the scroll axis that shows `page`, centered when the
    /// page is shorter than the viewport
    fn page_target_offset(&self, doc: &Document, page: usize) -> f32 {
        let vertical = doc.is_vertical();
        let view = self.main_view(vertical);
        let page_length = doc.page_length(page, self.zoom);
        let mut target = -doc.page_offset(page, self.zoom);
        if page_length < view {
            target += (view - page_length) / 2.0;
        }
        clamp_axis(target, doc.doc_length(self.zoom), view)
    }

    /// Shows `page` immediately
    pub fn jump_to_page(&mut self, doc: &Document, page: usize) {
        if doc.is_empty() {
            return;
        }
        self.end_animation();
        let page = doc.valid_page(page as i64);
        let target = self.page_target_offset(doc, page);
        if doc.is_vertical() {
            self.move_to(doc, self.offset_x, target, true);
        } else {
            self.move_to(doc, target, self.offset_y, true);
        }
        self.current_page = page;
        debug!("Jumped to page {page}");
    }

    /// Scrolls to `page` with the default tween
    pub fn animate_to_page(&mut self, doc: &Document, page: usize, now: Instant) {
        if doc.is_empty() {
            return;
        }
        let page = doc.valid_page(page as i64);
        let vertical = doc.is_vertical();
        let target = self.page_target_offset(doc, page);
        self.end_animation();
        self.animator.start_move(
            Self::main_axis(vertical),
            self.main_offset(vertical),
            target,
            now,
        );
    }

    /// Scroll progress in `[0, 1]`; 0 when the document fits the view
    #[must_use]
    pub fn position_offset(&self, doc: &Document) -> f32 {
        let vertical = doc.is_vertical();
        let scrollable = doc.doc_length(self.zoom) - self.main_view(vertical);
        if scrollable <= 0.0 {
            return 0.0;
        }
        (-self.main_offset(vertical) / scrollable).clamp(0.0, 1.0)
    }

    pub fn set_position_offset(&mut self, doc: &Document, progress: f32, move_handle: bool) {
        let vertical = doc.is_vertical();
        let scrollable = doc.doc_length(self.zoom) - self.main_view(vertical);
        let main = -scrollable.max(0.0) * progress.clamp(0.0, 1.0);
        if vertical {
            self.move_to(doc, self.offset_x, main, move_handle);
        } else {
            self.move_to(doc, main, self.offset_y, move_handle);
        }
    }

    #[must_use]
    pub fn document_fits_view(&self, doc: &Document) -> bool {
        doc.doc_length(self.zoom) < self.main_view(doc.is_vertical())
    }

    /// Current page covers the whole viewport along the scroll axis
    #[must_use]
    pub fn page_fills_screen(&self, doc: &Document) -> bool {
        if doc.is_empty() {
            return false;
        }
        let vertical = doc.is_vertical();
        let start = -doc.page_offset(self.current_page, self.zoom);
        let end = start - doc.page_length(self.current_page, self.zoom);
        let main = self.main_offset(vertical);
        start > main && end < main - self.main_view(vertical)
    }

    /// Pages intersecting the viewport along the scroll axis
    #[must_use]
    pub fn visible_pages(&self, doc: &Document) -> Option<RangeInclusive<usize>> {
        if doc.is_empty() {
            return None;
        }
        let vertical = doc.is_vertical();
        let start = -self.main_offset(vertical);
        let end = start + self.main_view(vertical);
        let first = doc.page_at_offset(start.max(0.0), self.zoom);
        let last = doc.page_at_offset(end, self.zoom).max(first);
        Some(first..=last)
    }

    /// Page rectangle in viewport coordinates
    #[must_use]
    pub fn page_screen_rect(&self, doc: &Document, page: usize) -> Rect {
        doc.page_bounds(page, self.zoom)
            .offset(self.offset_x, self.offset_y)
    }

    /// Content point at the viewport center as fractions of the document,
    /// used to keep the view stable across relayouts
    #[must_use]
    pub fn relative_center(&self, doc: &Document) -> (f32, f32) {
        let vertical = doc.is_vertical();
        let main_len = doc.doc_length(self.zoom).max(1.0);
        let cross_len = doc.cross_length(self.zoom).max(1.0);
        let main = (-self.main_offset(vertical) + self.main_view(vertical) / 2.0) / main_len;
        let cross_offset = if vertical { self.offset_x } else { self.offset_y };
        let cross = (-cross_offset + self.cross_view(vertical) / 2.0) / cross_len;
        (main, cross)
    }

    /// Applies a new viewport size; `anchor` comes from [`Self::relative_center`]
    /// taken before `doc` was laid out again
    pub fn on_viewport_changed(&mut self, doc: &Document, viewport: Size, anchor: (f32, f32)) {
        self.end_animation();
        self.viewport = viewport.coerced().to_f32();
        let vertical = doc.is_vertical();
        let main = -(anchor.0 * doc.doc_length(self.zoom)) + self.main_view(vertical) / 2.0;
        let cross = -(anchor.1 * doc.cross_length(self.zoom)) + self.cross_view(vertical) / 2.0;
        if vertical {
            self.move_to(doc, cross, main, false);
        } else {
            self.move_to(doc, main, cross, false);
        }
    }

    // gestures

    pub fn on_scroll_start(&mut self) {
        self.animator.stop_fling();
        self.gestures.apply(GestureEvent::FlingEnd);
        self.gestures.apply(GestureEvent::ScrollStart);
        if let Some(handle) = self.scroll_handle.as_mut() {
            handle.show();
        }
    }

    /// Drag by `(dx, dy)` screen pixels
    pub fn on_scroll(&mut self, doc: &Document, dx: f32, dy: f32) {
        if !self.gestures.is_scrolling() {
            self.on_scroll_start();
        }
        self.move_relative(doc, dx, dy);
    }

    pub fn on_scale_begin(&mut self) {
        self.end_animation();
        self.gestures.apply(GestureEvent::ScaleBegin);
    }

    pub fn on_scale(&mut self, doc: &Document, factor: f32, focus: (f32, f32)) {
        if !self.gestures.is_scaling() {
            self.on_scale_begin();
        }
        self.zoom_centered_relative(doc, factor, focus);
    }

    pub fn on_scale_end(&mut self) {
        self.gestures.apply(GestureEvent::ScaleEnd);
    }

    /// Last pointer lifted. Snaps to a page edge unless a fling took over.
    pub fn on_pointer_up(&mut self, doc: &Document, now: Instant) {
        let cleared = self.gestures.apply(GestureEvent::PointerUp);
        if cleared.contains(GestureFlags::SCROLLING) {
            if let Some(handle) = self.scroll_handle.as_mut() {
                handle.hide_delayed();
            }
        }
        if !self.animator.is_flinging() {
            self.perform_page_snap(doc, now);
        }
    }

    pub fn on_cancel(&mut self) {
        self.gestures.apply(GestureEvent::Cancel);
    }

    /// Starts a fling with screen velocity `(vx, vy)` px/s. `drag` is the
    /// pointer travel of the gesture, used by page flings to find the page
    /// that had focus when the gesture began.
    pub fn on_fling(
        &mut self,
        doc: &Document,
        velocity: (f32, f32),
        drag: (f32, f32),
        now: Instant,
    ) -> bool {
        let config = doc.config();
        if !config.fling_enabled || doc.is_empty() {
            return false;
        }
        if config.page_fling {
            if self.page_fills_screen(doc) {
                self.start_bounded_fling(doc, velocity, now);
                return true;
            }
            return self.start_page_fling(doc, velocity, drag, now);
        }

        let vertical = doc.is_vertical();
        let main_min = (self.main_view(vertical) - doc.doc_length(self.zoom)).min(0.0);
        let cross_min = (self.cross_view(vertical) - doc.cross_length(self.zoom)).min(0.0);
        let bounds = Self::bounds_for(vertical, (main_min, 0.0), (cross_min, 0.0));
        self.start_fling(velocity, bounds, now);
        true
    }

    /// Fling confined to the current page, used when it fills the screen
    fn start_bounded_fling(&mut self, doc: &Document, velocity: (f32, f32), now: Instant) {
        let vertical = doc.is_vertical();
        let page_start = -doc.page_offset(self.current_page, self.zoom);
        let page_end = page_start - doc.page_length(self.current_page, self.zoom);
        let main = (page_end + self.main_view(vertical), page_start);
        let cross_min = (self.cross_view(vertical) - doc.cross_length(self.zoom)).min(0.0);
        let bounds = Self::bounds_for(vertical, main, (cross_min, 0.0));
        self.start_fling(velocity, bounds, now);
    }

    fn bounds_for(vertical: bool, main: (f32, f32), cross: (f32, f32)) -> FlingBounds {
        let (x, y) = if vertical { (cross, main) } else { (main, cross) };
        FlingBounds {
            min_x: x.0,
            max_x: x.1,
            min_y: y.0,
            max_y: y.1,
        }
    }

    fn start_fling(&mut self, velocity: (f32, f32), bounds: FlingBounds, now: Instant) {
        self.end_animation();
        self.animator
            .start_fling((self.offset_x, self.offset_y), velocity, bounds, now);
        self.gestures.apply(GestureEvent::FlingStart);
    }

    /// Animates to the neighbouring page in the fling direction
    fn start_page_fling(
        &mut self,
        doc: &Document,
        velocity: (f32, f32),
        drag: (f32, f32),
        now: Instant,
    ) -> bool {
        let vertical = doc.is_vertical();
        let (v_main, v_cross, d_main) = if vertical {
            (velocity.1, velocity.0, drag.1)
        } else {
            (velocity.0, velocity.1, drag.0)
        };
        if v_main.abs() <= v_cross.abs() {
            return false;
        }

        let direction: i64 = if v_main > 0.0 { -1 } else { 1 };
        let at_down = self.main_offset(vertical) - d_main;
        let starting = self.find_focus_page(doc, at_down);
        let last = doc.page_count() as i64 - 1;
        let target = (starting as i64 + direction).clamp(0, last) as usize;
        let edge = self.find_snap_edge(doc, target);
        let offset = self.snap_offset_for_page(doc, target, edge);
        self.end_animation();
        self.animator.start_move(
            Self::main_axis(vertical),
            self.main_offset(vertical),
            clamp_axis(-offset, doc.doc_length(self.zoom), self.main_view(vertical)),
            now,
        );
        debug!("Page fling {starting} -> {target} ({edge:?})");
        true
    }

    /// Page that has focus at scroll-axis offset `main_offset`
    #[must_use]
    pub fn find_focus_page(&self, doc: &Document, main_offset: f32) -> usize {
        if doc.is_empty() {
            return 0;
        }
        let view = self.main_view(doc.is_vertical());
        if main_offset > -1.0 {
            0
        } else if main_offset < -doc.doc_length(self.zoom) + view + 1.0 {
            doc.page_count() - 1
        } else {
            doc.page_at_offset(-(main_offset - view / 2.0), self.zoom)
        }
    }

    #[must_use]
    pub fn find_snap_edge(&self, doc: &Document, page: usize) -> SnapEdge {
        if !doc.config().page_snap || page >= doc.page_count() {
            return SnapEdge::None;
        }
        let vertical = doc.is_vertical();
        let current = self.main_offset(vertical);
        let offset = -doc.page_offset(page, self.zoom);
        let view = self.main_view(vertical);
        let page_length = doc.page_length(page, self.zoom);
        if view >= page_length {
            SnapEdge::Center
        } else if current >= offset {
            SnapEdge::Start
        } else if offset - page_length > current - view {
            SnapEdge::End
        } else {
            SnapEdge::None
        }
    }

    /// Positive distance from the document start that aligns `edge` of
    /// `page` with the viewport
    #[must_use]
    pub fn snap_offset_for_page(&self, doc: &Document, page: usize, edge: SnapEdge) -> f32 {
        let offset = doc.page_offset(page, self.zoom);
        let view = self.main_view(doc.is_vertical());
        let page_length = doc.page_length(page, self.zoom);
        match edge {
            SnapEdge::Center => offset - view / 2.0 + page_length / 2.0,
            SnapEdge::End => offset - view + page_length,
            SnapEdge::Start | SnapEdge::None => offset,
        }
    }

    /// Animates to the nearest snap edge of the focused page; false when no
    /// snapping applies
    pub fn perform_page_snap(&mut self, doc: &Document, now: Instant) -> bool {
        if !doc.config().page_snap || doc.is_empty() {
            return false;
        }
        let vertical = doc.is_vertical();
        let page = self.find_focus_page(doc, self.main_offset(vertical));
        let edge = self.find_snap_edge(doc, page);
        if edge == SnapEdge::None {
            return false;
        }
        let offset = self.snap_offset_for_page(doc, page, edge);
        self.end_animation();
        self.animator
            .start_move(Self::main_axis(vertical), self.main_offset(vertical), -offset, now);
        true
    }

    pub fn stop_animation(&mut self) {
        self.end_animation();
    }

    /// Stops the active animation, clearing the fling flag if it was a fling
    fn end_animation(&mut self) {
        if self.animator.is_flinging() {
            self.gestures.apply(GestureEvent::FlingEnd);
        }
        self.animator.stop();
    }

    /// Advances the active animation to `now` and applies it. Returns the
    /// applied frame, `None` when nothing is animating.
    pub fn compute_scroll(&mut self, doc: &Document, now: Instant) -> Option<AnimationFrame> {
        let frame = self.animator.tick(now)?;
        match frame.step {
            AnimationStep::Move {
                axis: Axis::X,
                offset,
            } => self.move_to(doc, offset, self.offset_y, true),
            AnimationStep::Move {
                axis: Axis::Y,
                offset,
            } => self.move_to(doc, self.offset_x, offset, true),
            AnimationStep::Zoom {
                zoom,
                pivot_x,
                pivot_y,
            } => self.zoom_centered_to(doc, zoom, (pivot_x, pivot_y)),
            AnimationStep::Fling { x, y } => self.move_to(doc, x, y, true),
        }

        if frame.finished {
            if let AnimationStep::Fling { .. } = frame.step {
                self.gestures.apply(GestureEvent::FlingEnd);
                if let Some(handle) = self.scroll_handle.as_mut() {
                    handle.hide_delayed();
                }
                self.perform_page_snap(doc, now);
            }
        }
        Some(frame)
    }

    #[must_use]
    pub fn save_state(&self) -> ViewState {
        ViewState {
            current_page: self.current_page,
            zoom: self.zoom,
            saved_at: Utc::now(),
        }
    }

    /// Restores zoom then shows the saved page; out-of-range values clamp
    pub fn restore_state(&mut self, doc: &Document, state: &ViewState) {
        self.zoom_to(state.zoom);
        self.jump_to_page(doc, state.current_page);
    }
}
