//! Backend seam: turns a page of an open document into pixels

use std::sync::Arc;

use super::request::{PixelBuffer, RenderFault, RenderTarget};
use crate::geometry::Size;

/// An open document handle. Opening is the backend's constructor, closing is
/// `Drop`. Render calls may arrive from several worker threads at once; a
/// backend that cannot render concurrently serializes internally.
pub trait Rasterizer: Send + Sync {
    fn page_count(&self) -> usize;

    /// Native page size in backend units (points for PDF, pixels for photos)
    fn page_size(&self, page: usize) -> Result<Size, RenderFault>;

    fn render_page(&self, page: usize, target: &RenderTarget) -> Result<PixelBuffer, RenderFault>;

    /// Native sizes of every page; unreadable pages come back degenerate
    fn page_sizes(&self) -> Vec<Size> {
        (0..self.page_count())
            .map(|page| self.page_size(page).unwrap_or(Size::ZERO))
            .collect()
    }
}

pub type SharedRasterizer = Arc<dyn Rasterizer>;

/// Wraps a backend for use by the scheduler
pub fn share<R: Rasterizer + 'static>(rasterizer: R) -> SharedRasterizer {
    Arc::new(rasterizer)
}

/// Bounds check shared by the backends
pub(crate) fn check_request(
    page: usize,
    count: usize,
    target: &RenderTarget,
) -> Result<(), RenderFault> {
    if page >= count {
        return Err(RenderFault::PageOutOfRange { page, count });
    }
    if !target.is_valid() {
        return Err(RenderFault::InvalidTarget {
            width: target.width,
            height: target.height,
        });
    }
    Ok(())
}

/// Pixel rectangle of `region` inside a `width` x `height` raster, at least
/// one pixel on each side
pub(crate) fn region_px(width: u32, height: u32, target: &RenderTarget) -> (u32, u32, u32, u32) {
    let r = target.region;
    let x0 = ((r.left * width as f32).floor() as u32).min(width.saturating_sub(1));
    let y0 = ((r.top * height as f32).floor() as u32).min(height.saturating_sub(1));
    let x1 = ((r.right * width as f32).ceil() as u32).clamp(x0 + 1, width.max(x0 + 1));
    let y1 = ((r.bottom * height as f32).ceil() as u32).clamp(y0 + 1, height.max(y0 + 1));
    (x0, y0, x1 - x0, y1 - y0)
}
