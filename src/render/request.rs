//! Render request and result types

use std::sync::Arc;

use crate::cache::{ContentKey, ContentKind};
use crate::geometry::Rect;

/// Unique identifier for scheduled render jobs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl JobId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Raster a page is rendered into
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderTarget {
    /// Output width in pixels
    pub width: u32,
    /// Output height in pixels
    pub height: u32,
    /// Part of the page to render, relative coordinates
    pub region: Rect,
}

impl RenderTarget {
    /// Whole page at the given pixel size
    #[must_use]
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            region: Rect::UNIT,
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && !self.region.is_empty()
            && self.region.left >= 0.0
            && self.region.top >= 0.0
            && self.region.right <= 1.0
            && self.region.bottom <= 1.0
    }

    /// Same region at `scale` of the resolution, never below one pixel
    #[must_use]
    pub fn downsampled(&self, scale: f32) -> Self {
        let scale = scale.clamp(f32::MIN_POSITIVE, 1.0);
        Self {
            width: ((self.width as f32 * scale).round() as u32).max(1),
            height: ((self.height as f32 * scale).round() as u32).max(1),
            region: self.region,
        }
    }

    /// Shrinks the target so neither side exceeds `max_dimension`, keeping
    /// the aspect ratio
    #[must_use]
    pub fn clamped(&self, max_dimension: u32) -> Self {
        let longest = self.width.max(self.height);
        if longest <= max_dimension || max_dimension == 0 {
            return *self;
        }
        self.downsampled(max_dimension as f32 / longest as f32)
    }

    #[must_use]
    pub fn cache_key(&self, page: usize, kind: ContentKind) -> ContentKey {
        ContentKey::new(page, self.width, self.height, self.region, kind)
    }
}

/// RGBA8 pixels of a rendered page
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA, 4 bytes per pixel
    pub pixels: Vec<u8>,
}

impl PixelBuffer {
    #[must_use]
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), width as usize * height as usize * 4);
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Buffer filled with one RGBA value
    #[must_use]
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self::new(width, height, pixels)
    }

    /// Weight used by the content cache, rounded up to whole kilobytes
    #[must_use]
    pub fn size_kb(&self) -> usize {
        self.pixels.len().div_ceil(1024)
    }

    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        Some([
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ])
    }
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Callback receiving a rendered page, or `None` when it could not be
/// produced. Always invoked on the main thread.
pub type RenderCallback = Box<dyn FnOnce(Option<Arc<PixelBuffer>>) + Send>;

/// Errors from rasterization
#[derive(Debug, thiserror::Error)]
pub enum RenderFault {
    #[error("page {page} out of range (document has {count} pages)")]
    PageOutOfRange { page: usize, count: usize },

    #[error("invalid render target {width}x{height}")]
    InvalidTarget { width: u32, height: u32 },

    #[error("image decode: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "pdf")]
    #[error("PDF engine: {0}")]
    Pdf(#[from] mupdf::error::Error),

    #[error("{detail}")]
    Generic { detail: String },
}

impl RenderFault {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic { detail: msg.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downsampled_keeps_at_least_one_pixel() {
        let target = RenderTarget::full(10, 3).downsampled(0.1);
        assert_eq!((target.width, target.height), (1, 1));
    }

    #[test]
    fn clamped_keeps_aspect() {
        let target = RenderTarget::full(8000, 4000).clamped(4000);
        assert_eq!((target.width, target.height), (4000, 2000));
        assert_eq!(RenderTarget::full(100, 50).clamped(4000), RenderTarget::full(100, 50));
    }

    #[test]
    fn region_outside_page_is_invalid() {
        let mut target = RenderTarget::full(10, 10);
        assert!(target.is_valid());
        target.region = Rect::new(0.5, 0.0, 1.5, 1.0);
        assert!(!target.is_valid());
        assert!(!RenderTarget::full(0, 10).is_valid());
    }

    #[test]
    fn size_kb_rounds_up() {
        assert_eq!(PixelBuffer::filled(16, 16, [0; 4]).size_kb(), 1);
        assert_eq!(PixelBuffer::filled(16, 17, [0; 4]).size_kb(), 2);
    }
}
