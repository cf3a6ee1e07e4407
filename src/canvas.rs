//! Drawing primitives used by the view and overlay elements

use std::path::Path;

use anyhow::Context;
use image::{Rgba, RgbaImage};

use crate::geometry::{Color, Rect, Size};
use crate::redraw::DrawSurface;
use crate::render::PixelBuffer;

pub trait Canvas {
    fn size(&self) -> Size;

    fn clear(&mut self, color: Color);

    fn fill_rect(&mut self, rect: Rect, color: Color);

    fn stroke_rect(&mut self, rect: Rect, color: Color, width: f32);

    /// Scales `bitmap` into `dest`; night mode inverts the colors
    fn draw_bitmap(&mut self, bitmap: &PixelBuffer, dest: Rect, night_mode: bool);
}

/// Software canvas backed by an RGBA image
#[derive(Clone, Debug)]
pub struct PixelCanvas {
    image: RgbaImage,
}

fn color_pixel(color: Color) -> Rgba<u8> {
    Rgba(color.rgba())
}

/// Integer pixel span covered by `[start, end)`, clipped to `[0, limit)`
fn span(start: f32, end: f32, limit: u32) -> Option<(u32, u32)> {
    if !(start.is_finite() && end.is_finite()) {
        return None;
    }
    let from = start.round().max(0.0) as u32;
    let to = (end.round().max(0.0) as u32).min(limit);
    (from < to).then_some((from, to))
}

impl PixelCanvas {
    #[must_use]
    pub fn new(size: Size) -> Self {
        let size = size.coerced();
        Self {
            image: RgbaImage::new(size.width as u32, size.height as u32),
        }
    }

    #[must_use]
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        (x < self.image.width() && y < self.image.height()).then(|| self.image.get_pixel(x, y).0)
    }

    /// Writes the canvas as PNG (or whatever the extension names)
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        self.image
            .save(path)
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}

impl Canvas for PixelCanvas {
    fn size(&self) -> Size {
        Size::new(self.image.width() as i32, self.image.height() as i32)
    }

    fn clear(&mut self, color: Color) {
        let pixel = color_pixel(color);
        for p in self.image.pixels_mut() {
            *p = pixel;
        }
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        let (Some((x0, x1)), Some((y0, y1))) = (
            span(rect.left, rect.right, self.image.width()),
            span(rect.top, rect.bottom, self.image.height()),
        ) else {
            return;
        };
        let pixel = color_pixel(color);
        for y in y0..y1 {
            for x in x0..x1 {
                self.image.put_pixel(x, y, pixel);
            }
        }
    }

    fn stroke_rect(&mut self, rect: Rect, color: Color, width: f32) {
        let w = width.max(1.0);
        self.fill_rect(Rect::new(rect.left, rect.top, rect.right, rect.top + w), color);
        self.fill_rect(Rect::new(rect.left, rect.bottom - w, rect.right, rect.bottom), color);
        self.fill_rect(Rect::new(rect.left, rect.top, rect.left + w, rect.bottom), color);
        self.fill_rect(Rect::new(rect.right - w, rect.top, rect.right, rect.bottom), color);
    }

    fn draw_bitmap(&mut self, bitmap: &PixelBuffer, dest: Rect, night_mode: bool) {
        if bitmap.width == 0 || bitmap.height == 0 || dest.is_empty() {
            return;
        }
        let (Some((x0, x1)), Some((y0, y1))) = (
            span(dest.left, dest.right, self.image.width()),
            span(dest.top, dest.bottom, self.image.height()),
        ) else {
            return;
        };
        let sx = bitmap.width as f32 / dest.width();
        let sy = bitmap.height as f32 / dest.height();
        for y in y0..y1 {
            let src_y = (((y as f32 + 0.5 - dest.top) * sy) as u32).min(bitmap.height - 1);
            for x in x0..x1 {
                let src_x = (((x as f32 + 0.5 - dest.left) * sx) as u32).min(bitmap.width - 1);
                let Some(mut px) = bitmap.pixel(src_x, src_y) else {
                    continue;
                };
                if night_mode {
                    px = [255 - px[0], 255 - px[1], 255 - px[2], px[3]];
                }
                self.image.put_pixel(x, y, Rgba(px));
            }
        }
    }
}

/// Single-buffered surface handing out one [`PixelCanvas`]
pub struct CanvasSurface {
    canvas: Option<PixelCanvas>,
    posted: u64,
}

impl CanvasSurface {
    #[must_use]
    pub fn new(size: Size) -> Self {
        Self {
            canvas: Some(PixelCanvas::new(size)),
            posted: 0,
        }
    }

    /// Last posted frame; `None` while a frame is being drawn
    #[must_use]
    pub fn canvas(&self) -> Option<&PixelCanvas> {
        self.canvas.as_ref()
    }

    #[must_use]
    pub fn frames_posted(&self) -> u64 {
        self.posted
    }

    pub fn resize(&mut self, size: Size) {
        self.canvas = Some(PixelCanvas::new(size));
    }
}

impl DrawSurface for CanvasSurface {
    type Frame = PixelCanvas;

    fn lock_frame(&mut self) -> Option<PixelCanvas> {
        self.canvas.take()
    }

    fn post_frame(&mut self, frame: PixelCanvas) {
        self.canvas = Some(frame);
        self.posted += 1;
    }
}
