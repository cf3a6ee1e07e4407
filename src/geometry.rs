//! Geometry primitives shared by layout, viewport and drawing code
//!
//! Page dimensions are integral (`Size`), everything that moves on screen
//! (offsets, zoomed extents, bounds) is `f32`.

use serde::{Deserialize, Serialize};

/// Integral width/height pair
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    /// Degenerate result marker
    pub const ZERO: Size = Size::new(0, 0);

    #[must_use]
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// Copy with both dimensions forced to at least 1 so ratios stay finite
    #[must_use]
    pub fn coerced(self) -> Self {
        Self {
            width: self.width.max(1),
            height: self.height.max(1),
        }
    }

    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Width divided by height
    #[must_use]
    pub fn aspect(&self) -> f32 {
        let s = self.coerced();
        s.width as f32 / s.height as f32
    }

    #[must_use]
    pub fn to_f32(self) -> SizeF {
        SizeF::new(self.width as f32, self.height as f32)
    }

    #[must_use]
    pub fn scaled(self, zoom: f32) -> SizeF {
        SizeF::new(self.width as f32 * zoom, self.height as f32 * zoom)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SizeF {
    pub width: f32,
    pub height: f32,
}

impl SizeF {
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Rounds down to integral pixels, never below zero
    #[must_use]
    pub fn floor(self) -> Size {
        Size::new(
            self.width.max(0.0).floor() as i32,
            self.height.max(0.0).floor() as i32,
        )
    }
}

/// Axis-aligned rectangle, `right`/`bottom` exclusive
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    /// Unit rectangle, used as the "whole page" render region
    pub const UNIT: Rect = Rect::new(0.0, 0.0, 1.0, 1.0);

    #[must_use]
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    #[must_use]
    pub fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    #[must_use]
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    #[must_use]
    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    #[must_use]
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }

    #[must_use]
    pub fn intersects(&self, other: &Rect) -> bool {
        self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }

    /// Overlapping part of both rectangles, `None` when disjoint
    #[must_use]
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let r = Rect::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        );
        (!r.is_empty()).then_some(r)
    }

    #[must_use]
    pub fn offset(&self, dx: f32, dy: f32) -> Rect {
        Rect::new(
            self.left + dx,
            self.top + dy,
            self.right + dx,
            self.bottom + dy,
        )
    }

    #[must_use]
    pub fn inset(&self, margins: &Margins) -> Rect {
        Rect::new(
            self.left + margins.left,
            self.top + margins.top,
            self.right - margins.right,
            self.bottom - margins.bottom,
        )
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Margins {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Margins {
    #[must_use]
    pub const fn uniform(value: f32) -> Self {
        Self {
            left: value,
            top: value,
            right: value,
            bottom: value,
        }
    }

    #[must_use]
    pub fn horizontal(&self) -> f32 {
        self.left + self.right
    }

    #[must_use]
    pub fn vertical(&self) -> f32 {
        self.top + self.bottom
    }
}

/// 0xRRGGBB colour
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Color(pub u32);

impl Color {
    pub const WHITE: Color = Color(0xFF_FF_FF);
    pub const BLACK: Color = Color(0x00_00_00);
    pub const LIGHT_GRAY: Color = Color(0xE0_E0_E0);

    #[must_use]
    pub fn rgba(self) -> [u8; 4] {
        [
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
            0xFF,
        ]
    }

    #[must_use]
    pub fn inverted(self) -> Color {
        Color(!self.0 & 0xFF_FF_FF)
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerced_never_goes_below_one() {
        assert_eq!(Size::new(0, -5).coerced(), Size::new(1, 1));
        assert_eq!(Size::new(10, 20).coerced(), Size::new(10, 20));
    }

    #[test]
    fn degenerate_detection() {
        assert!(Size::ZERO.is_degenerate());
        assert!(Size::new(10, 0).is_degenerate());
        assert!(!Size::new(1, 1).is_degenerate());
    }

    #[test]
    fn intersection_of_disjoint_rects_is_none() {
        let a = Rect::from_xywh(0.0, 0.0, 10.0, 10.0);
        let b = Rect::from_xywh(10.0, 0.0, 10.0, 10.0);
        assert!(!a.intersects(&b));
        assert_eq!(a.intersection(&b), None);

        let c = Rect::from_xywh(5.0, 5.0, 10.0, 10.0);
        assert_eq!(a.intersection(&c), Some(Rect::new(5.0, 5.0, 10.0, 10.0)));
    }

    #[test]
    fn color_channels() {
        assert_eq!(Color(0x12_34_56).rgba(), [0x12, 0x34, 0x56, 0xFF]);
        assert_eq!(Color::WHITE.inverted(), Color::BLACK);
    }
}
