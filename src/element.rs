//! Overlay elements drawn on top of pages
//!
//! Elements are positioned inside their page with a [`BoxLayout`]. Drawing
//! and input handling are separate capabilities: every element is
//! [`Drawable`], only some are [`Interactive`].

use std::sync::Arc;

use crate::canvas::Canvas;
use crate::geometry::{Color, Margins, Rect, SizeF};
use crate::render::PixelBuffer;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Dimension {
    /// Page pixels at zoom 1, scaled with the page
    Fixed(f32),
    #[default]
    MatchParent,
    /// Intrinsic size of the content
    WrapContent,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Align {
    #[default]
    Start,
    Center,
    End,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Gravity {
    pub horizontal: Align,
    pub vertical: Align,
}

impl Gravity {
    pub const CENTER: Gravity = Gravity {
        horizontal: Align::Center,
        vertical: Align::Center,
    };
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoxLayout {
    pub width: Dimension,
    pub height: Dimension,
    /// Page pixels at zoom 1
    pub margins: Margins,
    pub gravity: Gravity,
}

fn resolve(dimension: Dimension, available: f32, content: f32, scale: f32) -> f32 {
    let value = match dimension {
        Dimension::Fixed(v) => v * scale,
        Dimension::MatchParent => available,
        Dimension::WrapContent => content * scale,
    };
    value.clamp(0.0, available.max(0.0))
}

fn place(align: Align, start: f32, available: f32, length: f32) -> f32 {
    match align {
        Align::Start => start,
        Align::Center => start + (available - length) / 2.0,
        Align::End => start + available - length,
    }
}

impl BoxLayout {
    #[must_use]
    pub fn fixed(width: f32, height: f32) -> Self {
        Self {
            width: Dimension::Fixed(width),
            height: Dimension::Fixed(height),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_margins(mut self, margins: Margins) -> Self {
        self.margins = margins;
        self
    }

    #[must_use]
    pub fn with_gravity(mut self, gravity: Gravity) -> Self {
        self.gravity = gravity;
        self
    }

    /// Element rectangle inside `parent` (screen coordinates of the page)
    /// when the page is displayed at `scale`
    #[must_use]
    pub fn compute_bounds(&self, parent: Rect, content: SizeF, scale: f32) -> Rect {
        let m = &self.margins;
        let inner = Rect::new(
            parent.left + m.left * scale,
            parent.top + m.top * scale,
            parent.right - m.right * scale,
            parent.bottom - m.bottom * scale,
        );
        let width = resolve(self.width, inner.width(), content.width, scale);
        let height = resolve(self.height, inner.height(), content.height, scale);
        let left = place(self.gravity.horizontal, inner.left, inner.width(), width);
        let top = place(self.gravity.vertical, inner.top, inner.height(), height);
        Rect::from_xywh(left, top, width, height)
    }
}

pub trait Drawable {
    fn layout(&self) -> &BoxLayout;

    /// Size used by [`Dimension::WrapContent`]
    fn intrinsic_size(&self) -> SizeF {
        SizeF::new(0.0, 0.0)
    }

    fn draw(&self, canvas: &mut dyn Canvas, bounds: Rect, night_mode: bool);
}

pub trait Interactive {
    /// Tap at `(x, y)` relative to the element's top-left corner. Returns
    /// true when consumed.
    fn on_tap(&mut self, x: f32, y: f32) -> bool;
}

/// Element attached to a page of the open document
pub trait PageElement: Drawable + Send {
    fn page(&self) -> usize;

    fn as_interactive(&mut self) -> Option<&mut dyn Interactive> {
        None
    }

    fn bounds_in(&self, page_rect: Rect, zoom: f32) -> Rect {
        self.layout()
            .compute_bounds(page_rect, self.intrinsic_size(), zoom)
    }
}

pub type TapHandler = Box<dyn FnMut(usize, f32, f32) + Send>;

/// Filled and/or outlined rectangle
pub struct ShapeElement {
    page: usize,
    layout: BoxLayout,
    fill: Option<Color>,
    stroke: Option<(Color, f32)>,
    on_tap: Option<TapHandler>,
}

impl ShapeElement {
    #[must_use]
    pub fn new(page: usize, layout: BoxLayout) -> Self {
        Self {
            page,
            layout,
            fill: None,
            stroke: None,
            on_tap: None,
        }
    }

    #[must_use]
    pub fn fill(mut self, color: Color) -> Self {
        self.fill = Some(color);
        self
    }

    #[must_use]
    pub fn stroke(mut self, color: Color, width: f32) -> Self {
        self.stroke = Some((color, width));
        self
    }

    #[must_use]
    pub fn on_tap(mut self, handler: impl FnMut(usize, f32, f32) + Send + 'static) -> Self {
        self.on_tap = Some(Box::new(handler));
        self
    }
}

impl Drawable for ShapeElement {
    fn layout(&self) -> &BoxLayout {
        &self.layout
    }

    fn draw(&self, canvas: &mut dyn Canvas, bounds: Rect, night_mode: bool) {
        let shade = |c: Color| if night_mode { c.inverted() } else { c };
        if let Some(color) = self.fill {
            canvas.fill_rect(bounds, shade(color));
        }
        if let Some((color, width)) = self.stroke {
            canvas.stroke_rect(bounds, shade(color), width);
        }
    }
}

impl Interactive for ShapeElement {
    fn on_tap(&mut self, x: f32, y: f32) -> bool {
        match self.on_tap.as_mut() {
            Some(handler) => {
                handler(self.page, x, y);
                true
            }
            None => false,
        }
    }
}

impl PageElement for ShapeElement {
    fn page(&self) -> usize {
        self.page
    }

    fn as_interactive(&mut self) -> Option<&mut dyn Interactive> {
        self.on_tap.is_some().then_some(self as &mut dyn Interactive)
    }
}

/// Bitmap stamped onto a page
pub struct ImageElement {
    page: usize,
    layout: BoxLayout,
    bitmap: Arc<PixelBuffer>,
}

impl ImageElement {
    #[must_use]
    pub fn new(page: usize, bitmap: Arc<PixelBuffer>) -> Self {
        Self {
            page,
            layout: BoxLayout {
                width: Dimension::WrapContent,
                height: Dimension::WrapContent,
                ..BoxLayout::default()
            },
            bitmap,
        }
    }

    #[must_use]
    pub fn with_layout(mut self, layout: BoxLayout) -> Self {
        self.layout = layout;
        self
    }
}

impl Drawable for ImageElement {
    fn layout(&self) -> &BoxLayout {
        &self.layout
    }

    fn intrinsic_size(&self) -> SizeF {
        SizeF::new(self.bitmap.width as f32, self.bitmap.height as f32)
    }

    fn draw(&self, canvas: &mut dyn Canvas, bounds: Rect, night_mode: bool) {
        canvas.draw_bitmap(&self.bitmap, bounds, night_mode);
    }
}

impl PageElement for ImageElement {
    fn page(&self) -> usize {
        self.page
    }
}
