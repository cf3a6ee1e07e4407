//! Document layout model
//!
//! Holds the ordered page table of an open document: original page sizes as
//! reported by the backend, the sizes after fit-policy scaling and the
//! cumulative offsets along the scroll axis. Every offset/length accessor
//! takes the current zoom and scales the zoom-1 layout.

use std::fmt;
use std::str::FromStr;

use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::geometry::{Color, Margins, Rect, Size, SizeF};
use crate::layout::{
    CalculatorSetup, DefaultPageSizeCalculator, FitPolicy, FixPageSizeCalculator, LayoutError,
    PageSizeCalculator,
};

/// Page count above which the per-page size pass runs on the rayon pool
const PARALLEL_LAYOUT_THRESHOLD: usize = 256;

/// Axis pages are stacked along
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwipeOrientation {
    #[default]
    Vertical,
    Horizontal,
}

impl SwipeOrientation {
    #[must_use]
    pub fn is_vertical(self) -> bool {
        matches!(self, Self::Vertical)
    }
}

impl FromStr for SwipeOrientation {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vertical" => Ok(Self::Vertical),
            "horizontal" => Ok(Self::Horizontal),
            _ => Err(LayoutError::UnknownOrientation(s.to_string())),
        }
    }
}

impl fmt::Display for SwipeOrientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vertical => "vertical",
            Self::Horizontal => "horizontal",
        })
    }
}

/// Which calculator the layout pass uses
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingMode {
    /// Pages scaled by the envelope ratios ([`DefaultPageSizeCalculator`])
    #[default]
    Document,
    /// Every page fit into the viewport ([`FixPageSizeCalculator`])
    Slideshow,
}

/// Typed document options
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    pub fit_policy: FitPolicy,
    pub sizing: SizingMode,
    pub orientation: SwipeOrientation,
    pub fling_enabled: bool,
    /// One page per fling instead of free inertial scrolling
    pub page_fling: bool,
    /// Snap to page edges after a scroll or fling ends
    pub page_snap: bool,
    /// Gap between pages in pixels at zoom 1
    pub spacing: i32,
    /// Pad each page to at least the viewport length along the scroll axis
    pub auto_spacing: bool,
    pub margins: Margins,
    pub night_mode: bool,
    pub background: Color,
    pub fit_each_page: bool,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            fit_policy: FitPolicy::Width,
            sizing: SizingMode::Document,
            orientation: SwipeOrientation::Vertical,
            fling_enabled: true,
            page_fling: false,
            page_snap: false,
            spacing: 0,
            auto_spacing: false,
            margins: Margins::default(),
            night_mode: false,
            background: Color::LIGHT_GRAY,
            fit_each_page: false,
        }
    }
}

impl DocumentConfig {
    /// Preset for the photo slideshow: one photo per screen, paged flings
    #[must_use]
    pub fn slideshow() -> Self {
        Self {
            fit_policy: FitPolicy::Both,
            sizing: SizingMode::Slideshow,
            orientation: SwipeOrientation::Horizontal,
            page_fling: true,
            page_snap: true,
            auto_spacing: true,
            background: Color::BLACK,
            ..Self::default()
        }
    }
}

/// One row of the page table
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageLayout {
    pub index: usize,
    pub original: Size,
    /// Size after fit-policy scaling, zoom 1
    pub size: Size,
    /// Start of the page along the scroll axis, zoom 1
    pub offset: f32,
    /// Spacing that follows the page, zoom 1
    pub spacing: f32,
}

/// Output of a layout pass, computable off the UI thread
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentLayout {
    pub viewport: Size,
    pub pages: Vec<PageLayout>,
    pub max_page_width: i32,
    pub max_page_height: i32,
    pub length: f32,
}

impl DocumentLayout {
    /// Runs the calculator over every page and accumulates offsets
    #[must_use]
    pub fn compute(originals: &[Size], config: &DocumentConfig, viewport: Size) -> Self {
        let setup = CalculatorSetup {
            fit_policy: config.fit_policy,
            original_max_width: widest(originals),
            original_max_height: tallest(originals),
            viewport,
            fit_each_page: config.fit_each_page,
        };
        let calculator: Box<dyn PageSizeCalculator> = match config.sizing {
            SizingMode::Document => Box::new(DefaultPageSizeCalculator::new(&setup)),
            SizingMode::Slideshow => {
                let mut calc = FixPageSizeCalculator::default();
                calc.setup(&setup);
                Box::new(calc)
            }
        };

        let sizes: Vec<Size> = if originals.len() > PARALLEL_LAYOUT_THRESHOLD {
            originals
                .par_iter()
                .map(|page| calculator.calculate(*page))
                .collect()
        } else {
            originals.iter().map(|page| calculator.calculate(*page)).collect()
        };

        let vertical = config.orientation.is_vertical();
        let spacing = config.spacing.max(0) as f32;
        let view_length = axis_length(viewport, vertical);
        let count = sizes.len();
        let mut pages = Vec::with_capacity(count);
        let mut offset = 0.0f32;
        for (index, (original, size)) in originals.iter().zip(sizes.iter()).enumerate() {
            let length = axis_length(*size, vertical);
            let trailing = if index + 1 < count { spacing } else { 0.0 };
            // auto spacing pads the page to a full viewport, centered in it
            let (lead, gap) = if config.auto_spacing {
                let pad = (view_length - length).max(0.0);
                (pad / 2.0, pad + trailing)
            } else {
                (0.0, trailing)
            };
            pages.push(PageLayout {
                index,
                original: *original,
                size: *size,
                offset: offset + lead,
                spacing: gap,
            });
            offset += length + gap;
        }

        Self {
            viewport,
            max_page_width: sizes.iter().map(|s| s.width).max().unwrap_or(0),
            max_page_height: sizes.iter().map(|s| s.height).max().unwrap_or(0),
            length: offset,
            pages,
        }
    }
}

fn axis_length(size: Size, vertical: bool) -> f32 {
    if vertical {
        size.height as f32
    } else {
        size.width as f32
    }
}

fn widest(pages: &[Size]) -> Size {
    pages
        .iter()
        .copied()
        .max_by_key(|s| s.width)
        .unwrap_or(Size::new(1, 1))
}

fn tallest(pages: &[Size]) -> Size {
    pages
        .iter()
        .copied()
        .max_by_key(|s| s.height)
        .unwrap_or(Size::new(1, 1))
}

/// Open document: page table plus options
#[derive(Clone, Debug)]
pub struct Document {
    config: DocumentConfig,
    originals: Vec<Size>,
    layout: DocumentLayout,
}

impl Document {
    /// Creates the document and runs the first layout pass for `viewport`
    #[must_use]
    pub fn new(originals: Vec<Size>, config: DocumentConfig, viewport: Size) -> Self {
        let layout = DocumentLayout::compute(&originals, &config, viewport);
        debug!(
            "Document laid out: {} pages, length {:.1}, viewport {}x{}",
            originals.len(),
            layout.length,
            viewport.width,
            viewport.height
        );
        Self {
            config,
            originals,
            layout,
        }
    }

    #[must_use]
    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    /// Replaces options and lays the pages out again
    pub fn set_config(&mut self, config: DocumentConfig) {
        self.config = config;
        self.recalculate_page_sizes(self.layout.viewport);
    }

    #[must_use]
    pub fn originals(&self) -> &[Size] {
        &self.originals
    }

    /// Re-runs the layout pass; call when the viewport changes
    pub fn recalculate_page_sizes(&mut self, viewport: Size) {
        self.layout = DocumentLayout::compute(&self.originals, &self.config, viewport);
    }

    /// Installs a layout computed elsewhere. Ignored if it was computed for a
    /// different page table.
    pub fn apply_layout(&mut self, layout: DocumentLayout) -> bool {
        if layout.pages.len() != self.originals.len() {
            debug!(
                "Dropping stale layout: {} pages vs {}",
                layout.pages.len(),
                self.originals.len()
            );
            return false;
        }
        self.layout = layout;
        true
    }

    #[must_use]
    pub fn layout(&self) -> &DocumentLayout {
        &self.layout
    }

    #[must_use]
    pub fn viewport(&self) -> Size {
        self.layout.viewport
    }

    #[must_use]
    pub fn is_vertical(&self) -> bool {
        self.config.orientation.is_vertical()
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.layout.pages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layout.pages.is_empty()
    }

    #[must_use]
    pub fn page(&self, index: usize) -> Option<&PageLayout> {
        self.layout.pages.get(index)
    }

    /// Clamps a requested page index into the document
    #[must_use]
    pub fn valid_page(&self, page: i64) -> usize {
        if self.is_empty() || page <= 0 {
            return 0;
        }
        (page as usize).min(self.page_count() - 1)
    }

    #[must_use]
    pub fn page_size(&self, index: usize) -> Size {
        self.page(index).map_or(Size::ZERO, |p| p.size)
    }

    #[must_use]
    pub fn original_page_size(&self, index: usize) -> Size {
        self.page(index).map_or(Size::ZERO, |p| p.original)
    }

    #[must_use]
    pub fn scaled_page_size(&self, index: usize, zoom: f32) -> SizeF {
        self.page_size(index).scaled(zoom)
    }

    #[must_use]
    pub fn max_page_width(&self) -> f32 {
        self.layout.max_page_width as f32
    }

    #[must_use]
    pub fn max_page_height(&self) -> f32 {
        self.layout.max_page_height as f32
    }

    /// Extent of the widest (vertical) or tallest (horizontal) page, i.e. the
    /// document size across the scroll axis
    #[must_use]
    pub fn cross_length(&self, zoom: f32) -> f32 {
        if self.is_vertical() {
            self.max_page_width() * zoom
        } else {
            self.max_page_height() * zoom
        }
    }

    /// Total length along the scroll axis
    #[must_use]
    pub fn doc_length(&self, zoom: f32) -> f32 {
        self.layout.length * zoom
    }

    #[must_use]
    pub fn page_offset(&self, index: usize, zoom: f32) -> f32 {
        self.page(index).map_or(0.0, |p| p.offset * zoom)
    }

    /// Page extent along the scroll axis
    #[must_use]
    pub fn page_length(&self, index: usize, zoom: f32) -> f32 {
        axis_length(self.page_size(index), self.is_vertical()) * zoom
    }

    #[must_use]
    pub fn page_spacing(&self, index: usize, zoom: f32) -> f32 {
        self.page(index).map_or(0.0, |p| p.spacing * zoom)
    }

    /// Offset across the scroll axis that centers a narrower page against the
    /// widest one
    #[must_use]
    pub fn secondary_page_offset(&self, index: usize, zoom: f32) -> f32 {
        let size = self.page_size(index);
        let gap = if self.is_vertical() {
            self.max_page_width() - size.width as f32
        } else {
            self.max_page_height() - size.height as f32
        };
        gap * zoom / 2.0
    }

    /// Page whose start lies at or before `offset` along the scroll axis
    #[must_use]
    pub fn page_at_offset(&self, offset: f32, zoom: f32) -> usize {
        let mut current = 0usize;
        for index in 0..self.page_count() {
            let start = self.page_offset(index, zoom) - self.page_spacing(index, zoom) / 2.0;
            if start >= offset {
                break;
            }
            current += 1;
        }
        current.saturating_sub(1)
    }

    /// Page rectangle in document coordinates at `zoom`
    #[must_use]
    pub fn page_bounds(&self, index: usize, zoom: f32) -> Rect {
        let size = self.scaled_page_size(index, zoom);
        let main = self.page_offset(index, zoom);
        let cross = self.secondary_page_offset(index, zoom);
        if self.is_vertical() {
            Rect::from_xywh(cross, main, size.width, size.height)
        } else {
            Rect::from_xywh(main, cross, size.width, size.height)
        }
    }
}
