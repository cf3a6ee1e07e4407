//! Page size calculators
//!
//! A calculator is configured once per viewport/policy change with the two
//! "envelope" pages of the document (the widest and the tallest original
//! page). That pass derives the width/height ratios every other page is
//! scaled by, so pages keep their relative proportions. `calculate` is pure
//! and safe to call from any thread afterwards.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::LayoutError;
use crate::geometry::Size;

/// How pages are fit onto the viewport
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitPolicy {
    /// Widest page matches the viewport width
    #[default]
    Width,
    /// Tallest page matches the viewport height
    Height,
    /// Envelope fits inside the viewport on both axes
    Both,
    /// Original sizes, no scaling
    None,
}

impl FromStr for FitPolicy {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "width" => Ok(Self::Width),
            "height" => Ok(Self::Height),
            "both" => Ok(Self::Both),
            "none" => Ok(Self::None),
            _ => Err(LayoutError::UnknownFitPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for FitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Width => "width",
            Self::Height => "height",
            Self::Both => "both",
            Self::None => "none",
        };
        f.write_str(name)
    }
}

/// Everything a calculator needs to derive its envelope
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CalculatorSetup {
    pub fit_policy: FitPolicy,
    /// Original size of the widest page
    pub original_max_width: Size,
    /// Original size of the tallest page
    pub original_max_height: Size,
    pub viewport: Size,
    /// Fit every page to the viewport instead of scaling by the envelope ratio
    pub fit_each_page: bool,
}

pub trait PageSizeCalculator: Send + Sync {
    /// Reconfigure from scratch. Calling twice with equal input yields
    /// identical results.
    fn setup(&mut self, setup: &CalculatorSetup);

    /// Modified size for a page; `Size::ZERO` for degenerate input
    fn calculate(&self, page: Size) -> Size;

    fn optimal_max_width(&self) -> Size;

    fn optimal_max_height(&self) -> Size;
}

/// Scale `page` so its width becomes `max_width`
#[must_use]
pub fn fit_width(page: Size, max_width: f32) -> Size {
    let page = page.coerced();
    let height = f64::from(max_width) * f64::from(page.height) / f64::from(page.width);
    Size::new(max_width.floor() as i32, height.floor() as i32)
}

/// Scale `page` so its height becomes `max_height`
#[must_use]
pub fn fit_height(page: Size, max_height: f32) -> Size {
    let page = page.coerced();
    let width = f64::from(max_height) * f64::from(page.width) / f64::from(page.height);
    Size::new(width.floor() as i32, max_height.floor() as i32)
}

/// Largest scaled `page` that fits inside `max_width` x `max_height`
#[must_use]
pub fn fit_both(page: Size, max_width: f32, max_height: f32) -> Size {
    let fitted = fit_width(page, max_width);
    if fitted.height as f32 > max_height {
        fit_height(page, max_height)
    } else {
        fitted
    }
}

/// Scales pages by the ratios derived from the document envelope
#[derive(Clone, Debug)]
pub struct DefaultPageSizeCalculator {
    fit_policy: FitPolicy,
    fit_each_page: bool,
    viewport: Size,
    original_max_width: Size,
    original_max_height: Size,
    optimal_max_width: Size,
    optimal_max_height: Size,
    width_ratio: f32,
    height_ratio: f32,
}

impl Default for DefaultPageSizeCalculator {
    fn default() -> Self {
        Self {
            fit_policy: FitPolicy::Width,
            fit_each_page: false,
            viewport: Size::new(1, 1),
            original_max_width: Size::new(1, 1),
            original_max_height: Size::new(1, 1),
            optimal_max_width: Size::new(1, 1),
            optimal_max_height: Size::new(1, 1),
            width_ratio: 1.0,
            height_ratio: 1.0,
        }
    }
}

impl DefaultPageSizeCalculator {
    #[must_use]
    pub fn new(setup: &CalculatorSetup) -> Self {
        let mut calculator = Self::default();
        calculator.setup(setup);
        calculator
    }

    #[must_use]
    pub fn width_ratio(&self) -> f32 {
        self.width_ratio
    }

    #[must_use]
    pub fn height_ratio(&self) -> f32 {
        self.height_ratio
    }

    fn calculate_max_pages(&mut self) {
        let view = self.viewport;
        let orig_w = self.original_max_width;
        let orig_h = self.original_max_height;

        match self.fit_policy {
            FitPolicy::Height => {
                self.optimal_max_height = fit_height(orig_h, view.height as f32);
                self.height_ratio =
                    self.optimal_max_height.height as f32 / orig_h.height as f32;
                self.optimal_max_width =
                    fit_height(orig_w, orig_w.height as f32 * self.height_ratio);
                self.width_ratio = self.optimal_max_width.width as f32 / orig_w.width as f32;
            }
            FitPolicy::Both => {
                let local_width = fit_both(orig_w, view.width as f32, view.height as f32);
                let local_ratio = local_width.width as f32 / orig_w.width as f32;
                self.optimal_max_height = fit_both(
                    orig_h,
                    orig_h.width as f32 * local_ratio,
                    view.height as f32,
                );
                self.height_ratio =
                    self.optimal_max_height.height as f32 / orig_h.height as f32;
                self.optimal_max_width = fit_both(
                    orig_w,
                    view.width as f32,
                    orig_w.height as f32 * self.height_ratio,
                );
                self.width_ratio = self.optimal_max_width.width as f32 / orig_w.width as f32;
            }
            FitPolicy::Width => {
                self.optimal_max_width = fit_width(orig_w, view.width as f32);
                self.width_ratio = self.optimal_max_width.width as f32 / orig_w.width as f32;
                self.optimal_max_height =
                    fit_width(orig_h, orig_h.width as f32 * self.width_ratio);
                self.height_ratio =
                    self.optimal_max_height.height as f32 / orig_h.height as f32;
            }
            FitPolicy::None => {
                self.optimal_max_width = orig_w;
                self.optimal_max_height = orig_h;
                self.width_ratio = 1.0;
                self.height_ratio = 1.0;
            }
        }
    }
}

impl PageSizeCalculator for DefaultPageSizeCalculator {
    fn setup(&mut self, setup: &CalculatorSetup) {
        self.fit_policy = setup.fit_policy;
        self.fit_each_page = setup.fit_each_page;
        self.viewport = setup.viewport.coerced();
        self.original_max_width = setup.original_max_width.coerced();
        self.original_max_height = setup.original_max_height.coerced();
        self.calculate_max_pages();
    }

    fn calculate(&self, page: Size) -> Size {
        if page.is_degenerate() {
            return Size::ZERO;
        }

        let max_width = if self.fit_each_page {
            self.viewport.width as f32
        } else {
            page.width as f32 * self.width_ratio
        };
        let max_height = if self.fit_each_page {
            self.viewport.height as f32
        } else {
            page.height as f32 * self.height_ratio
        };

        match self.fit_policy {
            FitPolicy::Height => fit_height(page, max_height),
            FitPolicy::Both => fit_both(page, max_width, max_height),
            FitPolicy::Width => fit_width(page, max_width),
            FitPolicy::None => page,
        }
    }

    fn optimal_max_width(&self) -> Size {
        self.optimal_max_width
    }

    fn optimal_max_height(&self) -> Size {
        self.optimal_max_height
    }
}

/// Fits every page into the viewport box on its own, ignoring the envelope.
/// Used by the photo slideshow where each photo fills the screen.
#[derive(Clone, Debug)]
pub struct FixPageSizeCalculator {
    viewport: Size,
    optimal_max_width: Size,
    optimal_max_height: Size,
}

impl Default for FixPageSizeCalculator {
    fn default() -> Self {
        Self {
            viewport: Size::new(1, 1),
            optimal_max_width: Size::new(1, 1),
            optimal_max_height: Size::new(1, 1),
        }
    }
}

impl FixPageSizeCalculator {
    #[must_use]
    pub fn new(viewport: Size) -> Self {
        let mut calculator = Self::default();
        calculator.setup(&CalculatorSetup {
            fit_policy: FitPolicy::Both,
            original_max_width: viewport,
            original_max_height: viewport,
            viewport,
            fit_each_page: true,
        });
        calculator
    }
}

impl PageSizeCalculator for FixPageSizeCalculator {
    fn setup(&mut self, setup: &CalculatorSetup) {
        self.viewport = setup.viewport.coerced();
        self.optimal_max_width = self.calculate(setup.original_max_width.coerced());
        self.optimal_max_height = self.calculate(setup.original_max_height.coerced());
    }

    fn calculate(&self, page: Size) -> Size {
        if page.is_degenerate() {
            return Size::ZERO;
        }
        fit_both(
            page,
            self.viewport.width as f32,
            self.viewport.height as f32,
        )
    }

    fn optimal_max_width(&self) -> Size {
        self.optimal_max_width
    }

    fn optimal_max_height(&self) -> Size {
        self.optimal_max_height
    }
}
