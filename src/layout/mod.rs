//! Page size layout
//!
//! Maps source page dimensions onto the viewport according to a
//! [`FitPolicy`].

pub mod page_size;

pub use page_size::{
    CalculatorSetup, DefaultPageSizeCalculator, FitPolicy, FixPageSizeCalculator,
    PageSizeCalculator,
};

use thiserror::Error;

use crate::geometry::Size;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("unknown fit policy '{0}' (expected width, height, both or none)")]
    UnknownFitPolicy(String),
    #[error("unknown swipe orientation '{0}' (expected vertical or horizontal)")]
    UnknownOrientation(String),
    #[error("invalid viewport '{0}' (expected WIDTHxHEIGHT)")]
    InvalidViewport(String),
}

/// Parses `WIDTHxHEIGHT`, e.g. `1080x1920`
pub fn parse_viewport(s: &str) -> Result<Size, LayoutError> {
    let invalid = || LayoutError::InvalidViewport(s.to_string());
    let (w, h) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
    let width: i32 = w.trim().parse().map_err(|_| invalid())?;
    let height: i32 = h.trim().parse().map_err(|_| invalid())?;
    if width <= 0 || height <= 0 {
        return Err(invalid());
    }
    Ok(Size::new(width, height))
}
