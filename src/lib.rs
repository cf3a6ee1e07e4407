// Export modules for use in tests and the binary
pub mod cache;
pub mod canvas;
pub mod document;
pub mod element;
pub mod geometry;
pub mod layout;
pub mod panic_handler;
pub mod redraw;
pub mod render;
pub mod settings;
pub mod view;
pub mod viewport;

// Re-export the main entry points
pub use cache::{Blob, CacheStats, ContentCache, ContentKey, ContentKind};
pub use document::{Document, DocumentConfig, SwipeOrientation};
pub use geometry::{Color, Margins, Rect, Size, SizeF};
pub use layout::{FitPolicy, PageSizeCalculator};
pub use redraw::{DrawSurface, LoopState, ReDrawer};
pub use render::{RenderScheduler, RenderTarget};
pub use view::{DocumentView, ViewOptions};
pub use viewport::{ViewState, ViewStates, ViewportController};
