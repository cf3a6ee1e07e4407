//! Asynchronous page rendering
//!
//! Backends implement [`Rasterizer`]. The [`RenderScheduler`] resolves
//! raster requests from the content cache or runs them on a [`WorkerPool`],
//! handing results back to the UI thread through a [`MainThread`] poster.

#[cfg(feature = "pdf")]
pub mod pdf;
pub mod photo;
pub mod pool;
pub mod poster;
pub mod rasterizer;
pub mod request;
pub mod scheduler;

#[cfg(feature = "pdf")]
pub use pdf::MuPdfRasterizer;
pub use photo::PhotoRasterizer;
pub use pool::{CancellationToken, TaskHandle, WorkerPool};
pub use poster::{ChannelPoster, MainThread, UiCallback};
pub use rasterizer::{Rasterizer, SharedRasterizer, share};
pub use request::{JobId, PixelBuffer, RenderCallback, RenderFault, RenderTarget};
pub use scheduler::{LoadOutcome, RenderScheduler, SchedulerConfig};
