//! MuPDF backend
//!
//! MuPDF handles are not shareable between threads, so the document lives on
//! a dedicated engine thread and the rasterizer talks to it over channels.

use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use log::{debug, error, info};
use mupdf::{Colorspace, Document, Matrix, Pixmap};

use super::rasterizer::{Rasterizer, check_request, region_px};
use super::request::{PixelBuffer, RenderFault, RenderTarget};
use crate::geometry::Size;

enum EngineRequest {
    Render {
        page: usize,
        target: RenderTarget,
        reply: flume::Sender<Result<PixelBuffer, RenderFault>>,
    },
    Shutdown,
}

pub struct MuPdfRasterizer {
    path: PathBuf,
    page_sizes: Vec<Size>,
    requests: flume::Sender<EngineRequest>,
    engine: Option<JoinHandle<()>>,
}

impl MuPdfRasterizer {
    /// Opens the document on a new engine thread and reads every page size
    pub fn open(path: &Path) -> Result<Self, RenderFault> {
        let (request_tx, request_rx) = flume::unbounded::<EngineRequest>();
        let (ready_tx, ready_rx) = flume::bounded::<Result<Vec<Size>, RenderFault>>(1);
        let doc_path = path.to_path_buf();

        let engine = thread::Builder::new()
            .name("pageview-mupdf".to_string())
            .spawn(move || {
                let doc = match open_document(&doc_path) {
                    Ok((doc, sizes)) => {
                        let _ = ready_tx.send(Ok(sizes));
                        doc
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                for request in request_rx.iter() {
                    match request {
                        EngineRequest::Render {
                            page,
                            target,
                            reply,
                        } => {
                            let _ = reply.send(render(&doc, page, &target));
                        }
                        EngineRequest::Shutdown => break,
                    }
                }
                debug!("MuPDF engine for {} stopped", doc_path.display());
            })?;

        let page_sizes = ready_rx
            .recv()
            .map_err(|_| RenderFault::generic("MuPDF engine exited during open"))??;
        info!("Opened {} ({} pages)", path.display(), page_sizes.len());

        Ok(Self {
            path: path.to_path_buf(),
            page_sizes,
            requests: request_tx,
            engine: Some(engine),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_document(path: &Path) -> Result<(Document, Vec<Size>), RenderFault> {
    let doc = Document::open(path.to_string_lossy().as_ref())?;
    let count = doc.page_count()?.max(0) as usize;
    let mut sizes = Vec::with_capacity(count);
    for index in 0..count {
        let page = doc.load_page(index as i32)?;
        let bounds = page.bounds()?;
        sizes.push(Size::new(
            (bounds.x1 - bounds.x0).round() as i32,
            (bounds.y1 - bounds.y0).round() as i32,
        ));
    }
    Ok((doc, sizes))
}

fn render(
    doc: &Document,
    page_num: usize,
    target: &RenderTarget,
) -> Result<PixelBuffer, RenderFault> {
    let page = doc.load_page(page_num as i32)?;
    let bounds = page.bounds()?;
    let page_w = (bounds.x1 - bounds.x0).max(1.0);
    let page_h = (bounds.y1 - bounds.y0).max(1.0);

    // whole page at the scale that makes the region land on the target size
    let sx = target.width as f32 / (page_w * target.region.width());
    let sy = target.height as f32 / (page_h * target.region.height());
    let rgb = Colorspace::device_rgb();
    let pixmap = page.to_pixmap(&Matrix::new_scale(sx, sy), &rgb, false, false)?;
    pixmap_to_rgba(&pixmap, target)
}

fn pixmap_to_rgba(pixmap: &Pixmap, target: &RenderTarget) -> Result<PixelBuffer, RenderFault> {
    let n = pixmap.n() as usize;
    if n < 3 {
        return Err(RenderFault::generic(format!(
            "Unsupported pixmap format: {n} channels"
        )));
    }

    let width = pixmap.width() as u32;
    let height = pixmap.height() as u32;
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    if samples.len() < stride.saturating_mul(height as usize) || width as usize * n > stride {
        return Err(RenderFault::generic("Pixmap buffer size mismatch"));
    }

    let (x0, y0, w, h) = region_px(width, height, target);
    let (w, h) = (w.min(target.width), h.min(target.height));
    let mut out = Vec::with_capacity(target.width as usize * target.height as usize * 4);
    for y in y0..y0 + h {
        let row_start = y as usize * stride + x0 as usize * n;
        let row = &samples[row_start..row_start + w as usize * n];
        for px in row.chunks_exact(n) {
            out.extend_from_slice(&[px[0], px[1], px[2], 0xFF]);
        }
        // rounding can leave the raster a pixel short; pad with white
        for _ in w..target.width {
            out.extend_from_slice(&[0xFF; 4]);
        }
    }
    out.resize(target.width as usize * target.height as usize * 4, 0xFF);
    Ok(PixelBuffer::new(target.width, target.height, out))
}

impl Rasterizer for MuPdfRasterizer {
    fn page_count(&self) -> usize {
        self.page_sizes.len()
    }

    fn page_size(&self, page: usize) -> Result<Size, RenderFault> {
        self.page_sizes
            .get(page)
            .copied()
            .ok_or(RenderFault::PageOutOfRange {
                page,
                count: self.page_sizes.len(),
            })
    }

    fn render_page(&self, page: usize, target: &RenderTarget) -> Result<PixelBuffer, RenderFault> {
        check_request(page, self.page_sizes.len(), target)?;
        let (reply_tx, reply_rx) = flume::bounded(1);
        self.requests
            .send(EngineRequest::Render {
                page,
                target: *target,
                reply: reply_tx,
            })
            .map_err(|_| RenderFault::generic("MuPDF engine is gone"))?;
        reply_rx
            .recv()
            .map_err(|_| RenderFault::generic("MuPDF engine dropped the request"))?
    }
}

impl Drop for MuPdfRasterizer {
    fn drop(&mut self) {
        let _ = self.requests.send(EngineRequest::Shutdown);
        if let Some(engine) = self.engine.take() {
            if engine.join().is_err() {
                error!("MuPDF engine for {} panicked", self.path.display());
            }
        }
    }
}
