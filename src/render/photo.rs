//! Photo slideshow backend: every image file in a directory is one page

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use fast_image_resize as fr;
use image::DynamicImage;
use log::{debug, info, warn};
use walkdir::WalkDir;

use super::rasterizer::{Rasterizer, check_request, region_px};
use super::request::{PixelBuffer, RenderFault, RenderTarget};
use crate::geometry::Size;

const PHOTO_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp", "tif", "tiff"];

struct Photo {
    path: PathBuf,
    size: Size,
}

pub struct PhotoRasterizer {
    photos: Vec<Photo>,
}

impl PhotoRasterizer {
    /// Lists image files directly inside `dir`, sorted by file name. Sizes
    /// come from the file headers; unreadable files are skipped.
    pub fn open(dir: &Path) -> Result<Self, RenderFault> {
        if !dir.is_dir() {
            return Err(RenderFault::generic(format!(
                "{} is not a directory",
                dir.display()
            )));
        }

        let mut paths: Vec<PathBuf> = WalkDir::new(dir)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| is_photo(p))
            .collect();
        paths.sort();

        let photos: Vec<Photo> = paths
            .into_iter()
            .filter_map(|path| match imagesize::size(&path) {
                Ok(dim) => Some(Photo {
                    size: Size::new(dim.width as i32, dim.height as i32),
                    path,
                }),
                Err(e) => {
                    warn!("Skipping {}: {e}", path.display());
                    None
                }
            })
            .collect();

        info!("Opened photo directory {} ({} photos)", dir.display(), photos.len());
        Ok(Self { photos })
    }

    #[must_use]
    pub fn path(&self, page: usize) -> Option<&Path> {
        self.photos.get(page).map(|p| p.path.as_path())
    }
}

fn is_photo(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| PHOTO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

impl Rasterizer for PhotoRasterizer {
    fn page_count(&self) -> usize {
        self.photos.len()
    }

    fn page_size(&self, page: usize) -> Result<Size, RenderFault> {
        self.photos
            .get(page)
            .map(|p| p.size)
            .ok_or(RenderFault::PageOutOfRange {
                page,
                count: self.photos.len(),
            })
    }

    fn render_page(&self, page: usize, target: &RenderTarget) -> Result<PixelBuffer, RenderFault> {
        check_request(page, self.photos.len(), target)?;
        let photo = &self.photos[page];
        debug!(
            "Decoding photo {} for {}x{}",
            photo.path.display(),
            target.width,
            target.height
        );

        let decoded = image::open(&photo.path)?;
        let (x, y, w, h) = region_px(decoded.width(), decoded.height(), target);
        let cropped = if (x, y, w, h) == (0, 0, decoded.width(), decoded.height()) {
            decoded
        } else {
            decoded.crop_imm(x, y, w, h)
        };
        resize_rgba(&cropped, target.width, target.height)
    }
}

/// Lanczos3 resize into an RGBA buffer
pub fn resize_rgba(
    src: &DynamicImage,
    width: u32,
    height: u32,
) -> Result<PixelBuffer, RenderFault> {
    let src_rgba = src.to_rgba8();
    let (src_width, src_height) = src_rgba.dimensions();
    if (src_width, src_height) == (width, height) {
        return Ok(PixelBuffer::new(width, height, src_rgba.into_raw()));
    }

    let invalid = || RenderFault::InvalidTarget { width, height };
    let src_view = fr::Image::from_vec_u8(
        NonZeroU32::new(src_width).ok_or_else(invalid)?,
        NonZeroU32::new(src_height).ok_or_else(invalid)?,
        src_rgba.into_raw(),
        fr::PixelType::U8x4,
    )
    .map_err(|e| RenderFault::generic(format!("resize source: {e}")))?;

    let mut dst = fr::Image::new(
        NonZeroU32::new(width).ok_or_else(invalid)?,
        NonZeroU32::new(height).ok_or_else(invalid)?,
        fr::PixelType::U8x4,
    );
    let mut resizer = fr::Resizer::new(fr::ResizeAlg::Convolution(fr::FilterType::Lanczos3));
    resizer
        .resize(&src_view.view(), &mut dst.view_mut())
        .map_err(|e| RenderFault::generic(format!("resize: {e}")))?;

    Ok(PixelBuffer::new(width, height, dst.into_vec()))
}
