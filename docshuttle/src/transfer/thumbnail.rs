use std::io::Cursor;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::ImageFormat;
use thiserror::Error;

const THUMBNAIL_EDGE: u32 = 256;

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("no preview available for {0}")]
    Unsupported(String),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Renders a preview of a source document as a `data:` URL.
pub trait ThumbnailRenderer: Send + Sync {
    fn render(&self, path: &Path, bytes: &[u8]) -> Result<String, ThumbnailError>;
}

/// PNG previews for raster images the `image` crate can decode.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageThumbnailer;

impl ThumbnailRenderer for ImageThumbnailer {
    fn render(&self, path: &Path, bytes: &[u8]) -> Result<String, ThumbnailError> {
        if ImageFormat::from_path(path).is_err() {
            return Err(ThumbnailError::Unsupported(path.display().to_string()));
        }
        let preview = image::load_from_memory(bytes)?.thumbnail(THUMBNAIL_EDGE, THUMBNAIL_EDGE);
        let mut png = Cursor::new(Vec::new());
        preview.write_to(&mut png, ImageFormat::Png)?;
        Ok(format!(
            "data:image/png;base64,{}",
            STANDARD.encode(png.into_inner())
        ))
    }
}
