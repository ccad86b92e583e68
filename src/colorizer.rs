//! Pixel recoloring.
//!
//! The gateway treats recoloring as an opaque buffer-to-buffer step behind the
//! [`Recolor`] trait. The shipped implementation rotates every pixel's hue and
//! re-encodes the image in the format it arrived in.

use image::ImageFormat;
use std::io::Cursor;
use thiserror::Error;

/// Errors raised while recoloring an image
#[derive(Debug, Error)]
pub enum ColorizeError {
    #[error("unrecognized image format")]
    UnknownFormat,

    #[error("unsupported image format: {0:?}")]
    UnsupportedFormat(ImageFormat),

    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),
}

/// Buffer-to-buffer pixel transform.
///
/// Implementations are CPU-bound and are driven from a blocking worker.
pub trait Recolor: Send + Sync {
    fn recolor(&self, image: &[u8]) -> Result<Vec<u8>, ColorizeError>;
}

/// Rotates the hue of every pixel by a fixed number of degrees.
#[derive(Debug, Clone, Copy)]
pub struct HueRotate {
    degrees: i32,
}

impl HueRotate {
    pub fn new(degrees: i32) -> Self {
        Self { degrees }
    }
}

impl Recolor for HueRotate {
    fn recolor(&self, data: &[u8]) -> Result<Vec<u8>, ColorizeError> {
        let format = image::guess_format(data).map_err(|_| ColorizeError::UnknownFormat)?;
        if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg) {
            return Err(ColorizeError::UnsupportedFormat(format));
        }

        let decoded =
            image::load_from_memory_with_format(data, format).map_err(ColorizeError::Decode)?;
        let rotated = decoded.huerotate(self.degrees);

        let mut out = Cursor::new(Vec::with_capacity(data.len()));
        rotated
            .write_to(&mut out, format)
            .map_err(ColorizeError::Encode)?;
        Ok(out.into_inner())
    }
}
