//! JPEG encoding stage.

use image::codecs::jpeg::JpegEncoder as ImageCrateJpegEncoder;
use image::ExtendedColorType;

use crate::error::EncodeError;
use crate::frame::{EncodedFrame, PixelFormat, RawImage};

pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Converts a captured image into a JPEG. Shared by every session, so
/// implementations must be usable from several threads at once.
pub trait JpegEncoder: Send + Sync {
    fn encode(&self, image: RawImage) -> Result<EncodedFrame, EncodeError>;
}

/// Baseline JPEG encoder backed by the `image` crate.
#[derive(Clone, Debug)]
pub struct ImageJpegEncoder {
    quality: u8,
}

impl ImageJpegEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl Default for ImageJpegEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl JpegEncoder for ImageJpegEncoder {
    fn encode(&self, image: RawImage) -> Result<EncodedFrame, EncodeError> {
        if image.width == 0 || image.height == 0 || image.is_empty() {
            return Err(EncodeError::EmptyImage {
                width: image.width,
                height: image.height,
            });
        }
        let color = match image.format {
            PixelFormat::Rgb8 => ExtendedColorType::Rgb8,
            PixelFormat::Gray8 => ExtendedColorType::L8,
        };

        // Rough upper bound for a typical frame; avoids regrowth in the hot loop.
        let mut jpeg = Vec::with_capacity(image.pixels().len() / 4);
        ImageCrateJpegEncoder::new_with_quality(&mut jpeg, self.quality).encode(
            image.pixels(),
            image.width,
            image.height,
            color,
        )?;
        Ok(EncodedFrame::new(jpeg, image.width, image.height))
    }
}
