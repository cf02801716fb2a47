//! In-memory frame types.
//!
//! - `RawImage`: pixel buffer produced by a frame source, handed by value to the encoder.
//! - `EncodedFrame`: a complete JPEG image, owned by the pipeline iteration that produced it.
//!
//! Neither type implements `Clone`. A raw image is consumed exactly once and its pixel
//! bytes are zeroized when it is dropped.

use zeroize::Zeroize;

use crate::error::CaptureError;

/// Pixel layout of a `RawImage`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    /// Interleaved 8-bit RGB.
    Rgb8,
    /// Single 8-bit luma channel.
    Gray8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Gray8 => 1,
        }
    }

    /// Buffer length required for a `width` x `height` image in this format.
    pub fn expected_len(self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_pixel()
    }
}

// ----------------------------------------------------------------------------
// RawImage
// ----------------------------------------------------------------------------

/// One captured frame. Pixel bytes are private; the encoder reads them through
/// `pixels()` and takes ownership of the image.
pub struct RawImage {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl RawImage {
    /// Wrap a captured buffer, rejecting buffers whose length does not match the
    /// declared geometry.
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Self, CaptureError> {
        let expected = format.expected_len(width, height);
        if data.len() != expected {
            return Err(CaptureError::MalformedFrame {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            format,
        })
    }

    /// Copy a row-padded buffer into a tightly packed image. `stride` is the
    /// length in bytes of one row in `buffer`, padding included.
    pub fn from_strided(
        buffer: &[u8],
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
    ) -> Result<Self, CaptureError> {
        let row = width as usize * format.bytes_per_pixel();
        let expected = format.expected_len(width, height);
        let needed = match height as usize {
            0 => 0,
            rows => stride * (rows - 1) + row,
        };
        if stride < row || buffer.len() < needed {
            return Err(CaptureError::MalformedFrame {
                width,
                height,
                expected,
                actual: buffer.len(),
            });
        }
        if stride == row {
            return Self::new(buffer[..expected].to_vec(), width, height, format);
        }

        let mut data = Vec::with_capacity(expected);
        for line in buffer.chunks(stride).take(height as usize) {
            data.extend_from_slice(&line[..row]);
        }
        Self::new(data, width, height, format)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for RawImage {
    // Pixel content stays out of logs.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl Drop for RawImage {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

// ----------------------------------------------------------------------------
// EncodedFrame
// ----------------------------------------------------------------------------

/// Immutable JPEG bytes for one frame.
#[derive(Debug)]
pub struct EncodedFrame {
    jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl EncodedFrame {
    pub fn new(jpeg: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            jpeg,
            width,
            height,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.jpeg
    }

    pub fn len(&self) -> usize {
        self.jpeg.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jpeg.is_empty()
    }
}

/// Locate the first SOI..EOI span in `buffer`, returning `(start, end)` with `end`
/// one past the EOI marker.
pub fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let end = buffer[start + 2..]
        .windows(2)
        .position(|w| w == [0xFF, 0xD9])?;
    Some((start, start + 2 + end + 2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_image_rejects_mismatched_buffer() {
        let err = RawImage::new(vec![0u8; 10], 4, 4, PixelFormat::Rgb8).unwrap_err();
        match err {
            CaptureError::MalformedFrame {
                expected, actual, ..
            } => {
                assert_eq!(expected, 48);
                assert_eq!(actual, 10);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn raw_image_accepts_gray_buffer() {
        let image = RawImage::new(vec![7u8; 16], 4, 4, PixelFormat::Gray8).unwrap();
        assert_eq!(image.pixels().len(), 16);
        assert!(!format!("{image:?}").contains("[7"));
    }

    #[test]
    fn strided_buffer_drops_row_padding() {
        // 2x3 RGB rows of 6 bytes, each padded to 8.
        let mut buffer = Vec::new();
        for row in 0..3u8 {
            buffer.extend_from_slice(&[row; 6]);
            buffer.extend_from_slice(&[0xEE; 2]);
        }
        let image = RawImage::from_strided(&buffer, 2, 3, 8, PixelFormat::Rgb8).unwrap();
        assert_eq!(image.pixels().len(), 18);
        assert_eq!(&image.pixels()[..6], &[0; 6]);
        assert_eq!(&image.pixels()[6..12], &[1; 6]);
        assert_eq!(&image.pixels()[12..], &[2; 6]);
        assert!(!image.pixels().contains(&0xEE));
    }

    #[test]
    fn strided_buffer_without_padding_is_copied_as_is() {
        let buffer: Vec<u8> = (0..16).collect();
        let image = RawImage::from_strided(&buffer, 4, 4, 4, PixelFormat::Gray8).unwrap();
        assert_eq!(image.pixels(), buffer.as_slice());
    }

    #[test]
    fn strided_buffer_last_row_may_omit_padding() {
        let mut buffer = vec![1u8; 4];
        buffer.extend_from_slice(&[0xEE; 2]);
        buffer.extend_from_slice(&[2u8; 4]);
        let image = RawImage::from_strided(&buffer, 4, 2, 6, PixelFormat::Gray8).unwrap();
        assert_eq!(image.pixels(), &[1, 1, 1, 1, 2, 2, 2, 2]);
    }

    #[test]
    fn strided_buffer_rejects_short_buffer_or_stride() {
        let short = RawImage::from_strided(&[0u8; 19], 4, 3, 8, PixelFormat::Gray8);
        assert!(matches!(short, Err(CaptureError::MalformedFrame { .. })));

        let narrow = RawImage::from_strided(&[0u8; 48], 4, 4, 8, PixelFormat::Rgb8);
        assert!(matches!(narrow, Err(CaptureError::MalformedFrame { .. })));
    }

    #[test]
    fn jpeg_bounds_span_soi_to_eoi() {
        let buf = [0x00, 0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9, 0x33];
        assert_eq!(find_jpeg_bounds(&buf), Some((1, 7)));
        assert_eq!(find_jpeg_bounds(&[0xFF, 0xD8, 0x00]), None);
    }
}
