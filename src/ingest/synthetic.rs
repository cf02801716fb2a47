//! Synthetic frame source for `stub://` devices.
//!
//! Produces a moving RGB gradient at the configured resolution. The stub URL may
//! carry `?fail_after=N`, after which every capture reports `NoFrame`; this
//! exercises the capture-failure path without hardware.

use crate::error::{CaptureError, StartupError};
use crate::frame::{PixelFormat, RawImage};

use super::{CaptureSettings, FrameSource};

pub struct SyntheticSource {
    name: String,
    width: u32,
    height: u32,
    frame_count: u64,
    fail_after: Option<u64>,
}

impl SyntheticSource {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            frame_count: 0,
            fail_after: None,
        }
    }

    /// Stop producing frames once `frames` have been captured.
    pub fn with_fail_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }

    pub fn from_settings(settings: &CaptureSettings) -> Result<Self, StartupError> {
        let invalid = |reason: String| StartupError::InvalidStub {
            url: settings.device.clone(),
            reason,
        };
        if settings.width == 0 || settings.height == 0 {
            return Err(invalid(format!(
                "resolution {}x{} has no pixels",
                settings.width, settings.height
            )));
        }

        let (name, query) = match settings.device.split_once('?') {
            Some((name, query)) => (name, Some(query)),
            None => (settings.device.as_str(), None),
        };
        let mut source = Self::new(name, settings.width, settings.height);
        for pair in query.into_iter().flat_map(|q| q.split('&')) {
            match pair.split_once('=') {
                Some(("fail_after", value)) => {
                    let frames = value
                        .parse()
                        .map_err(|_| invalid(format!("fail_after '{value}' is not a count")))?;
                    source = source.with_fail_after(frames);
                }
                _ => return Err(invalid(format!("unknown parameter '{pair}'"))),
            }
        }
        Ok(source)
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let shift = self.frame_count as usize;
        let mut pixels = Vec::with_capacity(PixelFormat::Rgb8.expected_len(self.width, self.height));
        for y in 0..self.height as usize {
            for x in 0..self.width as usize {
                pixels.push(((x + shift) % 256) as u8);
                pixels.push(((y + shift) % 256) as u8);
                pixels.push(((x + y) % 256) as u8);
            }
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<RawImage, CaptureError> {
        if let Some(limit) = self.fail_after {
            if self.frame_count >= limit {
                return Err(CaptureError::NoFrame {
                    source_name: self.name.clone(),
                });
            }
        }
        let pixels = self.generate_pixels();
        self.frame_count += 1;
        RawImage::new(pixels, self.width, self.height, PixelFormat::Rgb8)
    }

    fn describe(&self) -> String {
        self.name.clone()
    }

    fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(device: &str) -> CaptureSettings {
        CaptureSettings {
            device: device.to_string(),
            width: 640,
            height: 480,
        }
    }

    #[test]
    fn synthetic_source_produces_frames_at_configured_size() {
        let mut source = SyntheticSource::from_settings(&settings("stub://cam")).unwrap();
        let image = source.next_frame().unwrap();
        assert_eq!((image.width, image.height), (640, 480));
        assert_eq!(image.format, PixelFormat::Rgb8);
        assert_eq!(image.pixels().len(), 640 * 480 * 3);
        assert_eq!(source.frames_captured(), 1);
    }

    #[test]
    fn synthetic_frames_change_between_calls() {
        let mut source = SyntheticSource::new("stub://cam", 16, 16);
        let first = source.next_frame().unwrap();
        let second = source.next_frame().unwrap();
        assert_ne!(first.pixels(), second.pixels());
    }

    #[test]
    fn fail_after_stops_capture() {
        let mut source =
            SyntheticSource::from_settings(&settings("stub://cam?fail_after=2")).unwrap();
        assert_eq!(source.describe(), "stub://cam");
        assert!(source.next_frame().is_ok());
        assert!(source.next_frame().is_ok());
        assert!(matches!(
            source.next_frame(),
            Err(CaptureError::NoFrame { .. })
        ));
        assert!(source.next_frame().is_err());
        assert_eq!(source.frames_captured(), 2);
    }

    #[test]
    fn rejects_bad_stub_parameters() {
        assert!(matches!(
            SyntheticSource::from_settings(&settings("stub://cam?fail_after=x")),
            Err(StartupError::InvalidStub { .. })
        ));
        assert!(matches!(
            SyntheticSource::from_settings(&settings("stub://cam?fps=3")),
            Err(StartupError::InvalidStub { .. })
        ));
        let mut zero = settings("stub://cam");
        zero.width = 0;
        assert!(SyntheticSource::from_settings(&zero).is_err());
    }
}
