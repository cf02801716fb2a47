//! V4L2 frame source.
//!
//! This module provides `V4l2Source` for capturing frames from local V4L2 devices.
//!
//! The device is opened, configured and started once in `V4l2Source::open`, then
//! stays streaming for the life of the process. Each `next_frame` call dequeues
//! one memory-mapped buffer and copies it into a `RawImage`, dropping any row
//! padding the driver adds.

use ouroboros::self_referencing;

use crate::error::{CaptureError, StartupError};
use crate::frame::{PixelFormat, RawImage};

use super::{CaptureSettings, FrameSource};

const MMAP_BUFFERS: u32 = 4;

pub struct V4l2Source {
    device_path: String,
    state: DeviceState,
    format: PixelFormat,
    width: u32,
    height: u32,
    /// Bytes per row in the driver's buffers.
    stride: usize,
    frame_count: u64,
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Source {
    pub fn open(settings: &CaptureSettings) -> Result<Self, StartupError> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let device_err = |source: std::io::Error| StartupError::Device {
            device: settings.device.clone(),
            source,
        };

        let device = v4l::Device::with_path(&settings.device).map_err(device_err)?;
        let mut format = device.format().map_err(device_err)?;
        format.width = settings.width;
        format.height = settings.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Source: failed to set RGB3 {}x{} on {}: {}",
                    settings.width,
                    settings.height,
                    settings.device,
                    err
                );
                device.format().map_err(device_err)?
            }
        };

        let pixel_format = match &format.fourcc.repr {
            b"RGB3" => PixelFormat::Rgb8,
            b"GREY" => PixelFormat::Gray8,
            _ => {
                return Err(StartupError::UnsupportedFormat {
                    device: settings.device.clone(),
                    fourcc: format.fourcc.to_string(),
                })
            }
        };
        if format.width != settings.width || format.height != settings.height {
            log::warn!(
                "V4l2Source: {} negotiated {}x{} instead of {}x{}",
                settings.device,
                format.width,
                format.height,
                settings.width,
                settings.height
            );
        }

        let state = DeviceStateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, MMAP_BUFFERS)
            },
        }
        .try_build()
        .map_err(device_err)?;

        log::info!(
            "V4l2Source: streaming from {} ({}x{} {:?}, {} bytes per row)",
            settings.device,
            format.width,
            format.height,
            pixel_format,
            format.stride
        );

        Ok(Self {
            device_path: settings.device.clone(),
            state,
            format: pixel_format,
            width: format.width,
            height: format.height,
            stride: format.stride as usize,
            frame_count: 0,
        })
    }
}

impl FrameSource for V4l2Source {
    fn next_frame(&mut self) -> Result<RawImage, CaptureError> {
        use v4l::io::traits::CaptureStream;

        let (width, height, format) = (self.width, self.height, self.format);
        // Some drivers report a zero stride for packed formats.
        let stride = match self.stride {
            0 => width as usize * format.bytes_per_pixel(),
            stride => stride,
        };
        let image = self
            .state
            .with_stream_mut(|stream| {
                stream
                    .next()
                    .map(|(buf, _meta)| RawImage::from_strided(buf, width, height, stride, format))
            })
            .map_err(|err| CaptureError::Device(format!("{}: {}", self.device_path, err)))??;

        self.frame_count += 1;
        Ok(image)
    }

    fn describe(&self) -> String {
        self.device_path.clone()
    }

    fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}
