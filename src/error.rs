//! Error taxonomy for the capture → encode → stream pipeline.
//!
//! Capture and encode failures end the session that observed them. A failed
//! write to the client is not an error type here: it is the ordinary way a
//! session ends and is reported through `pipeline::SessionEnd`.

use thiserror::Error;

/// The frame source failed to produce a frame.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no frame available from {source_name}")]
    NoFrame { source_name: String },

    #[error("capture device fault: {0}")]
    Device(String),

    #[error("frame buffer is {actual} bytes, expected {expected} for {width}x{height}")]
    MalformedFrame {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("frame source lock poisoned by a panicked session")]
    SourcePoisoned,
}

/// A raw image could not be converted to JPEG.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("cannot encode an empty {width}x{height} image")]
    EmptyImage { width: u32, height: u32 },

    #[error("jpeg encoder failed: {0}")]
    Jpeg(#[from] image::ImageError),
}

/// The frame source could not be brought up at process start.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("unsupported capture device '{0}' (build with feature `ingest-v4l2` for device paths)")]
    UnsupportedDevice(String),

    #[error("invalid stub source '{url}': {reason}")]
    InvalidStub { url: String, reason: String },

    #[error("capture device {device} negotiated unsupported pixel format {fourcc}")]
    UnsupportedFormat { device: String, fourcc: String },

    #[error("failed to open capture device {device}")]
    Device {
        device: String,
        #[source]
        source: std::io::Error,
    },
}
