//! Frame ingestion sources.
//!
//! This module provides the sources of raw frames for the stream:
//! - Synthetic source for `stub://` devices (testing, demos)
//! - USB/V4L2 devices (feature: ingest-v4l2)
//!
//! A source is opened once at process start and then shared by every streaming
//! session through `SharedSource`, which serializes capture calls. Sessions hold
//! the lock only for the duration of one `next_frame` call; encoding and writing
//! run outside it.
//!
//! Sources make no timing guarantees. They return frames as fast as the device
//! produces them, with no internal buffering or rate smoothing.

pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use std::sync::{Arc, Mutex};

use crate::error::{CaptureError, StartupError};
use crate::frame::RawImage;

pub use synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

/// Capture parameters fixed for the lifetime of the process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureSettings {
    /// Device path (e.g. "/dev/video0") or `stub://<name>` for a synthetic source.
    pub device: String,
    pub width: u32,
    pub height: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
        }
    }
}

/// A started capture device producing one frame per call.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<RawImage, CaptureError>;

    /// Human-readable identity for logs and health output.
    fn describe(&self) -> String;

    fn frames_captured(&self) -> u64;
}

/// Open and start the source named by `settings.device`.
pub fn open_source(settings: &CaptureSettings) -> Result<Box<dyn FrameSource>, StartupError> {
    if settings.device.starts_with("stub://") {
        let source = SyntheticSource::from_settings(settings)?;
        log::info!("frame source: {} (synthetic)", source.describe());
        return Ok(Box::new(source));
    }
    open_device(settings)
}

#[cfg(feature = "ingest-v4l2")]
fn open_device(settings: &CaptureSettings) -> Result<Box<dyn FrameSource>, StartupError> {
    Ok(Box::new(V4l2Source::open(settings)?))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_device(settings: &CaptureSettings) -> Result<Box<dyn FrameSource>, StartupError> {
    Err(StartupError::UnsupportedDevice(settings.device.clone()))
}

/// Process-wide handle to the single frame source.
///
/// Cloning is cheap; every clone refers to the same device.
#[derive(Clone)]
pub struct SharedSource {
    inner: Arc<Mutex<Box<dyn FrameSource>>>,
    name: Arc<str>,
}

impl SharedSource {
    pub fn new(source: Box<dyn FrameSource>) -> Self {
        let name: Arc<str> = source.describe().into();
        Self {
            inner: Arc::new(Mutex::new(source)),
            name,
        }
    }

    /// Capture one frame. Concurrent callers are serialized.
    pub fn next_frame(&self) -> Result<RawImage, CaptureError> {
        let mut source = self
            .inner
            .lock()
            .map_err(|_| CaptureError::SourcePoisoned)?;
        source.next_frame()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frames_captured(&self) -> u64 {
        match self.inner.lock() {
            Ok(source) => source.frames_captured(),
            Err(poisoned) => poisoned.into_inner().frames_captured(),
        }
    }
}

impl std::fmt::Debug for SharedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSource")
            .field("name", &self.name)
            .finish()
    }
}
