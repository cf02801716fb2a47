//! MJPEG feed
//!
//! Serves a live camera feed over HTTP as a never-ending sequence of JPEG images
//! using `multipart/x-mixed-replace` framing.
//!
//! # Architecture
//!
//! Each client request runs its own capture → encode → stream loop:
//!
//! 1. **Capture**: pull one `RawImage` from the process-wide frame source.
//! 2. **Encode**: convert it to an `EncodedFrame` (JPEG).
//! 3. **Frame**: wrap the JPEG as a multipart part under the connection's boundary.
//! 4. **Write**: send the part to the client and flush.
//!
//! Sessions do not share encoded output. The frame source is opened once at
//! startup and shared by all sessions behind a lock held only for capture.
//!
//! # Module Structure
//!
//! - `frame`: RawImage, EncodedFrame
//! - `ingest`: Frame sources (synthetic, V4L2) and the shared source handle
//! - `encode`: JPEG encoder
//! - `mjpeg`: Multipart wire framing
//! - `pipeline`: Per-session streaming loop
//! - `api`: HTTP endpoint controller
//! - `config`: Process configuration

pub mod api;
pub mod config;
pub mod encode;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod mjpeg;
pub mod pipeline;

pub use api::{ApiConfig, FeedHandle, FeedServer};
pub use config::FeedConfig;
pub use encode::{ImageJpegEncoder, JpegEncoder};
pub use error::{CaptureError, EncodeError, StartupError};
pub use frame::{EncodedFrame, PixelFormat, RawImage};
pub use ingest::{open_source, CaptureSettings, FrameSource, SharedSource, SyntheticSource};
pub use pipeline::{SessionEnd, SessionReport, StreamPipeline, StreamSession};
