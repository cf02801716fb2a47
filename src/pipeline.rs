//! Streaming pipeline.
//!
//! One `StreamSession` per connected client. `StreamPipeline::run` pulls a frame
//! from the shared source, encodes it, frames it as a multipart part and writes it
//! to the session sink, repeating until the client goes away or capture/encode
//! fails. There is no pacing: the loop runs as fast as its slowest stage.
//!
//! Failure handling:
//! - Capture or encode errors are logged once at error level and end the session.
//!   They are not retried, since a fault there is likely shared by all sessions.
//! - A failed write or flush means the client disconnected. That is the normal end
//!   of a stream and is logged at info level.
//!
//! Nothing propagates past `run`; the caller gets a `SessionReport`.

use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::encode::JpegEncoder;
use crate::error::{CaptureError, EncodeError};
use crate::ingest::SharedSource;
use crate::mjpeg::MultipartChunk;

/// One client's open stream.
pub struct StreamSession<W: Write> {
    id: u64,
    sink: W,
    boundary: String,
    alive: bool,
    frames_sent: u64,
    shutdown: Option<Arc<AtomicBool>>,
}

impl<W: Write> StreamSession<W> {
    pub fn new(id: u64, sink: W, boundary: impl Into<String>) -> Self {
        Self {
            id,
            sink,
            boundary: boundary.into(),
            alive: true,
            frames_sent: 0,
            shutdown: None,
        }
    }

    /// End the session at the next iteration once `flag` is set.
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(flag);
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn is_alive(&self) -> bool {
        self.alive
            && !self
                .shutdown
                .as_ref()
                .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    pub fn sink(&self) -> &W {
        &self.sink
    }

    pub fn into_sink(self) -> W {
        self.sink
    }

    fn send(&mut self, payload: &[u8]) -> io::Result<()> {
        MultipartChunk::new(&self.boundary, payload).write_to(&mut self.sink)?;
        self.sink.flush()?;
        self.frames_sent += 1;
        Ok(())
    }
}

/// Why a session stopped.
#[derive(Debug)]
pub enum SessionEnd {
    /// Writing to the client failed; the client is gone.
    ClientDisconnected(io::Error),
    CaptureFailed(CaptureError),
    EncodeFailed(EncodeError),
    /// The server is shutting down.
    Stopped,
}

impl SessionEnd {
    /// Capture and encode failures are faults; everything else is a normal end.
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            SessionEnd::CaptureFailed(_) | SessionEnd::EncodeFailed(_)
        )
    }
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::ClientDisconnected(err) => write!(f, "client disconnected ({err})"),
            SessionEnd::CaptureFailed(err) => write!(f, "capture failed: {err}"),
            SessionEnd::EncodeFailed(err) => write!(f, "encode failed: {err}"),
            SessionEnd::Stopped => f.write_str("server stopping"),
        }
    }
}

#[derive(Debug)]
pub struct SessionReport {
    pub frames_sent: u64,
    pub end: SessionEnd,
}

/// Capture → encode → frame → write loop shared by all sessions.
#[derive(Clone)]
pub struct StreamPipeline {
    source: SharedSource,
    encoder: Arc<dyn JpegEncoder>,
}

impl StreamPipeline {
    pub fn new(source: SharedSource, encoder: Arc<dyn JpegEncoder>) -> Self {
        Self { source, encoder }
    }

    pub fn source(&self) -> &SharedSource {
        &self.source
    }

    /// Stream frames into `session` until it ends. The session is not alive on
    /// return and its sink receives no further writes.
    pub fn run<W: Write>(&self, session: &mut StreamSession<W>) -> SessionReport {
        let end = self.stream(session);
        session.alive = false;

        match &end {
            SessionEnd::CaptureFailed(err) => {
                log::error!("session {}: frame capture failed: {}", session.id, err)
            }
            SessionEnd::EncodeFailed(err) => {
                log::error!("session {}: jpeg encode failed: {}", session.id, err)
            }
            SessionEnd::ClientDisconnected(err) => log::info!(
                "session {}: client disconnected after {} frames ({})",
                session.id,
                session.frames_sent,
                err
            ),
            SessionEnd::Stopped => log::info!(
                "session {}: stopped after {} frames",
                session.id,
                session.frames_sent
            ),
        }

        SessionReport {
            frames_sent: session.frames_sent,
            end,
        }
    }

    fn stream<W: Write>(&self, session: &mut StreamSession<W>) -> SessionEnd {
        while session.is_alive() {
            let image = match self.source.next_frame() {
                Ok(image) => image,
                Err(err) => return SessionEnd::CaptureFailed(err),
            };
            let frame = match self.encoder.encode(image) {
                Ok(frame) => frame,
                Err(err) => return SessionEnd::EncodeFailed(err),
            };
            if let Err(err) = session.send(frame.as_bytes()) {
                return SessionEnd::ClientDisconnected(err);
            }
        }
        SessionEnd::Stopped
    }
}

impl fmt::Debug for StreamPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamPipeline")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}
