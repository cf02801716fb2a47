//! HTTP endpoint controller.
//!
//! Routes:
//! - `GET /video_feed`: multipart/x-mixed-replace JPEG stream, one session per request
//! - `GET /health`: JSON status of the frame source and open sessions
//!
//! Each accepted connection is served on its own thread. A slow client only
//! throttles its own session; the shared frame source is locked per capture call.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::encode::JpegEncoder;
use crate::ingest::SharedSource;
use crate::mjpeg::{self, BOUNDARY};
use crate::pipeline::{StreamPipeline, StreamSession};

const MAX_REQUEST_BYTES: usize = 8192;
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(2);
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub const VIDEO_FEED_PATH: &str = "/video_feed";
pub const HEALTH_PATH: &str = "/health";

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:5000".to_string(),
        }
    }
}

/// Handle to a running server. Dropping it leaves the server running; call `stop`.
#[derive(Debug)]
pub struct FeedHandle {
    pub addr: SocketAddr,
    shared: Arc<ServerShared>,
    join: Option<JoinHandle<()>>,
}

impl FeedHandle {
    pub fn active_sessions(&self) -> usize {
        self.shared.active_sessions.load(Ordering::SeqCst)
    }

    /// Stop accepting connections. Open sessions end after their current frame.
    pub fn stop(mut self) -> Result<()> {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("feed server thread panicked"))?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct ServerShared {
    pipeline: StreamPipeline,
    shutdown: Arc<AtomicBool>,
    active_sessions: AtomicUsize,
    next_session_id: AtomicU64,
}

pub struct FeedServer {
    cfg: ApiConfig,
    pipeline: StreamPipeline,
}

impl FeedServer {
    pub fn new(cfg: ApiConfig, source: SharedSource, encoder: Arc<dyn JpegEncoder>) -> Self {
        Self {
            cfg,
            pipeline: StreamPipeline::new(source, encoder),
        }
    }

    pub fn spawn(self) -> Result<FeedHandle> {
        let configured_addr: SocketAddr = self
            .cfg
            .addr
            .parse()
            .with_context(|| format!("invalid listen address '{}'", self.cfg.addr))?;
        let listener = TcpListener::bind(configured_addr)
            .with_context(|| format!("bind {}", configured_addr))?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shared = Arc::new(ServerShared {
            pipeline: self.pipeline,
            shutdown: Arc::new(AtomicBool::new(false)),
            active_sessions: AtomicUsize::new(0),
            next_session_id: AtomicU64::new(1),
        });
        let shared_thread = shared.clone();
        let join = std::thread::Builder::new()
            .name("feed-accept".into())
            .spawn(move || {
                if let Err(err) = accept_loop(|| listener.accept(), shared_thread) {
                    log::error!("feed server stopped: {}", err);
                }
            })
            .context("spawn feed server thread")?;

        Ok(FeedHandle {
            addr,
            shared,
            join: Some(join),
        })
    }
}

/// Accept errors the listener cannot come back from. Other errors, such as
/// descriptor exhaustion, are retried.
fn is_fatal_accept_error(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::InvalidInput
}

fn accept_loop<A>(mut accept: A, shared: Arc<ServerShared>) -> Result<()>
where
    A: FnMut() -> std::io::Result<(TcpStream, SocketAddr)>,
{
    let mut accept_failing = false;
    loop {
        if shared.shutdown.load(Ordering::SeqCst) {
            break;
        }
        match accept() {
            Ok((stream, peer)) => {
                if accept_failing {
                    log::info!("accepting connections again");
                    accept_failing = false;
                }
                let shared = shared.clone();
                let spawned = std::thread::Builder::new()
                    .name(format!("feed-conn-{peer}"))
                    .spawn(move || {
                        if let Err(err) = handle_connection(stream, &shared) {
                            log::warn!("request from {} rejected: {}", peer, err);
                        }
                    });
                if let Err(err) = spawned {
                    log::warn!("could not spawn handler for {}: {}", peer, err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) if is_fatal_accept_error(&err) => return Err(err.into()),
            Err(err) => {
                // Only the first failure of a run is logged at warn.
                if accept_failing {
                    log::debug!("accept still failing: {}", err);
                } else {
                    log::warn!("accept failed, retrying: {}", err);
                    accept_failing = true;
                }
                std::thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, shared: &ServerShared) -> Result<()> {
    // Accepted sockets inherit non-blocking mode on some platforms.
    stream.set_nonblocking(false)?;

    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            write_json_response(&mut stream, 400, r#"{"error":"bad_request"}"#)?;
            return Err(err);
        }
    };
    if request.method != "GET" {
        write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#)?;
        return Ok(());
    }
    match request.path.as_str() {
        VIDEO_FEED_PATH => serve_video_feed(stream, shared),
        HEALTH_PATH => {
            let status = HealthStatus {
                status: "ok",
                source: shared.pipeline.source().name(),
                frames_captured: shared.pipeline.source().frames_captured(),
                active_sessions: shared.active_sessions.load(Ordering::SeqCst),
            };
            let payload = serde_json::to_vec(&status)?;
            write_response(&mut stream, 200, "application/json", &payload)
        }
        _ => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
    }
}

fn serve_video_feed(mut stream: TcpStream, shared: &ServerShared) -> Result<()> {
    let peer = stream.peer_addr()?;
    stream.set_read_timeout(None)?;
    stream.set_nodelay(true)?;

    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nCache-Control: no-cache, no-store, must-revalidate\r\nPragma: no-cache\r\nConnection: close\r\n\r\n",
        mjpeg::content_type(BOUNDARY)
    );
    if let Err(err) = stream.write_all(header.as_bytes()) {
        log::info!("client {} left before stream start: {}", peer, err);
        return Ok(());
    }

    let id = shared.next_session_id.fetch_add(1, Ordering::SeqCst);
    let _active = ActiveSession::enter(&shared.active_sessions);
    log::info!("session {}: streaming to {}", id, peer);

    let mut session =
        StreamSession::new(id, stream, BOUNDARY).with_shutdown(shared.shutdown.clone());
    let report = shared.pipeline.run(&mut session);
    log::debug!(
        "session {}: closed after {} frames ({})",
        id,
        report.frames_sent,
        report.end
    );

    let stream = session.into_sink();
    let _ = stream.shutdown(std::net::Shutdown::Both);
    Ok(())
}

/// Counts a session as open for as long as the guard lives.
struct ActiveSession<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> ActiveSession<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for ActiveSession<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Serialize)]
struct HealthStatus<'a> {
    status: &'a str,
    source: &'a str,
    frames_captured: u64,
    active_sessions: usize,
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(REQUEST_READ_TIMEOUT))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    parse_request(&data)
}

fn parse_request(data: &[u8]) -> Result<HttpRequest> {
    let text = String::from_utf8_lossy(data);
    let request_line = text
        .split("\r\n")
        .next()
        .filter(|line| !line.is_empty())
        .ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
struct HttpRequest {
    method: String,
    path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_line_and_drops_query() {
        let request =
            parse_request(b"GET /video_feed?quality=high HTTP/1.1\r\nHost: cam\r\n\r\n").unwrap();
        assert_eq!(
            request,
            HttpRequest {
                method: "GET".to_string(),
                path: "/video_feed".to_string(),
            }
        );
    }

    #[test]
    fn rejects_empty_or_truncated_request() {
        assert!(parse_request(b"").is_err());
        assert!(parse_request(b"GET\r\n\r\n").is_err());
    }

    fn test_shared() -> Arc<ServerShared> {
        use crate::encode::ImageJpegEncoder;
        use crate::ingest::SyntheticSource;

        let source = SharedSource::new(Box::new(SyntheticSource::new("stub://accept", 8, 8)));
        Arc::new(ServerShared {
            pipeline: StreamPipeline::new(source, Arc::new(ImageJpegEncoder::default())),
            shutdown: Arc::new(AtomicBool::new(false)),
            active_sessions: AtomicUsize::new(0),
            next_session_id: AtomicU64::new(1),
        })
    }

    #[test]
    fn accept_loop_survives_descriptor_exhaustion() {
        const EMFILE: i32 = 24;
        const ENFILE: i32 = 23;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        listener.set_nonblocking(true).unwrap();

        let shared = test_shared();
        let loop_shared = shared.clone();
        let worker = std::thread::spawn(move || {
            let mut injected = vec![
                std::io::Error::from_raw_os_error(EMFILE),
                std::io::Error::from_raw_os_error(ENFILE),
                std::io::Error::from(std::io::ErrorKind::ConnectionAborted),
                std::io::Error::from_raw_os_error(EMFILE),
            ];
            accept_loop(
                move || match injected.pop() {
                    Some(err) => Err(err),
                    None => listener.accept(),
                },
                loop_shared,
            )
        });

        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains(r#""source":"stub://accept""#));

        shared.shutdown.store(true, Ordering::SeqCst);
        worker.join().unwrap().unwrap();
    }

    #[test]
    fn accept_loop_returns_on_unrecoverable_error() {
        let shared = test_shared();
        let result = accept_loop(
            || Err(std::io::Error::from(std::io::ErrorKind::InvalidInput)),
            shared,
        );
        assert!(result.is_err());
    }

    #[test]
    fn active_session_guard_tracks_count() {
        let counter = AtomicUsize::new(0);
        {
            let _a = ActiveSession::enter(&counter);
            let _b = ActiveSession::enter(&counter);
            assert_eq!(counter.load(Ordering::SeqCst), 2);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
