//! feedd - MJPEG camera feed daemon
//!
//! This daemon:
//! 1. Opens and starts the configured frame source (once, before serving)
//! 2. Serves `GET /video_feed` as a multipart/x-mixed-replace JPEG stream
//! 3. Stops accepting connections on Ctrl-C

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};

use mjpeg_feed::{
    api::VIDEO_FEED_PATH, open_source, ApiConfig, FeedConfig, FeedHandle, FeedServer,
    ImageJpegEncoder, SharedSource,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Serve a live camera feed as MJPEG over HTTP")]
struct Args {
    /// JSON or TOML config file.
    #[arg(long, env = "FEED_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address (overrides config).
    #[arg(long)]
    addr: Option<String>,

    /// Capture device path, or stub://<name> for a synthetic source (overrides config).
    #[arg(long)]
    device: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let handle = match start(args) {
        Ok(handle) => handle,
        Err(err) => {
            log::error!("startup failed: {:#}", err);
            return Err(err);
        }
    };

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;

    let _ = rx.recv();
    log::info!(
        "shutdown signal received, stopping feed server ({} open sessions)",
        handle.active_sessions()
    );
    handle.stop()?;

    Ok(())
}

/// Load config, open the frame source and bind the listener. Any error here is
/// fatal and nothing has been served yet.
fn start(args: Args) -> Result<FeedHandle> {
    let mut config = FeedConfig::load_from(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        config.addr = addr;
    }
    if let Some(device) = args.device {
        config.capture.device = device;
    }
    config.validate()?;

    let source = SharedSource::new(
        open_source(&config.capture).context("frame source startup failed")?,
    );
    let encoder = Arc::new(ImageJpegEncoder::new(config.jpeg_quality));

    let api_config = ApiConfig {
        addr: config.addr.clone(),
    };
    let handle = FeedServer::new(api_config, source.clone(), encoder).spawn()?;
    log::info!(
        "feedd {} serving http://{}{} from {} at {}x{} (jpeg quality {})",
        env!("CARGO_PKG_VERSION"),
        handle.addr,
        VIDEO_FEED_PATH,
        source.name(),
        config.capture.width,
        config.capture.height,
        config.jpeg_quality
    );
    Ok(handle)
}
