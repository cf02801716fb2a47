use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

use crate::encode::DEFAULT_JPEG_QUALITY;
use crate::ingest::CaptureSettings;

const DEFAULT_ADDR: &str = "0.0.0.0:5000";
const DEFAULT_DEVICE: &str = "/dev/video0";
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FeedConfigFile {
    addr: Option<String>,
    capture: Option<CaptureConfigFile>,
    jpeg: Option<JpegConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CaptureConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct JpegConfigFile {
    quality: Option<u8>,
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub addr: String,
    pub capture: CaptureSettings,
    pub jpeg_quality: u8,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            capture: CaptureSettings {
                device: DEFAULT_DEVICE.to_string(),
                width: DEFAULT_WIDTH,
                height: DEFAULT_HEIGHT,
            },
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl FeedConfig {
    /// Defaults, then the file named by `FEED_CONFIG`, then `FEED_*` overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("FEED_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Like `load`, but with an explicit config file instead of `FEED_CONFIG`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => FeedConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: FeedConfigFile) -> Self {
        let defaults = Self::default();
        let capture = file.capture.unwrap_or_default();
        Self {
            addr: file.addr.unwrap_or(defaults.addr),
            capture: CaptureSettings {
                device: capture.device.unwrap_or(defaults.capture.device),
                width: capture.width.unwrap_or(defaults.capture.width),
                height: capture.height.unwrap_or(defaults.capture.height),
            },
            jpeg_quality: file
                .jpeg
                .and_then(|jpeg| jpeg.quality)
                .unwrap_or(defaults.jpeg_quality),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = env_nonempty("FEED_ADDR") {
            self.addr = addr;
        }
        if let Some(device) = env_nonempty("FEED_DEVICE") {
            self.capture.device = device;
        }
        if let Some(width) = env_nonempty("FEED_WIDTH") {
            self.capture.width = width
                .parse()
                .map_err(|_| anyhow!("FEED_WIDTH must be a pixel count"))?;
        }
        if let Some(height) = env_nonempty("FEED_HEIGHT") {
            self.capture.height = height
                .parse()
                .map_err(|_| anyhow!("FEED_HEIGHT must be a pixel count"))?;
        }
        if let Some(quality) = env_nonempty("FEED_JPEG_QUALITY") {
            self.jpeg_quality = quality
                .parse()
                .map_err(|_| anyhow!("FEED_JPEG_QUALITY must be an integer in 1..=100"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.addr
            .parse::<SocketAddr>()
            .map_err(|e| anyhow!("invalid listen address '{}': {}", self.addr, e))?;
        if self.capture.device.trim().is_empty() {
            return Err(anyhow!("capture device must not be empty"));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(anyhow!(
                "capture resolution must be non-zero, got {}x{}",
                self.capture.width,
                self.capture.height
            ));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(anyhow!(
                "jpeg quality must be in 1..=100, got {}",
                self.jpeg_quality
            ));
        }
        Ok(())
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<FeedConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
