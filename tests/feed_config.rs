use std::io::Write;
use std::sync::Mutex;

use tempfile::{Builder, NamedTempFile};

use mjpeg_feed::config::FeedConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "FEED_CONFIG",
        "FEED_ADDR",
        "FEED_DEVICE",
        "FEED_WIDTH",
        "FEED_HEIGHT",
        "FEED_JPEG_QUALITY",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = FeedConfig::load().expect("load config");
    assert_eq!(cfg.addr, "0.0.0.0:5000");
    assert_eq!(cfg.capture.device, "/dev/video0");
    assert_eq!((cfg.capture.width, cfg.capture.height), (640, 480));
    assert_eq!(cfg.jpeg_quality, 80);
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "addr": "127.0.0.1:8081",
        "capture": {
            "device": "/dev/video2",
            "width": 1280,
            "height": 720
        },
        "jpeg": { "quality": 65 }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("FEED_CONFIG", file.path());
    std::env::set_var("FEED_DEVICE", "stub://bench");
    std::env::set_var("FEED_HEIGHT", "600");

    let cfg = FeedConfig::load().expect("load config");
    assert_eq!(cfg.addr, "127.0.0.1:8081");
    assert_eq!(cfg.capture.device, "stub://bench");
    assert_eq!(cfg.capture.width, 1280);
    assert_eq!(cfg.capture.height, 600);
    assert_eq!(cfg.jpeg_quality, 65);

    clear_env();
}

#[test]
fn loads_toml_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
addr = "0.0.0.0:9000"

[capture]
device = "stub://porch"
width = 320
height = 240
"#;
    file.write_all(toml.as_bytes()).expect("write config");

    let cfg = FeedConfig::load_from(Some(file.path())).expect("load config");
    assert_eq!(cfg.addr, "0.0.0.0:9000");
    assert_eq!(cfg.capture.device, "stub://porch");
    assert_eq!((cfg.capture.width, cfg.capture.height), (320, 240));
    assert_eq!(cfg.jpeg_quality, 80);
}

#[test]
fn rejects_invalid_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("FEED_WIDTH", "wide");
    assert!(FeedConfig::load().is_err());
    clear_env();

    std::env::set_var("FEED_JPEG_QUALITY", "101");
    assert!(FeedConfig::load().is_err());
    clear_env();

    std::env::set_var("FEED_ADDR", "not-an-address");
    assert!(FeedConfig::load().is_err());
    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().expect("temp dir");
    let missing = dir.path().join("absent.json");
    let err = FeedConfig::load_from(Some(&missing)).unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));
}
