use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use stream_sentinel::config::{BackendKind, SentinelConfig};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SENTINEL_CONFIG",
        "SENTINEL_SOURCE",
        "SENTINEL_LOOP",
        "SENTINEL_FRAME_SKIP",
        "SENTINEL_ALERT_ADDR",
        "SENTINEL_CONFIDENCE",
    ] {
        std::env::remove_var(key);
    }
}

fn config_file(suffix: &str, contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(
        ".json",
        r#"{
            "source": {
                "default": "rtsp://camera-1/live",
                "loop_on_end": true,
                "frame_skip": 1
            },
            "stream": { "jpeg_quality": 80 },
            "alert": {
                "addr": "127.0.0.1:7000",
                "threshold": 3,
                "jpeg_quality": 60,
                "width": 320,
                "height": 240,
                "connect_timeout_ms": 250
            },
            "detection": {
                "confidence": 0.5,
                "image_size": 640,
                "categories": [
                    {
                        "name": "restricted-item",
                        "backend": "stub",
                        "stub_pattern": [true, false]
                    },
                    {
                        "name": "missing-safety-gear",
                        "model": "models/gear.onnx",
                        "classes": [0, 2]
                    }
                ]
            }
        }"#,
    );

    std::env::set_var("SENTINEL_CONFIG", file.path());
    std::env::set_var("SENTINEL_LOOP", "false");
    std::env::set_var("SENTINEL_FRAME_SKIP", "2");
    std::env::set_var("SENTINEL_CONFIDENCE", "0.8");

    let cfg = SentinelConfig::load().expect("load config");

    assert_eq!(cfg.source.default.as_deref(), Some("rtsp://camera-1/live"));
    assert!(!cfg.source.loop_on_end);
    assert_eq!(cfg.source.frame_skip, 2);
    assert_eq!(cfg.stream.jpeg_quality, 80);
    assert_eq!(cfg.alert.addr.to_string(), "127.0.0.1:7000");
    assert_eq!(cfg.alert.threshold, 3);
    assert_eq!(cfg.alert.jpeg_quality, 60);
    assert_eq!((cfg.alert.width, cfg.alert.height), (320, 240));
    assert_eq!(cfg.alert.connect_timeout, Duration::from_millis(250));
    assert_eq!(cfg.alert.write_timeout, Duration::from_millis(1000));
    assert_eq!(cfg.detection.confidence, 0.8);
    assert_eq!(cfg.detection.image_size, 640);

    let categories = &cfg.detection.categories;
    assert_eq!(categories.len(), 2);
    assert_eq!(categories[0].backend, BackendKind::Stub);
    assert_eq!(categories[0].stub_pattern, vec![true, false]);
    assert_eq!(categories[1].backend, BackendKind::Tract);
    assert_eq!(categories[1].classes, vec![0, 2]);
    assert_eq!(
        categories[1].model.as_deref(),
        Some(std::path::Path::new("models/gear.onnx"))
    );

    clear_env();
}

#[test]
fn loads_toml_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(
        ".toml",
        r#"
            [source]
            default = "clips/yard.mjpeg"

            [alert]
            threshold = 7

            [[detection.categories]]
            name = "restricted-item"
            backend = "stub"
        "#,
    );
    std::env::set_var("SENTINEL_CONFIG", file.path());
    std::env::set_var("SENTINEL_SOURCE", "stub://override");

    let cfg = SentinelConfig::load().expect("load toml config");
    assert_eq!(cfg.source.default.as_deref(), Some("stub://override"));
    assert_eq!(cfg.alert.threshold, 7);
    assert_eq!(cfg.detection.categories.len(), 1);
    assert_eq!(cfg.detection.categories[0].classes, vec![0]);

    clear_env();
}

#[test]
fn defaults_apply_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = SentinelConfig::load().expect("load defaults");
    assert_eq!(cfg.source.default, None);
    assert!(cfg.source.loop_on_end);
    assert_eq!(cfg.alert.addr.to_string(), "127.0.0.1:9999");
    assert_eq!(cfg.alert.threshold, 5);
    assert_eq!(cfg.detection.confidence, 0.7);
    let names: Vec<&str> = cfg
        .detection
        .categories
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(names, vec!["restricted-item", "missing-safety-gear"]);
}

#[test]
fn rejects_malformed_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SENTINEL_FRAME_SKIP", "often");
    assert!(SentinelConfig::load().is_err());
    clear_env();

    std::env::set_var("SENTINEL_ALERT_ADDR", "localhost");
    assert!(SentinelConfig::load().is_err());
    clear_env();

    std::env::set_var("SENTINEL_CONFIDENCE", "1.5");
    assert!(SentinelConfig::load().is_err());
    clear_env();
}

#[test]
fn rejects_invalid_file_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(".json", r#"{ "alert": { "threshold": 0 } }"#);
    std::env::set_var("SENTINEL_CONFIG", file.path());
    assert!(SentinelConfig::load().is_err());

    let file = config_file(
        ".json",
        r#"{ "detection": { "categories": [ { "name": "a" }, { "name": "a" } ] } }"#,
    );
    std::env::set_var("SENTINEL_CONFIG", file.path());
    assert!(SentinelConfig::load().is_err());

    let file = config_file(".json", "{ not json");
    std::env::set_var("SENTINEL_CONFIG", file.path());
    assert!(SentinelConfig::load().is_err());

    clear_env();
}
