use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::encode::{ALERT_HEIGHT, ALERT_JPEG_QUALITY, ALERT_WIDTH, STREAM_JPEG_QUALITY};
use crate::tracker::DEFAULT_ALERT_THRESHOLD;
use crate::transport::DEFAULT_ALERT_ADDR;

const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 500;
const DEFAULT_WRITE_TIMEOUT_MS: u64 = 1000;
const DEFAULT_IMAGE_SIZE: u32 = 416;
const DEFAULT_CONFIDENCE: f32 = 0.7;
const DEFAULT_CATEGORIES: &[&str] = &["restricted-item", "missing-safety-gear"];

#[derive(Debug, Deserialize, Default)]
struct SentinelConfigFile {
    source: Option<SourceConfigFile>,
    stream: Option<StreamConfigFile>,
    alert: Option<AlertConfigFile>,
    detection: Option<DetectionConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    default: Option<String>,
    loop_on_end: Option<bool>,
    frame_skip: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct AlertConfigFile {
    addr: Option<String>,
    threshold: Option<u32>,
    jpeg_quality: Option<u8>,
    width: Option<u32>,
    height: Option<u32>,
    connect_timeout_ms: Option<u64>,
    write_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    confidence: Option<f32>,
    image_size: Option<u32>,
    categories: Option<Vec<CategoryConfigFile>>,
}

#[derive(Debug, Deserialize)]
struct CategoryConfigFile {
    name: String,
    backend: Option<BackendKind>,
    model: Option<PathBuf>,
    classes: Option<Vec<u32>>,
    stub_pattern: Option<Vec<bool>>,
}

#[derive(Debug, Clone, Default)]
pub struct SentinelConfig {
    pub source: SourceSettings,
    pub stream: StreamSettings,
    pub alert: AlertSettings,
    pub detection: DetectionSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSettings {
    /// Source started when none is given on the command line.
    pub default: Option<String>,
    pub loop_on_end: bool,
    pub frame_skip: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertSettings {
    pub addr: SocketAddr,
    pub threshold: u32,
    pub jpeg_quality: u8,
    pub width: u32,
    pub height: u32,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSettings {
    pub image_size: u32,
    pub confidence: f32,
    pub categories: Vec<CategorySettings>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySettings {
    pub name: String,
    pub backend: BackendKind,
    pub model: Option<PathBuf>,
    /// Class ids that count as a detection for this category.
    pub classes: Vec<u32>,
    pub stub_pattern: Vec<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Stub,
    Tract,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            default: None,
            loop_on_end: true,
            frame_skip: 0,
        }
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            jpeg_quality: STREAM_JPEG_QUALITY,
        }
    }
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 9999)),
            threshold: DEFAULT_ALERT_THRESHOLD,
            jpeg_quality: ALERT_JPEG_QUALITY,
            width: ALERT_WIDTH,
            height: ALERT_HEIGHT,
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            write_timeout: Duration::from_millis(DEFAULT_WRITE_TIMEOUT_MS),
        }
    }
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            image_size: DEFAULT_IMAGE_SIZE,
            confidence: DEFAULT_CONFIDENCE,
            categories: DEFAULT_CATEGORIES
                .iter()
                .map(|name| CategorySettings {
                    name: name.to_string(),
                    backend: BackendKind::Tract,
                    model: None,
                    classes: vec![0],
                    stub_pattern: Vec::new(),
                })
                .collect(),
        }
    }
}

impl SentinelConfig {
    /// Load `SENTINEL_CONFIG` (if set), apply environment overrides, validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SENTINEL_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SentinelConfigFile) -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(source) = file.source {
            cfg.source.default = source.default.filter(|s| !s.trim().is_empty());
            cfg.source.loop_on_end = source.loop_on_end.unwrap_or(cfg.source.loop_on_end);
            cfg.source.frame_skip = source.frame_skip.unwrap_or(cfg.source.frame_skip);
        }
        if let Some(stream) = file.stream {
            cfg.stream.jpeg_quality = stream.jpeg_quality.unwrap_or(cfg.stream.jpeg_quality);
        }
        if let Some(alert) = file.alert {
            if let Some(addr) = alert.addr {
                cfg.alert.addr = parse_addr(&addr)?;
            }
            cfg.alert.threshold = alert.threshold.unwrap_or(cfg.alert.threshold);
            cfg.alert.jpeg_quality = alert.jpeg_quality.unwrap_or(cfg.alert.jpeg_quality);
            cfg.alert.width = alert.width.unwrap_or(cfg.alert.width);
            cfg.alert.height = alert.height.unwrap_or(cfg.alert.height);
            if let Some(ms) = alert.connect_timeout_ms {
                cfg.alert.connect_timeout = Duration::from_millis(ms);
            }
            if let Some(ms) = alert.write_timeout_ms {
                cfg.alert.write_timeout = Duration::from_millis(ms);
            }
        }
        if let Some(detection) = file.detection {
            cfg.detection.confidence = detection.confidence.unwrap_or(cfg.detection.confidence);
            cfg.detection.image_size = detection.image_size.unwrap_or(cfg.detection.image_size);
            if let Some(categories) = detection.categories {
                cfg.detection.categories = categories
                    .into_iter()
                    .map(|category| CategorySettings {
                        name: category.name,
                        backend: category.backend.unwrap_or(BackendKind::Tract),
                        model: category.model,
                        classes: category.classes.unwrap_or_else(|| vec![0]),
                        stub_pattern: category.stub_pattern.unwrap_or_default(),
                    })
                    .collect();
            }
        }
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(source) = std::env::var("SENTINEL_SOURCE") {
            if !source.trim().is_empty() {
                self.source.default = Some(source);
            }
        }
        if let Ok(value) = std::env::var("SENTINEL_LOOP") {
            self.source.loop_on_end = parse_flag(&value)
                .ok_or_else(|| anyhow!("SENTINEL_LOOP must be true/false or 1/0"))?;
        }
        if let Ok(value) = std::env::var("SENTINEL_FRAME_SKIP") {
            self.source.frame_skip = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("SENTINEL_FRAME_SKIP must be a non-negative integer"))?;
        }
        if let Ok(addr) = std::env::var("SENTINEL_ALERT_ADDR") {
            if !addr.trim().is_empty() {
                self.alert.addr = parse_addr(&addr)?;
            }
        }
        if let Ok(value) = std::env::var("SENTINEL_CONFIDENCE") {
            self.detection.confidence = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("SENTINEL_CONFIDENCE must be a number in (0, 1]"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        check_quality("stream.jpeg_quality", self.stream.jpeg_quality)?;
        check_quality("alert.jpeg_quality", self.alert.jpeg_quality)?;
        if self.alert.threshold == 0 {
            return Err(anyhow!("alert.threshold must be at least 1"));
        }
        if self.alert.width == 0 || self.alert.height == 0 {
            return Err(anyhow!("alert.width and alert.height must be non-zero"));
        }
        let confidence = self.detection.confidence;
        if !(confidence > 0.0 && confidence <= 1.0) {
            return Err(anyhow!(
                "detection.confidence must be in (0, 1], got {}",
                confidence
            ));
        }
        if self.detection.image_size == 0 {
            return Err(anyhow!("detection.image_size must be greater than zero"));
        }

        let mut seen = HashSet::new();
        for category in &self.detection.categories {
            if category.name.trim().is_empty() {
                return Err(anyhow!("detection category names must not be empty"));
            }
            if !seen.insert(category.name.as_str()) {
                return Err(anyhow!(
                    "detection category '{}' is listed twice",
                    category.name
                ));
            }
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<SentinelConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
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

fn parse_addr(value: &str) -> Result<SocketAddr> {
    value.trim().parse().map_err(|_| {
        anyhow!(
            "alert address '{}' is not a socket address (e.g. {})",
            value,
            DEFAULT_ALERT_ADDR
        )
    })
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn check_quality(key: &str, quality: u8) -> Result<()> {
    if !(1..=100).contains(&quality) {
        return Err(anyhow!("{} must be in 1..=100, got {}", key, quality));
    }
    Ok(())
}
