//! Network frame source.
//!
//! `NetworkSource` reads live streams. The location must be a URL:
//! - `stub://` URLs produce synthetic gradient frames (tests and dry runs).
//!   Query parameters: `width`, `height` (default 640x480) and `frames`
//!   (optional stream length).
//! - Anything else goes through GStreamer (feature: rtsp-gstreamer). RTSP is
//!   forced onto TCP with zero jitter-buffer latency; the sink keeps only a
//!   few buffers and drops late ones so the pipeline always sees fresh frames.
//!
//! Live streams cannot be rewound; `seek_to_start` is accepted and ignored.

#[cfg(feature = "rtsp-gstreamer")]
use anyhow::{anyhow, Context, Result};
use url::Url;

use super::{FrameSource, SourceKind};
use crate::error::OpenError;
use crate::frame::Frame;

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;

/// Network frame source.
pub struct NetworkSource {
    url: Url,
    backend: NetworkBackend,
    frames_read: u64,
    closed: bool,
}

enum NetworkBackend {
    Synthetic(SyntheticStream),
    #[cfg(feature = "rtsp-gstreamer")]
    Gstreamer(GstreamerStream),
}

impl NetworkSource {
    pub fn open(location: &str) -> Result<Self, OpenError> {
        let url = Url::parse(location).map_err(|e| OpenError::InvalidLocator {
            location: location.to_string(),
            reason: e.to_string(),
        })?;
        let backend = if url.scheme() == "stub" {
            NetworkBackend::Synthetic(SyntheticStream::from_url(&url)?)
        } else {
            open_live(&url)?
        };
        log::info!("NetworkSource: connected to {} ({})", url, backend.name());
        Ok(Self {
            url,
            backend,
            frames_read: 0,
            closed: false,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl FrameSource for NetworkSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Network
    }

    fn read_frame(&mut self) -> Option<Frame> {
        if self.closed {
            return None;
        }
        let sequence = self.frames_read + 1;
        let frame = match &mut self.backend {
            NetworkBackend::Synthetic(stream) => stream.next_frame(sequence),
            #[cfg(feature = "rtsp-gstreamer")]
            NetworkBackend::Gstreamer(stream) => stream.next_frame(sequence),
        }?;
        self.frames_read = sequence;
        Some(frame)
    }

    fn seek_to_start(&mut self) -> Result<(), OpenError> {
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        #[cfg(feature = "rtsp-gstreamer")]
        {
            if let NetworkBackend::Gstreamer(stream) = &mut self.backend {
                stream.shutdown();
            }
        }
        log::info!(
            "NetworkSource: closed {} after {} frames",
            self.url,
            self.frames_read
        );
    }
}

impl Drop for NetworkSource {
    fn drop(&mut self) {
        self.close();
    }
}

impl NetworkBackend {
    fn name(&self) -> &'static str {
        match self {
            NetworkBackend::Synthetic(_) => "synthetic",
            #[cfg(feature = "rtsp-gstreamer")]
            NetworkBackend::Gstreamer(_) => "gstreamer",
        }
    }
}

#[cfg(feature = "rtsp-gstreamer")]
fn open_live(url: &Url) -> Result<NetworkBackend, OpenError> {
    GstreamerStream::open(url)
        .map(NetworkBackend::Gstreamer)
        .map_err(|e| OpenError::unavailable(url.as_str(), format!("{:#}", e)))
}

#[cfg(not(feature = "rtsp-gstreamer"))]
fn open_live(url: &Url) -> Result<NetworkBackend, OpenError> {
    Err(OpenError::Unsupported {
        what: format!("{}:// streams", url.scheme()),
        feature: "rtsp-gstreamer",
    })
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://)
// ----------------------------------------------------------------------------

struct SyntheticStream {
    width: u32,
    height: u32,
    /// Stream ends after this many frames when set.
    limit: Option<u64>,
    produced: u64,
}

impl SyntheticStream {
    fn from_url(url: &Url) -> Result<Self, OpenError> {
        let mut stream = Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            limit: None,
            produced: 0,
        };
        for (key, value) in url.query_pairs() {
            let invalid = |reason: String| OpenError::InvalidLocator {
                location: url.to_string(),
                reason,
            };
            let parsed: u64 = value.parse().map_err(|_| {
                invalid(format!("query parameter {}={} is not a number", key, value))
            })?;
            match key.as_ref() {
                "width" | "height" if parsed == 0 || parsed > u64::from(u16::MAX) => {
                    return Err(invalid(format!("{} must be in 1..=65535", key)));
                }
                "width" => stream.width = parsed as u32,
                "height" => stream.height = parsed as u32,
                "frames" => stream.limit = Some(parsed),
                other => log::debug!("NetworkSource: ignoring stub parameter '{}'", other),
            }
        }
        Ok(stream)
    }

    fn next_frame(&mut self, sequence: u64) -> Option<Frame> {
        if self.limit.is_some_and(|limit| self.produced >= limit) {
            return None;
        }
        self.produced += 1;
        let shift = self.produced as u32;
        let image = image::RgbImage::from_fn(self.width, self.height, |x, y| {
            image::Rgb([
                (x.wrapping_add(shift) % 256) as u8,
                (y.wrapping_add(shift) % 256) as u8,
                ((x + y) / 2 % 256) as u8,
            ])
        });
        Some(Frame::from_image(image, sequence))
    }
}

// ----------------------------------------------------------------------------
// Live streams through GStreamer
// ----------------------------------------------------------------------------

#[cfg(feature = "rtsp-gstreamer")]
const PULL_TIMEOUT_MS: u64 = 2_000;

#[cfg(feature = "rtsp-gstreamer")]
const SINK_MAX_BUFFERS: u32 = 3;

#[cfg(feature = "rtsp-gstreamer")]
struct GstreamerStream {
    url: String,
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    ended: bool,
}

#[cfg(feature = "rtsp-gstreamer")]
impl GstreamerStream {
    fn open(url: &Url) -> Result<Self> {
        gstreamer::init().context("initialize gstreamer")?;

        let head = if url.scheme() == "rtsp" {
            format!("rtspsrc location={} protocols=tcp latency=0 ! decodebin", url)
        } else {
            format!("uridecodebin uri={}", url)
        };
        let description = format!(
            "{} ! videoconvert ! video/x-raw,format=RGB ! \
             appsink name=appsink sync=false max-buffers={} drop=true",
            head, SINK_MAX_BUFFERS
        );
        let pipeline = gstreamer::parse::launch(&description)
            .context("build stream pipeline")?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| anyhow!("stream pipeline is not a Pipeline"))?;

        let appsink = pipeline
            .by_name("appsink")
            .context("appsink element missing from pipeline")?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| anyhow!("appsink element has unexpected type"))?;
        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", "RGB")
            .build();
        appsink.set_caps(Some(&caps));

        pipeline
            .set_state(gstreamer::State::Playing)
            .context("set stream pipeline to Playing")?;
        let (result, _, _) = pipeline.state(gstreamer::ClockTime::from_seconds(5));
        if let Err(e) = result {
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(anyhow!("stream did not start: {:?}", e));
        }

        Ok(Self {
            url: url.to_string(),
            pipeline,
            appsink,
            ended: false,
        })
    }

    fn next_frame(&mut self, sequence: u64) -> Option<Frame> {
        self.poll_bus();
        if self.ended {
            return None;
        }
        let sample = self
            .appsink
            .try_pull_sample(gstreamer::ClockTime::from_mseconds(PULL_TIMEOUT_MS));
        let Some(sample) = sample else {
            log::warn!("NetworkSource: no frame from {} within {} ms", self.url, PULL_TIMEOUT_MS);
            return None;
        };
        match sample_to_frame(&sample, sequence) {
            Ok(frame) => Some(frame),
            Err(e) => {
                log::warn!("NetworkSource: unusable sample from {}: {:#}", self.url, e);
                None
            }
        }
    }

    fn poll_bus(&mut self) {
        let Some(bus) = self.pipeline.bus() else {
            return;
        };
        while let Some(message) = bus.pop() {
            use gstreamer::MessageView;
            match message.view() {
                MessageView::Error(err) => {
                    log::warn!(
                        "NetworkSource: gstreamer error from {:?}: {}",
                        err.src().map(|s| s.path_string()),
                        err.error()
                    );
                    self.ended = true;
                }
                MessageView::Eos(..) => {
                    log::info!("NetworkSource: {} reached end of stream", self.url);
                    self.ended = true;
                }
                _ => {}
            }
        }
    }

    fn shutdown(&mut self) {
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            log::warn!("NetworkSource: failed to stop pipeline for {}: {}", self.url, e);
        }
        self.ended = true;
    }
}

#[cfg(feature = "rtsp-gstreamer")]
fn sample_to_frame(sample: &gstreamer::Sample, sequence: u64) -> Result<Frame> {
    let buffer = sample.buffer().context("sample missing buffer")?;
    let caps = sample.caps().context("sample missing caps")?;
    let info = gstreamer_video::VideoInfo::from_caps(caps).context("parse caps as video info")?;

    let width = info.width();
    let height = info.height();
    let row_bytes = (width as usize) * 3;
    let stride = info.stride()[0] as usize;

    let map = buffer.map_readable().context("map buffer")?;
    let data = map.as_slice();

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(
            data.get(start..start + row_bytes)
                .context("buffer row is out of bounds")?,
        );
    }
    Frame::from_rgb(pixels, width, height, sequence)
        .ok_or_else(|| anyhow!("sample {}x{} has a short buffer", width, height))
}
