//! Stream Sentinel
//!
//! Watches a single video source, runs per-frame object detection, and raises
//! an out-of-band alert when a category is detected on enough consecutive
//! frames. The annotated frames are re-exposed as a continuous
//! multipart/x-mixed-replace JPEG stream for live viewing.
//!
//! # Architecture
//!
//! ```text
//! ingest ──> pipeline ──> detect ──> tracker ──> transport::alert
//!               │
//!               └──> overlay ──> encode ──> transport::multipart
//! ```
//!
//! The pipeline keeps running through per-frame failures: a detection error
//! counts as an empty frame, an undeliverable alert is logged and dropped, and
//! a frame that fails to encode is skipped. Only a failure to open the source
//! is reported to the caller of `start`.
//!
//! # Module Structure
//!
//! - `ingest`: video sources (MJPEG/FFmpeg files, synthetic and GStreamer streams)
//! - `detect`: detector backends and the per-category detection engine
//! - `tracker`: consecutive-hit counters and the alert threshold
//! - `pipeline`: `StreamController` (start/stop/status) and `FrameStream`
//! - `session`: lifecycle record and status snapshot
//! - `frame`, `overlay`, `encode`: rasters, annotation and JPEG output
//! - `transport`: alert socket protocol and multipart framing
//! - `config`: file and environment configuration

pub mod config;
pub mod detect;
pub mod encode;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod overlay;
pub mod pipeline;
pub mod session;
pub mod tracker;
pub mod transport;

pub use config::SentinelConfig;
pub use detect::{BoundingBox, CategoryDetections, Detection, DetectionEngine, DetectorBackend};
pub use error::{DetectionError, DispatchError, EncodeError, OpenError, StreamError};
pub use frame::{AnnotatedFrame, EncodedFrame, Frame};
pub use ingest::{
    DefaultOpener, FileSource, FrameSource, NetworkSource, SourceDescriptor, SourceKind,
    SourceOpener,
};
pub use pipeline::{ControlResponse, FrameStream, PipelineSettings, StreamController};
pub use session::{SessionRecord, SessionStatus, StatusSnapshot};
pub use tracker::DetectionTracker;
pub use transport::AlertDispatcher;
