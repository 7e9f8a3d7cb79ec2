//! Frame ingestion sources.
//!
//! A video source is named by a single string. Classification is structural:
//! a string naming an existing local file opens a [`FileSource`] (bounded,
//! seekable, loopable); anything else must be a URL and opens a
//! [`NetworkSource`] (unbounded, low latency).
//!
//! Backends:
//! - MJPEG files (always available)
//! - Any container FFmpeg can demux (feature: ingest-file-ffmpeg)
//! - `stub://` synthetic streams (testing and dry runs)
//! - RTSP/HTTP streams through GStreamer (feature: rtsp-gstreamer)
//!
//! Sources never store decoded frames; each frame is handed to the pipeline
//! and dropped after encoding.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod network;

use std::fmt;
use std::path::Path;

pub use file::FileSource;
pub use network::NetworkSource;

use crate::error::OpenError;
use crate::frame::Frame;

/// Kind of video source, decided when the descriptor is classified.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    File,
    Network,
}

impl SourceKind {
    /// Label stamped on every emitted frame.
    pub fn label(self) -> &'static str {
        match self {
            SourceKind::File => "FILE",
            SourceKind::Network => "STREAM",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A classified video source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub kind: SourceKind,
    pub location: String,
}

impl SourceDescriptor {
    /// Classify a raw source string.
    ///
    /// Only emptiness is checked here; whether a network location is a usable
    /// URL is decided when it is opened.
    pub fn classify(raw: &str) -> Result<Self, OpenError> {
        let location = raw.trim();
        if location.is_empty() {
            return Err(OpenError::EmptyDescriptor);
        }
        let kind = if Path::new(location).is_file() {
            SourceKind::File
        } else {
            SourceKind::Network
        };
        Ok(Self {
            kind,
            location: location.to_string(),
        })
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.location, self.kind.label())
    }
}

/// An open video source.
///
/// `read_frame` returns `None` both at end of stream and on a transient read
/// failure; the pipeline treats the two alike.
pub trait FrameSource: Send {
    fn kind(&self) -> SourceKind;

    fn read_frame(&mut self) -> Option<Frame>;

    /// Rewind to the first frame. Network sources accept this as a no-op.
    fn seek_to_start(&mut self) -> Result<(), OpenError>;

    /// Release the underlying handle. Safe to call more than once.
    fn close(&mut self);
}

/// Opens sources for the pipeline.
pub trait SourceOpener: Send + Sync {
    fn open(&self, descriptor: &SourceDescriptor) -> Result<Box<dyn FrameSource>, OpenError>;
}

/// Opens file descriptors with [`FileSource`] and everything else with
/// [`NetworkSource`].
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultOpener;

impl SourceOpener for DefaultOpener {
    fn open(&self, descriptor: &SourceDescriptor) -> Result<Box<dyn FrameSource>, OpenError> {
        match descriptor.kind {
            SourceKind::File => Ok(Box::new(FileSource::open(&descriptor.location)?)),
            SourceKind::Network => Ok(Box::new(NetworkSource::open(&descriptor.location)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_file_classifies_as_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let descriptor = SourceDescriptor::classify(file.path().to_str().unwrap()).unwrap();
        assert_eq!(descriptor.kind, SourceKind::File);
    }

    #[test]
    fn everything_else_classifies_as_network() {
        let descriptor = SourceDescriptor::classify(" rtsp://10.0.0.5/live ").unwrap();
        assert_eq!(descriptor.kind, SourceKind::Network);
        assert_eq!(descriptor.location, "rtsp://10.0.0.5/live");

        let missing = SourceDescriptor::classify("/no/such/video.mp4").unwrap();
        assert_eq!(missing.kind, SourceKind::Network);
    }

    #[test]
    fn blank_descriptor_is_rejected() {
        assert!(matches!(
            SourceDescriptor::classify("   "),
            Err(OpenError::EmptyDescriptor)
        ));
    }

    #[test]
    fn nonexistent_path_fails_to_open() {
        let descriptor = SourceDescriptor::classify("/no/such/video.mp4").unwrap();
        assert!(matches!(
            DefaultOpener.open(&descriptor),
            Err(OpenError::InvalidLocator { .. })
        ));
    }
}
