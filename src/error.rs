//! Error taxonomy for the frame pipeline.
//!
//! Only [`OpenError`] ever reaches the caller of `start`. Every other error is
//! absorbed inside one pipeline iteration: the frame degrades (no detections,
//! no alert, or no emitted image) and the stream keeps running.

use thiserror::Error;

/// The video source could not be opened.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("video source is required")]
    EmptyDescriptor,
    #[error("'{location}' is neither a local file nor a valid stream URL: {reason}")]
    InvalidLocator { location: String, reason: String },
    #[error("{what} requires the {feature} feature")]
    Unsupported {
        what: String,
        feature: &'static str,
    },
    #[error("unable to open video source '{location}': {reason}")]
    Unavailable { location: String, reason: String },
}

impl OpenError {
    pub(crate) fn unavailable(location: &str, reason: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            location: location.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Inference failed for the current frame.
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("inference failed for category '{category}': {reason}")]
    Inference { category: String, reason: String },
    #[error("frame {width}x{height} cannot be used for inference")]
    InvalidFrame { width: u32, height: u32 },
}

/// An alert payload could not be delivered.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("connect to alert endpoint {addr} failed: {source}")]
    Connect {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("write to alert endpoint failed: {0}")]
    Write(#[source] std::io::Error),
    #[error("alert image of {0} bytes does not fit a 4-byte length prefix")]
    PayloadTooLarge(usize),
}

/// A frame could not be compressed.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("jpeg encoding failed: {0}")]
    Jpeg(#[from] image::ImageError),
    #[error("jpeg quality {0} is outside 1..=100")]
    Quality(u8),
}

/// The frame stream could not be attached.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("no stream is running")]
    NotStreaming,
    #[error("the frame stream already has a consumer")]
    ConsumerAttached,
}
