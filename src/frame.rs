//! Frame types flowing through the pipeline.
//!
//! - `Frame`: decoded RGB raster produced by a source adapter.
//! - `AnnotatedFrame`: a copy of a frame carrying overlays (boxes, FPS, source label).
//! - `EncodedFrame`: the compressed image handed to the stream consumer.

use image::RgbImage;

use crate::detect::Detection;
use crate::ingest::SourceKind;
use crate::overlay;
use crate::transport::multipart;

// ----------------------------------------------------------------------------
// Frame: decoded raster
// ----------------------------------------------------------------------------

/// Decoded RGB frame.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
    /// Position of this frame within its source since open (1-based).
    pub sequence: u64,
}

impl Frame {
    /// Wrap packed RGB24 pixels. Returns `None` when the buffer does not match
    /// the dimensions.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Option<Self> {
        let image = RgbImage::from_raw(width, height, pixels)?;
        Some(Self::from_image(image, sequence))
    }

    pub fn from_image(image: RgbImage, sequence: u64) -> Self {
        Self { image, sequence }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Packed RGB24 pixel data, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }
}

// ----------------------------------------------------------------------------
// AnnotatedFrame: overlays for one pipeline iteration
// ----------------------------------------------------------------------------

/// A detection drawn on an annotated frame, tagged with its category.
#[derive(Clone, Debug)]
pub struct LabeledDetection {
    pub category: String,
    pub detection: Detection,
}

/// Frame copy with overlays applied.
///
/// Boxes are drawn as they are added so that the alert snapshot (boxes only)
/// can be taken before the FPS and source text are stamped.
pub struct AnnotatedFrame {
    image: RgbImage,
    source_kind: SourceKind,
    detections: Vec<LabeledDetection>,
    fps: Option<f64>,
}

impl AnnotatedFrame {
    pub fn new(frame: &Frame, source_kind: SourceKind) -> Self {
        Self {
            image: frame.image.clone(),
            source_kind,
            detections: Vec::new(),
            fps: None,
        }
    }

    /// Draw the detections of one category.
    pub fn add_detections(&mut self, category: &str, color_index: usize, detections: &[Detection]) {
        for detection in detections {
            let label = format!("{} {:.2}", category, detection.confidence);
            overlay::draw_detection(&mut self.image, &detection.bbox, &label, color_index);
            self.detections.push(LabeledDetection {
                category: category.to_string(),
                detection: detection.clone(),
            });
        }
    }

    /// Stamp the FPS and source-type lines in the top-left corner.
    pub fn stamp_status(&mut self, fps: f64) {
        overlay::draw_text(
            &mut self.image,
            10,
            14,
            &format!("FPS: {:.2}", fps),
            overlay::FPS_COLOR,
            2,
        );
        overlay::draw_text(
            &mut self.image,
            10,
            38,
            &format!("Source: {}", self.source_kind.label()),
            overlay::SOURCE_COLOR,
            2,
        );
        self.fps = Some(fps);
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn detections(&self) -> &[LabeledDetection] {
        &self.detections
    }

    pub fn fps(&self) -> Option<f64> {
        self.fps
    }

    pub fn source_kind(&self) -> SourceKind {
        self.source_kind
    }
}

// ----------------------------------------------------------------------------
// EncodedFrame: what the consumer receives
// ----------------------------------------------------------------------------

/// Compressed frame emitted by the stream.
#[derive(Clone, Debug)]
pub struct EncodedFrame {
    pub jpeg: Vec<u8>,
    /// Session frame counter value at which this frame was read.
    pub frame_number: u64,
    pub fps: f64,
    /// Whether this frame completed a detection streak and triggered an alert.
    pub alerted: bool,
}

impl EncodedFrame {
    /// This frame wrapped as one multipart/x-mixed-replace part.
    pub fn multipart_part(&self) -> Vec<u8> {
        multipart::frame_part(&self.jpeg)
    }
}
