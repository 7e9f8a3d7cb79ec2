//! YOLOv8 detection-head decoding.
//!
//! The head is a `[1, 4 + nc, anchors]` tensor: rows 0..4 hold the box center
//! and size in network-input pixels, the remaining `nc` rows hold per-class
//! scores. Decoding is kept independent of the inference runtime so it can be
//! exercised without a model.

use anyhow::{anyhow, Result};

use super::result::{non_max_suppression, BoundingBox, Detection};

const BOX_ROWS: usize = 4;

/// IoU above which two same-class boxes are merged.
pub const NMS_IOU_THRESHOLD: f32 = 0.45;

/// Extract `(num_classes, num_anchors)` from an output shape.
pub fn head_layout(shape: &[usize]) -> Result<(usize, usize)> {
    match shape {
        [1, rows, anchors] if *rows > BOX_ROWS => Ok((rows - BOX_ROWS, *anchors)),
        _ => Err(anyhow!(
            "unexpected detection head shape {:?}, expected [1, 4 + classes, anchors]",
            shape
        )),
    }
}

/// Decode a flattened head into frame-space detections.
///
/// `scale_x`/`scale_y` map network-input pixels back to frame pixels. Boxes are
/// clamped to the frame and passed through non-maximum suppression.
#[allow(clippy::too_many_arguments)]
pub fn decode_yolov8(
    output: &[f32],
    num_classes: usize,
    num_anchors: usize,
    scale_x: f32,
    scale_y: f32,
    frame_width: u32,
    frame_height: u32,
    confidence_threshold: f32,
) -> Result<Vec<Detection>> {
    let expected = (BOX_ROWS + num_classes) * num_anchors;
    if output.len() != expected {
        return Err(anyhow!(
            "detection head holds {} values, expected {}",
            output.len(),
            expected
        ));
    }
    let at = |row: usize, anchor: usize| output[row * num_anchors + anchor];

    let mut detections = Vec::new();
    for anchor in 0..num_anchors {
        let Some((class_id, confidence)) = (0..num_classes)
            .map(|class| (class, at(BOX_ROWS + class, anchor)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
        else {
            continue;
        };
        if confidence < confidence_threshold {
            continue;
        }
        let bbox = BoundingBox::from_center(
            at(0, anchor) * scale_x,
            at(1, anchor) * scale_y,
            at(2, anchor) * scale_x,
            at(3, anchor) * scale_y,
        )
        .clamp(frame_width, frame_height);
        detections.push(Detection {
            class_id: class_id as u32,
            bbox,
            confidence,
        });
    }

    Ok(non_max_suppression(detections, NMS_IOU_THRESHOLD))
}
