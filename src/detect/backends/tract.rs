#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::detect::yolo::{decode_yolov8, head_layout};
use crate::frame::Frame;

/// Tract-based backend for YOLOv8-style ONNX detection models.
///
/// The model is loaded once from a local file; inference resizes each frame to
/// the square network input and maps boxes back to frame coordinates.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>,
    input_size: u32,
}

impl TractBackend {
    /// Load an ONNX model from disk with a fixed `input_size` x `input_size` input.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let edge = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, edge, edge)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "TractBackend: loaded {} ({}x{} input)",
            model_path.display(),
            input_size,
            input_size
        );
        Ok(Self { model, input_size })
    }

    fn build_input(&self, frame: &Frame) -> Tensor {
        let edge = self.input_size;
        let resized = imageops::resize(frame.image(), edge, edge, FilterType::Triangle);
        let edge = edge as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, edge, edge), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        input.into_tensor()
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn infer(
        &mut self,
        frame: &Frame,
        image_size: u32,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>> {
        if image_size != self.input_size {
            return Err(anyhow!(
                "requested image size {} does not match model input {}",
                image_size,
                self.input_size
            ));
        }
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let (num_classes, num_anchors) = head_layout(output.shape())?;
        let values = output
            .as_slice::<f32>()
            .context("model output tensor was not f32")?;

        let scale_x = frame.width() as f32 / self.input_size as f32;
        let scale_y = frame.height() as f32 / self.input_size as f32;
        decode_yolov8(
            values,
            num_classes,
            num_anchors,
            scale_x,
            scale_y,
            frame.width(),
            frame.height(),
            confidence_threshold,
        )
    }
}
