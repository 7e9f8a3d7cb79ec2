use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Object detector backend.
///
/// The model behind a backend is opaque to the pipeline: a frame goes in,
/// labeled boxes above `confidence_threshold` come out, in frame pixel
/// coordinates. Class filtering happens in the engine, not here.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run inference on a frame. `image_size` is the square network input edge.
    fn infer(
        &mut self,
        frame: &Frame,
        image_size: u32,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
