//! Detection engine: the opaque inference boundary of the pipeline.
//!
//! Each detection category owns one `DetectorBackend` plus an allow-list of
//! class ids. The engine runs every category on a frame and returns filtered
//! results; counting streaks is the tracker's job.

mod backend;
mod backends;
mod engine;
mod result;
pub mod yolo;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use engine::{DetectionEngine, DetectionParams};
pub use result::{non_max_suppression, BoundingBox, CategoryDetections, Detection};
