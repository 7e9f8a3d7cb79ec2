use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

const STUB_CONFIDENCE: f32 = 0.9;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StubStep {
    Hit,
    Miss,
    Fail,
}

/// Scripted backend for tests and dry runs.
///
/// Cycles through a fixed pattern of hits and misses. A hit is one box over
/// the central quarter of the frame with the configured class id.
pub struct StubBackend {
    script: Vec<StubStep>,
    cursor: usize,
    class_id: u32,
    calls: u64,
}

impl StubBackend {
    /// A backend that never detects anything.
    pub fn new() -> Self {
        Self::with_script(vec![StubStep::Miss])
    }

    /// `true` entries produce a hit, `false` a miss; the pattern repeats.
    pub fn from_pattern(pattern: &[bool]) -> Self {
        let script = pattern
            .iter()
            .map(|&hit| if hit { StubStep::Hit } else { StubStep::Miss })
            .collect::<Vec<_>>();
        if script.is_empty() {
            return Self::new();
        }
        Self::with_script(script)
    }

    pub fn always_hit() -> Self {
        Self::with_script(vec![StubStep::Hit])
    }

    /// A backend whose every inference fails.
    pub fn failing() -> Self {
        Self::with_script(vec![StubStep::Fail])
    }

    /// Class id reported for hits (default 0).
    pub fn with_class(mut self, class_id: u32) -> Self {
        self.class_id = class_id;
        self
    }

    /// Number of inference calls served so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    fn with_script(script: Vec<StubStep>) -> Self {
        Self {
            script,
            cursor: 0,
            class_id: 0,
            calls: 0,
        }
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn infer(
        &mut self,
        frame: &Frame,
        _image_size: u32,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>> {
        let step = self.script[self.cursor % self.script.len()];
        self.cursor = (self.cursor + 1) % self.script.len();
        self.calls += 1;

        match step {
            StubStep::Miss => Ok(Vec::new()),
            StubStep::Fail => Err(anyhow!("stub backend scripted failure")),
            StubStep::Hit if STUB_CONFIDENCE < confidence_threshold => Ok(Vec::new()),
            StubStep::Hit => {
                let (w, h) = (frame.width() as f32, frame.height() as f32);
                Ok(vec![Detection {
                    class_id: self.class_id,
                    bbox: BoundingBox::new(w * 0.25, h * 0.25, w * 0.75, h * 0.75),
                    confidence: STUB_CONFIDENCE,
                }])
            }
        }
    }
}
