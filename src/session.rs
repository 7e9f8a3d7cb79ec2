//! Session lifecycle record and status reporting.
//!
//! One [`SessionRecord`] exists per controller. It is created in `Ready`,
//! reset in place by every start, and never destroyed. All reads and writes
//! go through the controller's mutex.

use std::fmt;

use serde::Serialize;

use crate::ingest::SourceDescriptor;

/// Lifecycle state of the streaming session.
///
/// `Ready -> Connecting -> Streaming -> {Stopped, Failed}`; a stopped or
/// failed session may be started again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SessionStatus {
    Ready,
    Connecting,
    Streaming,
    Stopped,
    Failed,
}

impl SessionStatus {
    /// True while a start is in flight or frames are flowing.
    pub fn is_active(self) -> bool {
        matches!(self, SessionStatus::Connecting | SessionStatus::Streaming)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionStatus::Ready => "Ready",
            SessionStatus::Connecting => "Connecting",
            SessionStatus::Streaming => "Streaming",
            SessionStatus::Stopped => "Stopped",
            SessionStatus::Failed => "Failed",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Debug)]
pub struct SessionRecord {
    /// True iff a source handle is open.
    pub running: bool,
    pub status: SessionStatus,
    pub descriptor: Option<SourceDescriptor>,
    pub loop_on_end: bool,
    pub frame_skip: u32,
    /// Frames read since start, skipped ones included.
    pub frame_count: u64,
    pub current_fps: f64,
    pub frames_emitted: u64,
    pub alerts_sent: u64,
    /// Bumped on every successful start.
    pub generation: u64,
}

impl SessionRecord {
    pub fn new(loop_on_end: bool, frame_skip: u32) -> Self {
        Self {
            running: false,
            status: SessionStatus::Ready,
            descriptor: None,
            loop_on_end,
            frame_skip,
            frame_count: 0,
            current_fps: 0.0,
            frames_emitted: 0,
            alerts_sent: 0,
            generation: 0,
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            running: self.running,
            status: self.status,
            fps: round_fps(self.current_fps),
        }
    }

    /// Whether the frame with counter value `frame_count` is processed.
    /// With `frame_skip = k`, exactly one of every `k + 1` reads passes.
    pub fn samples(&self, frame_count: u64) -> bool {
        frame_count % (u64::from(self.frame_skip) + 1) == 0
    }

    pub(crate) fn begin_connecting(&mut self) {
        self.running = false;
        self.status = SessionStatus::Connecting;
        self.current_fps = 0.0;
    }

    pub(crate) fn mark_streaming(&mut self, descriptor: SourceDescriptor) -> u64 {
        self.running = true;
        self.status = SessionStatus::Streaming;
        self.descriptor = Some(descriptor);
        self.frame_count = 0;
        self.current_fps = 0.0;
        self.frames_emitted = 0;
        self.alerts_sent = 0;
        self.generation += 1;
        self.generation
    }

    pub(crate) fn mark_failed(&mut self) {
        self.running = false;
        self.status = SessionStatus::Failed;
        self.descriptor = None;
        self.current_fps = 0.0;
    }

    pub(crate) fn mark_stopped(&mut self) {
        self.running = false;
        self.status = SessionStatus::Stopped;
        self.current_fps = 0.0;
    }

    /// True while frames of `generation` may still be emitted.
    pub(crate) fn is_live(&self, generation: u64) -> bool {
        self.running && self.status == SessionStatus::Streaming && self.generation == generation
    }
}

/// Status report for the control surface.
///
/// Serialized as `{"is_running": .., "status": "..", "fps": ..}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatusSnapshot {
    #[serde(rename = "is_running")]
    pub running: bool,
    pub status: SessionStatus,
    /// Instantaneous FPS rounded to two decimals.
    pub fps: f64,
}

fn round_fps(fps: f64) -> f64 {
    (fps * 100.0).round() / 100.0
}
