//! Frame pipeline and stream controller.
//!
//! [`StreamController`] owns the session record, the open source handle, the
//! detection engine and the alert dispatcher. Control operations (`start`,
//! `stop`, `status`) may be called from any thread; frames are pulled by a
//! single consumer through [`FrameStream`], an iterator that runs
//!
//! ```text
//! read -> throttle -> detect -> annotate -> count -> alert -> encode -> emit
//! ```
//!
//! one frame per `next()`. Per-frame failures (detection, alert delivery,
//! encoding) degrade that frame only; the stream ends when the source ends
//! without looping or when the session leaves `Streaming`.
//!
//! Locks are always taken session first, then source; the source lock is
//! never held while taking the session lock.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::SentinelConfig;
use crate::detect::DetectionEngine;
use crate::encode::{self, encode_alert_snapshot, encode_jpeg};
use crate::error::{OpenError, StreamError};
use crate::frame::{AnnotatedFrame, EncodedFrame, Frame};
use crate::ingest::{DefaultOpener, FrameSource, SourceDescriptor, SourceKind, SourceOpener};
use crate::session::{SessionRecord, SessionStatus, StatusSnapshot};
use crate::tracker::{DetectionTracker, DEFAULT_ALERT_THRESHOLD};
use crate::transport::AlertDispatcher;

/// Tunables of the frame pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineSettings {
    pub loop_on_end: bool,
    pub frame_skip: u32,
    pub stream_quality: u8,
    pub alert_threshold: u32,
    pub alert_quality: u8,
    pub alert_width: u32,
    pub alert_height: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            loop_on_end: true,
            frame_skip: 0,
            stream_quality: encode::STREAM_JPEG_QUALITY,
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
            alert_quality: encode::ALERT_JPEG_QUALITY,
            alert_width: encode::ALERT_WIDTH,
            alert_height: encode::ALERT_HEIGHT,
        }
    }
}

impl From<&SentinelConfig> for PipelineSettings {
    fn from(config: &SentinelConfig) -> Self {
        Self {
            loop_on_end: config.source.loop_on_end,
            frame_skip: config.source.frame_skip,
            stream_quality: config.stream.jpeg_quality,
            alert_threshold: config.alert.threshold,
            alert_quality: config.alert.jpeg_quality,
            alert_width: config.alert.width,
            alert_height: config.alert.height,
        }
    }
}

/// Result of a control operation, serialized as `{"success": .., "message": ..}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ControlResponse {
    pub success: bool,
    pub message: String,
}

impl ControlResponse {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Instantaneous frames per second for one iteration; zero when no time
/// could be measured.
pub fn instantaneous_fps(elapsed: Duration) -> f64 {
    let seconds = elapsed.as_secs_f64();
    if seconds > 0.0 {
        1.0 / seconds
    } else {
        0.0
    }
}

struct OpenSource {
    generation: u64,
    handle: Box<dyn FrameSource>,
}

struct Shared {
    settings: PipelineSettings,
    opener: Box<dyn SourceOpener>,
    session: Mutex<SessionRecord>,
    source: Mutex<Option<OpenSource>>,
    engine: Mutex<DetectionEngine>,
    dispatcher: AlertDispatcher,
    /// Generation of the session the attached consumer reads from.
    consumer: Mutex<Option<u64>>,
}

/// Control surface and owner of the streaming session.
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct StreamController {
    shared: Arc<Shared>,
}

impl StreamController {
    pub fn new(
        settings: PipelineSettings,
        engine: DetectionEngine,
        dispatcher: AlertDispatcher,
    ) -> Self {
        Self::with_opener(settings, engine, dispatcher, DefaultOpener)
    }

    /// Build a controller that opens sources through `opener`.
    pub fn with_opener<O: SourceOpener + 'static>(
        settings: PipelineSettings,
        engine: DetectionEngine,
        dispatcher: AlertDispatcher,
        opener: O,
    ) -> Self {
        let session = SessionRecord::new(settings.loop_on_end, settings.frame_skip);
        Self {
            shared: Arc::new(Shared {
                settings,
                opener: Box::new(opener),
                session: Mutex::new(session),
                source: Mutex::new(None),
                engine: Mutex::new(engine),
                dispatcher,
                consumer: Mutex::new(None),
            }),
        }
    }

    /// Build the engine and dispatcher described by `config`.
    pub fn from_config(config: &SentinelConfig) -> anyhow::Result<Self> {
        let engine = DetectionEngine::from_settings(&config.detection)?;
        let dispatcher = AlertDispatcher::new(config.alert.addr)
            .with_timeouts(config.alert.connect_timeout, config.alert.write_timeout);
        Ok(Self::new(PipelineSettings::from(config), engine, dispatcher))
    }

    /// Open `source` and begin a new streaming session.
    pub fn start(&self, source: &str) -> ControlResponse {
        let descriptor = match SourceDescriptor::classify(source) {
            Ok(descriptor) => descriptor,
            Err(OpenError::EmptyDescriptor) => {
                return ControlResponse::failed("Video source is required")
            }
            Err(e) => return ControlResponse::failed(format!("Failed to connect: {}", e)),
        };

        {
            let mut session = lock(&self.shared.session);
            if session.status.is_active() {
                return ControlResponse::failed("Stream is already running");
            }
            session.begin_connecting();
        }
        log::info!("pipeline: connecting to {}", descriptor);

        let handle = match self.shared.opener.open(&descriptor) {
            Ok(handle) => handle,
            Err(e) => {
                let mut session = lock(&self.shared.session);
                if session.status == SessionStatus::Connecting {
                    session.mark_failed();
                }
                log::warn!("pipeline: failed to open {}: {}", descriptor, e);
                return ControlResponse::failed(format!("Failed to connect: {}", e));
            }
        };

        let mut session = lock(&self.shared.session);
        if session.status != SessionStatus::Connecting {
            drop(session);
            let mut handle = handle;
            handle.close();
            log::info!("pipeline: stop requested while connecting to {}", descriptor);
            return ControlResponse::failed(
                "Failed to connect: stream was stopped while connecting",
            );
        }
        let generation = session.mark_streaming(descriptor.clone());
        let stale = lock(&self.shared.source).replace(OpenSource { generation, handle });
        drop(session);
        if let Some(mut stale) = stale {
            stale.handle.close();
        }

        log::info!("pipeline: streaming {} (session {})", descriptor, generation);
        ControlResponse::ok("Stream started successfully")
    }

    /// Stop the session and close the source. Safe to call in any state.
    pub fn stop(&self) -> ControlResponse {
        let previous = {
            let mut session = lock(&self.shared.session);
            let previous = session.status;
            session.mark_stopped();
            previous
        };
        let open = lock(&self.shared.source).take();
        if let Some(mut open) = open {
            open.handle.close();
        }
        if previous != SessionStatus::Stopped {
            log::info!("pipeline: stopped (was {})", previous);
        }
        ControlResponse::ok("Stream stopped")
    }

    pub fn status(&self) -> StatusSnapshot {
        lock(&self.shared.session).snapshot()
    }

    /// Copy of the full session record.
    pub fn session(&self) -> SessionRecord {
        lock(&self.shared.session).clone()
    }

    pub fn set_frame_skip(&self, frame_skip: u32) {
        lock(&self.shared.session).frame_skip = frame_skip;
    }

    pub fn set_loop_on_end(&self, loop_on_end: bool) {
        lock(&self.shared.session).loop_on_end = loop_on_end;
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.shared.settings
    }

    /// Attach the consumer of the current session's frames.
    pub fn frames(&self) -> Result<FrameStream, StreamError> {
        let session = lock(&self.shared.session);
        if !session.running || session.status != SessionStatus::Streaming {
            return Err(StreamError::NotStreaming);
        }
        let generation = session.generation;
        let kind = session
            .descriptor
            .as_ref()
            .map(|d| d.kind)
            .unwrap_or(SourceKind::Network);

        let mut consumer = lock(&self.shared.consumer);
        if *consumer == Some(generation) {
            return Err(StreamError::ConsumerAttached);
        }
        *consumer = Some(generation);
        drop(consumer);
        drop(session);

        let categories = lock(&self.shared.engine).category_names();
        Ok(FrameStream {
            shared: Arc::clone(&self.shared),
            generation,
            kind,
            tracker: DetectionTracker::new(categories, self.shared.settings.alert_threshold),
            rewound: false,
            done: false,
        })
    }
}

enum ReadResult {
    Frame(Frame),
    /// The source reported end of stream (or a read failure).
    Exhausted,
    /// The handle is gone: stopped, or replaced by a newer session.
    Closed,
}

/// Pull-based stream of encoded frames for one session.
///
/// Ends when the source ends (without looping) or the session is stopped.
/// Dropping the stream detaches the consumer without stopping the session.
pub struct FrameStream {
    shared: Arc<Shared>,
    generation: u64,
    kind: SourceKind,
    tracker: DetectionTracker,
    /// Set after a rewind until a frame is read again.
    rewound: bool,
    done: bool,
}

impl FrameStream {
    /// Detach from the session. The session keeps its state.
    pub fn close(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        let mut consumer = lock(&self.shared.consumer);
        if *consumer == Some(self.generation) {
            *consumer = None;
        }
    }

    pub fn tracker(&self) -> &DetectionTracker {
        &self.tracker
    }

    fn read(&self) -> ReadResult {
        let mut slot = lock(&self.shared.source);
        match slot.as_mut() {
            Some(open) if open.generation == self.generation => match open.handle.read_frame() {
                Some(frame) => ReadResult::Frame(frame),
                None => ReadResult::Exhausted,
            },
            _ => ReadResult::Closed,
        }
    }

    fn rewind(&self) -> bool {
        let mut slot = lock(&self.shared.source);
        match slot.as_mut() {
            Some(open) if open.generation == self.generation => {
                match open.handle.seek_to_start() {
                    Ok(()) => true,
                    Err(e) => {
                        log::warn!("pipeline: rewind failed: {}", e);
                        false
                    }
                }
            }
            _ => false,
        }
    }

    /// Loop policy for this session, or `None` once it is no longer live.
    fn loop_policy(&self) -> Option<bool> {
        let session = lock(&self.shared.session);
        session
            .is_live(self.generation)
            .then_some(session.loop_on_end)
    }

    /// Count a read frame. Returns `(frame_count, sampled)`, or `None` once
    /// the session is no longer live.
    fn count_frame(&self) -> Option<(u64, bool)> {
        let mut session = lock(&self.shared.session);
        if !session.is_live(self.generation) {
            return None;
        }
        session.frame_count += 1;
        let count = session.frame_count;
        Some((count, session.samples(count)))
    }

    /// The source ran out: mark the session stopped and release the handle.
    fn end_of_stream(&mut self) {
        {
            let mut session = lock(&self.shared.session);
            if !session.is_live(self.generation) {
                return;
            }
            session.mark_stopped();
        }
        let open = {
            let mut slot = lock(&self.shared.source);
            match slot.as_ref() {
                Some(open) if open.generation == self.generation => slot.take(),
                _ => None,
            }
        };
        if let Some(mut open) = open {
            open.handle.close();
        }
        log::info!("pipeline: source ended, session {} stopped", self.generation);
    }

    /// Run detection on `frame`, draw the boxes and update the streak
    /// counters. Returns true when a streak completed.
    fn detect(&mut self, frame: &Frame, annotated: &mut AnnotatedFrame, frame_count: u64) -> bool {
        let mut engine = lock(&self.shared.engine);
        if !engine.is_available() {
            return false;
        }
        match engine.detect(frame) {
            Ok(results) => {
                let hits: Vec<bool> = results.iter().map(|r| r.is_hit()).collect();
                for (index, result) in results.iter().enumerate() {
                    annotated.add_detections(&result.category, index, &result.detections);
                }
                self.tracker.observe(&hits)
            }
            Err(e) => {
                log::warn!("pipeline: detection failed on frame {}: {}", frame_count, e);
                self.tracker.observe_miss();
                false
            }
        }
    }

    /// Encode and push an alert snapshot. Returns true when it was delivered.
    fn send_alert(&self, annotated: &AnnotatedFrame, frame_count: u64) -> bool {
        let settings = &self.shared.settings;
        log::info!(
            "pipeline: detection streak of {} frames at frame {}, sending alert",
            self.tracker.threshold(),
            frame_count
        );
        let snapshot = match encode_alert_snapshot(
            annotated.image(),
            settings.alert_width,
            settings.alert_height,
            settings.alert_quality,
        ) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::warn!("pipeline: alert snapshot encoding failed: {}", e);
                return false;
            }
        };
        match self.shared.dispatcher.dispatch(&snapshot) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("pipeline: alert dispatch failed: {}", e);
                false
            }
        }
    }

    /// Record an emitted frame. Returns false if the session went away while
    /// the frame was being processed.
    fn record_emitted(&self, fps: f64, alert_delivered: bool) -> bool {
        let mut session = lock(&self.shared.session);
        if !session.is_live(self.generation) {
            return false;
        }
        session.current_fps = fps;
        session.frames_emitted += 1;
        if alert_delivered {
            session.alerts_sent += 1;
        }
        true
    }
}

impl Iterator for FrameStream {
    type Item = EncodedFrame;

    fn next(&mut self) -> Option<EncodedFrame> {
        if self.done {
            return None;
        }
        loop {
            let Some(loop_on_end) = self.loop_policy() else {
                self.close();
                return None;
            };

            let started = Instant::now();
            let frame = match self.read() {
                ReadResult::Frame(frame) => frame,
                ReadResult::Closed => {
                    self.close();
                    return None;
                }
                ReadResult::Exhausted => {
                    let can_loop = loop_on_end && self.kind == SourceKind::File && !self.rewound;
                    if can_loop && self.rewind() {
                        log::debug!("pipeline: end of file, looping");
                        self.rewound = true;
                        continue;
                    }
                    if self.rewound {
                        log::warn!("pipeline: source yielded no frame after rewind");
                    }
                    self.end_of_stream();
                    self.close();
                    return None;
                }
            };
            self.rewound = false;

            let Some((frame_count, sampled)) = self.count_frame() else {
                self.close();
                return None;
            };
            if !sampled {
                continue;
            }

            let mut annotated = AnnotatedFrame::new(&frame, self.kind);
            let fired = self.detect(&frame, &mut annotated, frame_count);
            let delivered = fired && self.send_alert(&annotated, frame_count);

            let fps = instantaneous_fps(started.elapsed());
            annotated.stamp_status(fps);

            let jpeg = match encode_jpeg(annotated.image(), self.shared.settings.stream_quality) {
                Ok(jpeg) => jpeg,
                Err(e) => {
                    log::warn!("pipeline: frame {} encoding failed: {}", frame_count, e);
                    continue;
                }
            };

            if !self.record_emitted(fps, delivered) {
                self.close();
                return None;
            }
            return Some(EncodedFrame {
                jpeg,
                frame_number: frame_count,
                fps,
                alerted: fired,
            });
        }
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        self.close();
    }
}

/// Lock a mutex, recovering the data if a panicking thread poisoned it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
