//! Session lifecycle tests: start/stop/status, looping, throttling and
//! concurrent stop.

use std::io::Write;
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use tempfile::NamedTempFile;

use stream_sentinel::detect::{BoundingBox, DetectionEngine, DetectionParams};
use stream_sentinel::{
    AlertDispatcher, DefaultOpener, Detection, DetectorBackend, Frame, FrameSource, OpenError,
    PipelineSettings, SessionStatus, SourceDescriptor, SourceKind, SourceOpener,
    StreamController,
};

fn jpeg(shade: u8, width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([shade, 255 - shade, shade / 2]));
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, 90)
        .encode_image(&image)
        .expect("encode fixture frame");
    jpeg
}

/// Camera-style JPEG: an APP1 EXIF segment right after SOI holds a thumbnail.
fn jpeg_with_thumbnail(shade: u8) -> Vec<u8> {
    let main = jpeg(shade, 48, 32);
    let mut exif = b"Exif\0\0".to_vec();
    exif.extend_from_slice(&jpeg(shade / 3, 8, 8));
    let segment_len = u16::try_from(exif.len() + 2).expect("thumbnail fits a segment");

    let mut out = main[..2].to_vec();
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&segment_len.to_be_bytes());
    out.extend_from_slice(&exif);
    out.extend_from_slice(&main[2..]);
    out
}

fn clip_of(frames: &[Vec<u8>]) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".mjpeg")
        .tempfile()
        .expect("temp clip");
    for frame in frames {
        file.write_all(frame).expect("write fixture frame");
    }
    file.flush().expect("flush clip");
    file
}

fn mjpeg_clip(shades: &[u8]) -> NamedTempFile {
    let frames: Vec<Vec<u8>> = shades.iter().map(|&shade| jpeg(shade, 48, 32)).collect();
    clip_of(&frames)
}

fn clip_path(file: &NamedTempFile) -> String {
    file.path().to_str().expect("utf-8 temp path").to_string()
}

fn unreachable_dispatcher() -> AlertDispatcher {
    let addr = TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .expect("reserve port");
    AlertDispatcher::new(addr).with_timeouts(Duration::from_millis(50), Duration::from_millis(50))
}

fn settings(loop_on_end: bool, frame_skip: u32) -> PipelineSettings {
    PipelineSettings {
        loop_on_end,
        frame_skip,
        ..PipelineSettings::default()
    }
}

fn controller(loop_on_end: bool, frame_skip: u32) -> StreamController {
    StreamController::new(
        settings(loop_on_end, frame_skip),
        DetectionEngine::new(DetectionParams::default()),
        unreachable_dispatcher(),
    )
}

fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

// ==================== Test sources ====================

/// Wraps the default opener and records a checksum of every frame read.
struct RecordingOpener {
    seen: Arc<Mutex<Vec<u64>>>,
}

struct RecordingSource {
    inner: Box<dyn FrameSource>,
    seen: Arc<Mutex<Vec<u64>>>,
}

impl SourceOpener for RecordingOpener {
    fn open(&self, descriptor: &SourceDescriptor) -> Result<Box<dyn FrameSource>, OpenError> {
        Ok(Box::new(RecordingSource {
            inner: DefaultOpener.open(descriptor)?,
            seen: Arc::clone(&self.seen),
        }))
    }
}

impl FrameSource for RecordingSource {
    fn kind(&self) -> SourceKind {
        self.inner.kind()
    }

    fn read_frame(&mut self) -> Option<Frame> {
        let frame = self.inner.read_frame()?;
        let checksum = frame.pixels().iter().map(|&p| u64::from(p)).sum();
        self.seen.lock().unwrap().push(checksum);
        Some(frame)
    }

    fn seek_to_start(&mut self) -> Result<(), OpenError> {
        self.inner.seek_to_start()
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

/// Blocks inside `open` until released, so a stop can land mid-connect.
struct GatedOpener {
    release: Mutex<Receiver<()>>,
    closed: Arc<AtomicBool>,
}

struct FlaggedSource {
    closed: Arc<AtomicBool>,
}

impl SourceOpener for GatedOpener {
    fn open(&self, _descriptor: &SourceDescriptor) -> Result<Box<dyn FrameSource>, OpenError> {
        let _ = self.release.lock().unwrap().recv();
        Ok(Box::new(FlaggedSource {
            closed: Arc::clone(&self.closed),
        }))
    }
}

impl FrameSource for FlaggedSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Network
    }

    fn read_frame(&mut self) -> Option<Frame> {
        Frame::from_rgb(vec![0; 12], 2, 2, 1)
    }

    fn seek_to_start(&mut self) -> Result<(), OpenError> {
        Ok(())
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Reports one hit per call and counts how often it ran.
struct CountingBackend {
    calls: Arc<AtomicU64>,
}

impl DetectorBackend for CountingBackend {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn infer(
        &mut self,
        frame: &Frame,
        _image_size: u32,
        _confidence_threshold: f32,
    ) -> anyhow::Result<Vec<Detection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (w, h) = (frame.width() as f32, frame.height() as f32);
        Ok(vec![Detection {
            class_id: 0,
            bbox: BoundingBox::new(0.0, 0.0, w / 2.0, h / 2.0),
            confidence: 0.95,
        }])
    }
}

// ==================== Lifecycle ====================

#[test]
fn fresh_controller_reports_ready() {
    let controller = controller(true, 0);
    let status = controller.status();
    assert!(!status.running);
    assert_eq!(status.status, SessionStatus::Ready);
    assert_eq!(status.fps, 0.0);
}

#[test]
fn missing_path_fails_without_streaming() {
    let controller = controller(true, 0);
    let response = controller.start("/definitely/not/here.mp4");
    assert!(!response.success);
    assert!(response.message.starts_with("Failed to connect"));

    let status = controller.status();
    assert!(!status.running);
    assert_eq!(status.status, SessionStatus::Failed);
    assert!(controller.frames().is_err());
}

#[test]
fn empty_source_response_serializes_for_the_control_surface() {
    let controller = controller(true, 0);
    let json = serde_json::to_value(controller.start("")).unwrap();
    assert_eq!(
        json,
        serde_json::json!({"success": false, "message": "Video source is required"})
    );
}

#[test]
fn stop_then_restart_on_the_same_descriptor() {
    let clip = mjpeg_clip(&[10, 60, 110]);
    let controller = controller(true, 0);

    assert!(controller.start(&clip_path(&clip)).success);
    let mut frames = controller.frames().unwrap();
    assert!(frames.next().is_some());
    assert!(frames.next().is_some());

    let response = controller.stop();
    assert!(response.success);
    assert_eq!(response.message, "Stream stopped");
    assert!(frames.next().is_none());
    assert!(!controller.status().running);
    assert_eq!(controller.status().fps, 0.0);

    let again = controller.start(&clip_path(&clip));
    assert!(again.success, "{}", again.message);
    assert_eq!(controller.status().status, SessionStatus::Streaming);
    let mut frames = controller.frames().unwrap();
    assert_eq!(frames.next().unwrap().frame_number, 1);
    controller.stop();
}

#[test]
fn stop_is_idempotent_in_every_state() {
    let controller = controller(true, 0);
    assert!(controller.stop().success);
    assert!(controller.stop().success);
    assert_eq!(controller.status().status, SessionStatus::Stopped);

    controller.start("stub://camera?width=8&height=8");
    controller.stop();
    controller.stop();
    assert!(!controller.status().running);
}

// ==================== End of stream ====================

#[test]
fn looping_file_returns_the_first_frame_again() {
    let clip = mjpeg_clip(&[10, 120, 230]);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let controller = StreamController::with_opener(
        settings(true, 0),
        DetectionEngine::new(DetectionParams::default()),
        unreachable_dispatcher(),
        RecordingOpener {
            seen: Arc::clone(&seen),
        },
    );

    assert!(controller.start(&clip_path(&clip)).success);
    let numbers: Vec<u64> = controller
        .frames()
        .unwrap()
        .take(7)
        .map(|f| f.frame_number)
        .collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6, 7]);

    let seen = seen.lock().unwrap();
    assert_eq!(seen[3], seen[0]);
    assert_eq!(seen[4], seen[1]);
    assert_eq!(seen[6], seen[0]);
    assert_ne!(seen[0], seen[1]);
    assert_eq!(controller.status().status, SessionStatus::Streaming);
    controller.stop();
}

#[test]
fn looping_exif_clip_keeps_streaming() {
    let clip = clip_of(&[jpeg_with_thumbnail(40), jpeg_with_thumbnail(200)]);
    let controller = controller(true, 0);

    assert!(controller.start(&clip_path(&clip)).success);
    let emitted = controller.frames().unwrap().take(10).count();
    assert_eq!(emitted, 10);
    assert_eq!(controller.status().status, SessionStatus::Streaming);
    controller.stop();
}

#[test]
fn non_looping_file_stops_at_end() {
    let clip = mjpeg_clip(&[10, 120, 230]);
    let controller = controller(false, 0);

    assert!(controller.start(&clip_path(&clip)).success);
    assert_eq!(controller.frames().unwrap().count(), 3);

    let status = controller.status();
    assert!(!status.running);
    assert_eq!(status.status, SessionStatus::Stopped);
}

#[test]
fn loop_policy_can_change_between_sessions() {
    let clip = mjpeg_clip(&[10, 120]);
    let controller = controller(true, 0);
    controller.set_loop_on_end(false);

    controller.start(&clip_path(&clip));
    assert_eq!(controller.frames().unwrap().count(), 2);
    assert_eq!(controller.status().status, SessionStatus::Stopped);
}

#[test]
fn network_stream_end_stops_even_when_looping() {
    let controller = controller(true, 0);
    controller.start("stub://camera?width=8&height=8&frames=4");
    assert_eq!(controller.frames().unwrap().count(), 4);
    assert_eq!(controller.status().status, SessionStatus::Stopped);
}

// ==================== Throttling ====================

#[test]
fn frame_skip_processes_one_of_every_k_plus_one_reads() {
    let clip = mjpeg_clip(&[0, 40, 80, 120, 160, 200]);
    let controller = controller(false, 1);

    controller.start(&clip_path(&clip));
    let numbers: Vec<u64> = controller
        .frames()
        .unwrap()
        .map(|f| f.frame_number)
        .collect();
    assert_eq!(numbers, vec![2, 4, 6]);
    assert_eq!(controller.session().frame_count, 6);
}

#[test]
fn skipped_frames_never_reach_detection() {
    let calls = Arc::new(AtomicU64::new(0));
    let mut engine = DetectionEngine::new(DetectionParams::default());
    engine
        .register(
            "restricted-item",
            vec![0],
            CountingBackend {
                calls: Arc::clone(&calls),
            },
        )
        .unwrap();
    let controller = StreamController::new(settings(true, 1), engine, unreachable_dispatcher());

    controller.start("stub://camera?width=32&height=24&frames=10");
    let frames: Vec<_> = controller.frames().unwrap().collect();

    let numbers: Vec<u64> = frames.iter().map(|f| f.frame_number).collect();
    assert_eq!(numbers, vec![2, 4, 6, 8, 10]);
    let alerted: Vec<u64> = frames
        .iter()
        .filter(|f| f.alerted)
        .map(|f| f.frame_number)
        .collect();
    assert_eq!(alerted, vec![10]);
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(controller.session().frame_count, 10);
}

// ==================== Concurrency ====================

#[test]
fn stop_from_another_thread_ends_the_stream() {
    let controller = controller(true, 0);
    assert!(controller.start("stub://camera?width=32&height=24").success);

    let frames = controller.frames().unwrap();
    let consumer = thread::spawn(move || frames.count());

    wait_for(|| controller.session().frames_emitted >= 3);
    controller.stop();

    let emitted = consumer.join().expect("consumer thread");
    assert!(emitted >= 3);
    let session = controller.session();
    assert!(!session.running);
    assert_eq!(session.status, SessionStatus::Stopped);
    assert_eq!(session.frames_emitted as usize, emitted);
}

#[test]
fn stop_while_connecting_closes_the_new_handle() {
    let (release, gate) = mpsc::channel();
    let closed = Arc::new(AtomicBool::new(false));
    let controller = StreamController::with_opener(
        settings(true, 0),
        DetectionEngine::new(DetectionParams::default()),
        unreachable_dispatcher(),
        GatedOpener {
            release: Mutex::new(gate),
            closed: Arc::clone(&closed),
        },
    );

    let starter = {
        let controller = controller.clone();
        thread::spawn(move || controller.start("stub://gated"))
    };
    wait_for(|| controller.status().status == SessionStatus::Connecting);
    assert!(controller.start("stub://other").message.contains("already running"));

    controller.stop();
    release.send(()).unwrap();

    let response = starter.join().expect("starter thread");
    assert!(!response.success);
    assert!(closed.load(Ordering::SeqCst));
    let status = controller.status();
    assert!(!status.running);
    assert_eq!(status.status, SessionStatus::Stopped);
}

#[test]
fn new_session_ends_a_stale_stream() {
    let controller = controller(true, 0);
    controller.start("stub://camera?width=8&height=8");
    let mut old = controller.frames().unwrap();
    assert!(old.next().is_some());

    controller.stop();
    controller.start("stub://camera?width=8&height=8");
    let mut current = controller.frames().unwrap();

    assert!(old.next().is_none());
    assert!(current.next().is_some());
    controller.stop();
}
