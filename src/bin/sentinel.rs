//! sentinel - watch one video source and re-stream it with detections
//!
//! This binary:
//! 1. Loads configuration (SENTINEL_CONFIG file + environment overrides)
//! 2. Builds the detection engine and alert dispatcher
//! 3. Starts a session on the requested source
//! 4. Writes the annotated multipart/x-mixed-replace stream to stdout or a file
//! 5. Stops cleanly on Ctrl-C

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use stream_sentinel::transport::{multipart, CONTENT_TYPE};
use stream_sentinel::{SentinelConfig, StreamController};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Video file path or stream URL (defaults to source.default / SENTINEL_SOURCE).
    #[arg(long)]
    source: Option<String>,
    /// Write the multipart stream here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Stop after emitting this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
    /// Process one of every N+1 frames.
    #[arg(long)]
    frame_skip: Option<u32>,
    /// Do not rewind file sources at end of file.
    #[arg(long)]
    no_loop: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = SentinelConfig::load()?;
    if let Some(frame_skip) = args.frame_skip {
        config.source.frame_skip = frame_skip;
    }
    if args.no_loop {
        config.source.loop_on_end = false;
    }
    let source = args
        .source
        .clone()
        .or_else(|| config.source.default.clone())
        .ok_or_else(|| anyhow!("no video source: pass --source or set SENTINEL_SOURCE"))?;

    let controller = StreamController::from_config(&config)?;
    log::info!(
        "alerts go to {} after {} consecutive detections",
        config.alert.addr,
        config.alert.threshold
    );

    let interrupt = controller.clone();
    ctrlc::set_handler(move || {
        log::info!("shutdown signal received, stopping stream...");
        interrupt.stop();
    })
    .context("install Ctrl-C handler")?;

    let response = controller.start(&source);
    if !response.success {
        return Err(anyhow!(response.message));
    }
    log::info!("{}", response.message);

    let mut out: Box<dyn Write> = match &args.out {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("create {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    };
    log::info!("stream content type: {}", CONTENT_TYPE);

    let mut frames = controller.frames()?;
    let mut emitted = 0u64;
    let mut last_health_log = Instant::now();

    for frame in frames.by_ref() {
        if let Err(e) = multipart::write_part(&mut out, &frame.jpeg) {
            log::warn!("stream output closed: {}", e);
            break;
        }
        emitted += 1;
        if frame.alerted {
            log::warn!("alert raised at frame {}", frame.frame_number);
        }

        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            let session = controller.session();
            log::info!(
                "status={} fps={:.2} frames_read={} emitted={} alerts_sent={}",
                session.status,
                session.current_fps,
                session.frame_count,
                session.frames_emitted,
                session.alerts_sent
            );
            last_health_log = Instant::now();
        }

        if args.max_frames.is_some_and(|max| emitted >= max) {
            log::info!("reached --max-frames {}", emitted);
            break;
        }
    }
    frames.close();

    controller.stop();
    out.flush().context("flush stream output")?;

    let session = controller.session();
    log::info!(
        "sentinel finished: {} frames emitted, {} alerts sent, final status {}",
        emitted,
        session.alerts_sent,
        session.status
    );
    Ok(())
}
