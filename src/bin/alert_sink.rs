//! alert_sink - local receiver for length-prefixed alert snapshots
//!
//! Listens on the alert endpoint, reads one payload per connection and writes
//! each image to the output directory. Stand-in for the external alerting
//! service when running end to end.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::net::TcpListener;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use stream_sentinel::transport::{read_payload, DEFAULT_ALERT_ADDR};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = DEFAULT_ALERT_ADDR)]
    listen: String,
    /// Directory receiving the alert images.
    #[arg(long, default_value = "alerts")]
    out_dir: PathBuf,
    /// Largest accepted payload in bytes.
    #[arg(long, default_value_t = 16 * 1024 * 1024)]
    max_bytes: usize,
    /// Exit after this many alerts.
    #[arg(long)]
    count: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("create {}", args.out_dir.display()))?;
    let listener =
        TcpListener::bind(&args.listen).with_context(|| format!("bind {}", args.listen))?;
    log::info!(
        "alert_sink listening on {}, writing to {}",
        listener.local_addr()?,
        args.out_dir.display()
    );

    let mut received = 0u64;
    for conn in listener.incoming() {
        let mut conn = match conn {
            Ok(conn) => conn,
            Err(e) => {
                log::warn!("accept failed: {}", e);
                continue;
            }
        };
        let peer = conn
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        conn.set_read_timeout(Some(Duration::from_secs(5)))?;

        let image = match read_payload(&mut conn, args.max_bytes) {
            Ok(image) => image,
            Err(e) => {
                log::warn!("bad alert payload from {}: {}", peer, e);
                continue;
            }
        };

        received += 1;
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let path = args.out_dir.join(format!("alert-{:05}-{}.jpg", received, stamp));
        fs::write(&path, &image).with_context(|| format!("write {}", path.display()))?;
        log::info!(
            "alert #{} from {}: {} bytes -> {}",
            received,
            peer,
            image.len(),
            path.display()
        );

        if args.count.is_some_and(|count| received >= count) {
            break;
        }
    }
    Ok(())
}
