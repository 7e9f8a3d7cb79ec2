//! multipart/x-mixed-replace framing for the live image stream.
//!
//! Each emitted frame becomes one part:
//! `--frame\r\nContent-Type: image/jpeg\r\n\r\n<jpeg>\r\n`.
//! The HTTP layer sends [`CONTENT_TYPE`] once and then writes parts back to back.

use std::io::{self, Write};

pub const BOUNDARY: &str = "frame";

pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

const PART_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";

/// One complete part carrying `jpeg`.
pub fn frame_part(jpeg: &[u8]) -> Vec<u8> {
    let mut part = Vec::with_capacity(PART_HEADER.len() + jpeg.len() + 2);
    part.extend_from_slice(PART_HEADER);
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part
}

/// Write one part to `out` and flush it so the viewer sees the frame now.
pub fn write_part<W: Write>(out: &mut W, jpeg: &[u8]) -> io::Result<()> {
    out.write_all(PART_HEADER)?;
    out.write_all(jpeg)?;
    out.write_all(b"\r\n")?;
    out.flush()
}
