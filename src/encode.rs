//! JPEG encoding for stream frames and alert snapshots.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::error::EncodeError;

/// Quality of frames emitted on the multipart stream.
pub const STREAM_JPEG_QUALITY: u8 = 75;

/// Quality of alert snapshots.
pub const ALERT_JPEG_QUALITY: u8 = 70;

pub const ALERT_WIDTH: u32 = 640;
pub const ALERT_HEIGHT: u32 = 480;

/// Compress `image` as a baseline JPEG.
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, EncodeError> {
    if !(1..=100).contains(&quality) {
        return Err(EncodeError::Quality(quality));
    }
    let mut out = Vec::with_capacity(image.as_raw().len() / 8);
    JpegEncoder::new_with_quality(&mut out, quality).encode_image(image)?;
    Ok(out)
}

/// Resize `image` to the alert resolution and compress it.
///
/// The aspect ratio is not preserved; the receiver expects a fixed size.
pub fn encode_alert_snapshot(
    image: &RgbImage,
    width: u32,
    height: u32,
    quality: u8,
) -> Result<Vec<u8>, EncodeError> {
    if image.dimensions() == (width, height) {
        return encode_jpeg(image, quality);
    }
    let resized = imageops::resize(image, width, height, FilterType::Triangle);
    encode_jpeg(&resized, quality)
}
