//! Local file decoding through FFmpeg.
//!
//! Used for every container that is not plain MJPEG. Frames are converted to
//! RGB24 in memory; at end of file the decoder is drained before reporting
//! end of stream.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;

use crate::frame::Frame;

pub(crate) struct FfmpegFileSource {
    path: String,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    eof_sent: bool,
}

impl FfmpegFileSource {
    pub(crate) fn open(path: &str) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open '{}' with ffmpeg", path))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("file has no video track"))?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        Ok(Self {
            path: path.to_string(),
            input,
            stream_index,
            decoder,
            scaler,
            eof_sent: false,
        })
    }

    pub(crate) fn next_frame(&mut self, sequence: u64) -> Option<Frame> {
        match self.decode_next(sequence) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("FileSource: ffmpeg read failed for {}: {:#}", self.path, e);
                None
            }
        }
    }

    /// Seek to timestamp 0 and drop whatever the decoder still buffers.
    pub(crate) fn rewind(&mut self) -> Result<()> {
        self.input
            .seek(0, ..0)
            .with_context(|| format!("seek to start of '{}'", self.path))?;
        self.decoder.flush();
        self.eof_sent = false;
        Ok(())
    }

    fn decode_next(&mut self, sequence: u64) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();

        if self.decoder.receive_frame(&mut decoded).is_ok() {
            return convert(&mut self.scaler, &decoded, sequence).map(Some);
        }
        if self.eof_sent {
            return Ok(None);
        }

        for (stream, packet) in self.input.packets() {
            if stream.index() != self.stream_index {
                continue;
            }
            self.decoder
                .send_packet(&packet)
                .context("send packet to ffmpeg decoder")?;
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return convert(&mut self.scaler, &decoded, sequence).map(Some);
            }
        }

        self.decoder.send_eof().context("drain ffmpeg decoder")?;
        self.eof_sent = true;
        if self.decoder.receive_frame(&mut decoded).is_ok() {
            return convert(&mut self.scaler, &decoded, sequence).map(Some);
        }
        Ok(None)
    }
}

fn convert(
    scaler: &mut ffmpeg::software::scaling::Context,
    decoded: &ffmpeg::frame::Video,
    sequence: u64,
) -> Result<Frame> {
    let mut rgb_frame = ffmpeg::frame::Video::empty();
    scaler
        .run(decoded, &mut rgb_frame)
        .context("scale frame to RGB")?;
    let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;
    Frame::from_rgb(pixels, width, height, sequence)
        .ok_or_else(|| anyhow!("ffmpeg frame {}x{} has a short buffer", width, height))
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(
            data.get(start..start + row_bytes)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
