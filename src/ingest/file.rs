//! Local file frame source.
//!
//! `FileSource` decodes frames from a local video file. Files are bounded and
//! seekable, so the pipeline can rewind them when looping is enabled.
//!
//! Motion-JPEG files (a plain concatenation of JPEG images, as written by most
//! IP cameras and by `ffmpeg -f mjpeg`) are handled natively. Other containers
//! need the ingest-file-ffmpeg feature.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use image::ImageFormat;

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::{FrameSource, SourceKind};
use crate::error::OpenError;
use crate::frame::Frame;

const MJPEG_EXTENSIONS: &[&str] = &["mjpeg", "mjpg", "jpg", "jpeg"];

/// Local file frame source.
pub struct FileSource {
    path: String,
    backend: FileBackend,
    frames_read: u64,
    closed: bool,
}

enum FileBackend {
    Mjpeg(MjpegFile),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn open(path: &str) -> Result<Self, OpenError> {
        if !Path::new(path).is_file() {
            return Err(OpenError::unavailable(path, "no such file"));
        }
        let backend = if is_mjpeg_path(path) {
            FileBackend::Mjpeg(MjpegFile::open(path)?)
        } else {
            open_container(path)?
        };
        log::info!("FileSource: opened {} ({})", path, backend.name());
        Ok(Self {
            path: path.to_string(),
            backend,
            frames_read: 0,
            closed: false,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Frames handed out since open, rewinds included.
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }
}

impl FrameSource for FileSource {
    fn kind(&self) -> SourceKind {
        SourceKind::File
    }

    fn read_frame(&mut self) -> Option<Frame> {
        if self.closed {
            return None;
        }
        let sequence = self.frames_read + 1;
        let frame = match &mut self.backend {
            FileBackend::Mjpeg(file) => file.next_frame(sequence),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(sequence),
        }?;
        self.frames_read = sequence;
        Some(frame)
    }

    fn seek_to_start(&mut self) -> Result<(), OpenError> {
        if self.closed {
            return Err(OpenError::unavailable(&self.path, "source is closed"));
        }
        log::debug!("FileSource: rewinding {}", self.path);
        match &mut self.backend {
            FileBackend::Mjpeg(file) => {
                file.rewind();
                Ok(())
            }
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source
                .rewind()
                .map_err(|e| OpenError::unavailable(&self.path, format!("{:#}", e))),
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let FileBackend::Mjpeg(file) = &mut self.backend {
            file.release();
        }
        log::info!(
            "FileSource: closed {} after {} frames",
            self.path,
            self.frames_read
        );
    }
}

impl Drop for FileSource {
    fn drop(&mut self) {
        self.close();
    }
}

impl FileBackend {
    fn name(&self) -> &'static str {
        match self {
            FileBackend::Mjpeg(_) => "mjpeg",
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(_) => "ffmpeg",
        }
    }
}

#[cfg(feature = "ingest-file-ffmpeg")]
fn open_container(path: &str) -> Result<FileBackend, OpenError> {
    FfmpegFileSource::open(path)
        .map(FileBackend::Ffmpeg)
        .map_err(|e| OpenError::unavailable(path, format!("{:#}", e)))
}

#[cfg(not(feature = "ingest-file-ffmpeg"))]
fn open_container(path: &str) -> Result<FileBackend, OpenError> {
    Err(OpenError::Unsupported {
        what: format!("decoding '{}'", path),
        feature: "ingest-file-ffmpeg",
    })
}

fn is_mjpeg_path(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            MJPEG_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

// ----------------------------------------------------------------------------
// Motion-JPEG backend
// ----------------------------------------------------------------------------

const MARKER: u8 = 0xFF;
const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const TEM: u8 = 0x01;
const RST0: u8 = 0xD0;
const RST7: u8 = 0xD7;

/// Byte range of one JPEG image inside the file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FrameSpan {
    offset: u64,
    len: usize,
}

/// Frames are indexed once at open and read from disk on demand.
struct MjpegFile {
    file: Option<File>,
    frames: Vec<FrameSpan>,
    cursor: usize,
}

impl MjpegFile {
    fn open(path: &str) -> Result<Self, OpenError> {
        let file = File::open(path).map_err(|e| OpenError::unavailable(path, e))?;
        let frames =
            index_frames(BufReader::new(&file)).map_err(|e| OpenError::unavailable(path, e))?;
        if frames.is_empty() {
            return Err(OpenError::unavailable(path, "file holds no JPEG frames"));
        }
        log::debug!("FileSource: indexed {} MJPEG frames in {}", frames.len(), path);
        Ok(Self {
            file: Some(file),
            frames,
            cursor: 0,
        })
    }

    fn next_frame(&mut self, sequence: u64) -> Option<Frame> {
        let span = *self.frames.get(self.cursor)?;
        let file = self.file.as_mut()?;
        self.cursor += 1;

        let mut jpeg = vec![0u8; span.len];
        let read = file
            .seek(SeekFrom::Start(span.offset))
            .and_then(|_| file.read_exact(&mut jpeg));
        if let Err(e) = read {
            log::warn!("FileSource: frame {} could not be read: {}", self.cursor, e);
            return None;
        }

        match image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg) {
            Ok(decoded) => Some(Frame::from_image(decoded.to_rgb8(), sequence)),
            Err(e) => {
                log::warn!("FileSource: frame {} failed to decode: {}", self.cursor, e);
                None
            }
        }
    }

    fn rewind(&mut self) {
        self.cursor = 0;
    }

    fn release(&mut self) {
        self.file = None;
        self.frames.clear();
        self.cursor = 0;
    }
}

/// Walk the JPEG marker structure of a concatenated stream and return the
/// span of every complete image.
///
/// Marker segments are skipped by their length, so images embedded in
/// metadata (EXIF thumbnails) are not mistaken for frames. Entropy-coded data
/// is scanned byte by byte up to the next real marker. Bytes between images
/// are ignored and a truncated trailing image is dropped.
fn index_frames<R: Read>(reader: R) -> io::Result<Vec<FrameSpan>> {
    let mut scanner = Scanner::new(reader);
    let mut frames = Vec::new();
    let mut previous = None;

    while let Some(byte) = scanner.next()? {
        if previous != Some(MARKER) || byte != SOI {
            previous = Some(byte);
            continue;
        }
        previous = None;
        let offset = scanner.pos - 2;
        match scan_to_eoi(&mut scanner)? {
            Some(end) => frames.push(FrameSpan {
                offset,
                len: (end - offset) as usize,
            }),
            None => {
                log::debug!("FileSource: dropping truncated frame at byte {}", offset);
                break;
            }
        }
    }
    Ok(frames)
}

/// Consume one image after its SOI. Returns the offset just past EOI, or
/// `None` if the data ends first.
fn scan_to_eoi<R: Read>(scanner: &mut Scanner<R>) -> io::Result<Option<u64>> {
    let Some(mut marker) = scanner.next_marker()? else {
        return Ok(None);
    };
    loop {
        match marker {
            EOI => return Ok(Some(scanner.pos)),
            TEM | RST0..=RST7 => {}
            SOS => {
                if !scanner.skip_segment()? {
                    return Ok(None);
                }
                match scanner.scan_entropy()? {
                    Some(next) => {
                        marker = next;
                        continue;
                    }
                    None => return Ok(None),
                }
            }
            _ => {
                if !scanner.skip_segment()? {
                    return Ok(None);
                }
            }
        }
        marker = match scanner.next_marker()? {
            Some(next) => next,
            None => return Ok(None),
        };
    }
}

struct Scanner<R> {
    bytes: io::Bytes<R>,
    pos: u64,
}

impl<R: Read> Scanner<R> {
    fn new(reader: R) -> Self {
        Self {
            bytes: reader.bytes(),
            pos: 0,
        }
    }

    fn next(&mut self) -> io::Result<Option<u8>> {
        match self.bytes.next() {
            Some(Ok(byte)) => {
                self.pos += 1;
                Ok(Some(byte))
            }
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    /// Next marker code, skipping fill bytes.
    fn next_marker(&mut self) -> io::Result<Option<u8>> {
        let mut after_marker = false;
        while let Some(byte) = self.next()? {
            if byte == MARKER {
                after_marker = true;
            } else if after_marker {
                return Ok(Some(byte));
            }
        }
        Ok(None)
    }

    /// Skip a marker segment using its big-endian length. Returns false at
    /// end of data.
    fn skip_segment(&mut self) -> io::Result<bool> {
        let (Some(hi), Some(lo)) = (self.next()?, self.next()?) else {
            return Ok(false);
        };
        let len = u16::from_be_bytes([hi, lo]).saturating_sub(2);
        for _ in 0..len {
            if self.next()?.is_none() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Scan entropy-coded data and return the marker that ends it. Stuffed
    /// zero bytes and restart markers belong to the data.
    fn scan_entropy(&mut self) -> io::Result<Option<u8>> {
        while let Some(byte) = self.next()? {
            if byte != MARKER {
                continue;
            }
            let mut code = self.next()?;
            while code == Some(MARKER) {
                code = self.next()?;
            }
            match code {
                None => return Ok(None),
                Some(0x00) | Some(RST0..=RST7) => {}
                Some(marker) => return Ok(Some(marker)),
            }
        }
        Ok(None)
    }
}
