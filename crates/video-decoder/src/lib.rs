//! Sequential video decoding for the face pipeline
//!
//! [`FrameSource`] is the seam between the pipeline driver and the decode
//! backend. [`VideoStream`] implements it on top of ffmpeg-next: frames are
//! decoded strictly in order and converted to RGB24 only when the caller
//! asks for pixels, so skipped frames cost a decode but no conversion.

use ffmpeg_next as ffmpeg;
use image::RgbImage;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, info, warn};
use video_faces_common::{Frame, VideoInfo};

/// Microseconds per second, the unit ffmpeg uses for container-level seeks
const AV_TIME_BASE_US: f64 = 1_000_000.0;

/// Decode errors
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Failed to open input {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("No video stream found in {0}")]
    NoVideoStream(PathBuf),

    #[error("Corrupt frame at index {index}")]
    CorruptFrame { index: u64 },

    #[error("Seek to {seconds}s failed: {reason}")]
    Seek { seconds: f64, reason: String },

    #[error("FFmpeg error: {0}")]
    FFmpegError(String),
}

impl DecodeError {
    /// A recoverable error consumed exactly one frame; reading may continue.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DecodeError::CorruptFrame { .. })
    }
}

/// Ordered source of decoded frames
pub trait FrameSource {
    /// Stream metadata, available as soon as the source is open
    fn info(&self) -> VideoInfo;

    /// Best-effort seek to `seconds` from the start of the stream.
    ///
    /// Backends may land on the nearest preceding keyframe instead of the
    /// exact position.
    fn seek(&mut self, seconds: f64) -> Result<(), DecodeError>;

    /// Decode the next frame. `Ok(None)` signals end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>, DecodeError>;

    /// Advance past the next frame without materializing its pixels.
    ///
    /// Returns `Ok(false)` at end of stream. A corrupt frame still counts as
    /// consumed.
    fn skip_frame(&mut self) -> Result<bool, DecodeError> {
        match self.next_frame() {
            Ok(frame) => Ok(frame.is_some()),
            Err(e) if e.is_recoverable() => Ok(true),
            Err(e) => Err(e),
        }
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn info(&self) -> VideoInfo {
        (**self).info()
    }

    fn seek(&mut self, seconds: f64) -> Result<(), DecodeError> {
        (**self).seek(seconds)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, DecodeError> {
        (**self).next_frame()
    }

    fn skip_frame(&mut self) -> Result<bool, DecodeError> {
        (**self).skip_frame()
    }
}

/// Initialize `FFmpeg` library once per process
fn init_ffmpeg() -> Result<(), DecodeError> {
    static INIT: OnceLock<Result<(), String>> = OnceLock::new();
    INIT.get_or_init(|| ffmpeg::init().map_err(|e| e.to_string()))
        .clone()
        .map_err(|e| DecodeError::FFmpegError(format!("Failed to initialize FFmpeg: {e}")))
}

/// Open ffmpeg decode handle over one video file
///
/// The demuxer, decoder and scaler are released when the stream is dropped.
pub struct VideoStream {
    path: PathBuf,
    input: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    info: VideoInfo,
    /// Decoded but not yet consumed frames, tagged with their stream index
    pending: VecDeque<(u64, ffmpeg::frame::Video)>,
    next_index: u64,
    eof_sent: bool,
    skipped_packets: u64,
}

impl VideoStream {
    /// Open `path` and prepare an RGB24 decode of its best video stream
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Open`] if the container cannot be opened or the
    /// decoder cannot be created, and [`DecodeError::NoVideoStream`] if the
    /// file has no video.
    pub fn open(path: &Path) -> Result<Self, DecodeError> {
        init_ffmpeg()?;

        let open_err = |reason: String| DecodeError::Open {
            path: path.to_path_buf(),
            reason,
        };

        let input = ffmpeg::format::input(&path).map_err(|e| open_err(e.to_string()))?;

        let (stream_index, fps, frame_count, decoder) = {
            let stream = input
                .streams()
                .best(ffmpeg::media::Type::Video)
                .ok_or_else(|| DecodeError::NoVideoStream(path.to_path_buf()))?;

            let rate = stream.avg_frame_rate();
            let rate = if rate.numerator() > 0 && rate.denominator() > 0 {
                rate
            } else {
                stream.rate()
            };
            let fps = if rate.denominator() > 0 {
                f64::from(rate.numerator()) / f64::from(rate.denominator())
            } else {
                0.0
            };

            // nb_frames as written by the muxer; reported verbatim even when 0
            let frame_count = u64::try_from(stream.frames()).unwrap_or(0);

            let decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
                .map_err(|e| open_err(format!("Failed to create context: {e}")))?
                .decoder()
                .video()
                .map_err(|e| open_err(format!("Failed to create decoder: {e}")))?;

            (stream.index(), fps, frame_count, decoder)
        };

        let width = decoder.width();
        let height = decoder.height();

        let scaler = ffmpeg::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg::format::Pixel::RGB24,
            width,
            height,
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| open_err(format!("Failed to create scaler: {e}")))?;

        let info = VideoInfo {
            fps,
            width,
            height,
            frame_count,
        };

        info!(
            "Opened {}: {}x{} @ {:.3} fps, {} frames reported",
            path.display(),
            width,
            height,
            fps,
            frame_count
        );

        Ok(Self {
            path: path.to_path_buf(),
            input,
            decoder,
            scaler,
            stream_index,
            info,
            pending: VecDeque::new(),
            next_index: 0,
            eof_sent: false,
            skipped_packets: 0,
        })
    }

    /// Path this stream was opened from
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decode until at least one frame is pending or the stream is exhausted
    fn fill_pending(&mut self) {
        while self.pending.is_empty() && !self.eof_sent {
            match self.input.packets().next() {
                Some((stream, packet)) => {
                    if stream.index() != self.stream_index {
                        continue;
                    }
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        self.skipped_packets += 1;
                        warn!(
                            "Dropping undecodable packet in {}: {}",
                            self.path.display(),
                            e
                        );
                        continue;
                    }
                }
                None => {
                    // Flush frames buffered inside the decoder
                    if let Err(e) = self.decoder.send_eof() {
                        debug!("send_eof failed for {}: {}", self.path.display(), e);
                    }
                    self.eof_sent = true;
                }
            }
            self.receive_available();
        }
    }

    fn receive_available(&mut self) {
        loop {
            let mut decoded = ffmpeg::frame::Video::empty();
            if self.decoder.receive_frame(&mut decoded).is_err() {
                break;
            }
            self.pending.push_back((self.next_index, decoded));
            self.next_index += 1;
        }
    }

    fn to_rgb(&mut self, decoded: &ffmpeg::frame::Video) -> Result<RgbImage, String> {
        let mut converted = ffmpeg::frame::Video::empty();
        self.scaler
            .run(decoded, &mut converted)
            .map_err(|e| format!("Failed to convert frame: {e}"))?;

        let width = converted.width();
        let height = converted.height();
        let row_len = width as usize * 3;
        let stride = converted.stride(0);
        let plane = converted.data(0);

        let mut data = Vec::with_capacity(row_len * height as usize);
        for y in 0..height as usize {
            let row_start = y * stride;
            let row = plane
                .get(row_start..row_start + row_len)
                .ok_or_else(|| "RGB plane shorter than expected".to_string())?;
            data.extend_from_slice(row);
        }

        RgbImage::from_raw(width, height, data)
            .ok_or_else(|| "RGB buffer does not match frame dimensions".to_string())
    }
}

impl FrameSource for VideoStream {
    fn info(&self) -> VideoInfo {
        self.info
    }

    #[allow(clippy::cast_possible_truncation)]
    fn seek(&mut self, seconds: f64) -> Result<(), DecodeError> {
        if seconds <= 0.0 {
            return Ok(());
        }

        let ts = (seconds * AV_TIME_BASE_US) as i64;
        self.input
            .seek(ts, ..ts)
            .map_err(|e| DecodeError::Seek {
                seconds,
                reason: e.to_string(),
            })?;
        self.decoder.flush();
        self.pending.clear();

        debug!("Seeked {} to {:.3}s", self.path.display(), seconds);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, DecodeError> {
        self.fill_pending();
        let Some((index, decoded)) = self.pending.pop_front() else {
            return Ok(None);
        };

        if decoded.is_corrupt() {
            return Err(DecodeError::CorruptFrame { index });
        }

        match self.to_rgb(&decoded) {
            Ok(image) => Ok(Some(Frame { index, image })),
            Err(reason) => {
                warn!(
                    "Frame {} of {} could not be converted: {}",
                    index,
                    self.path.display(),
                    reason
                );
                Err(DecodeError::CorruptFrame { index })
            }
        }
    }

    fn skip_frame(&mut self) -> Result<bool, DecodeError> {
        self.fill_pending();
        Ok(self.pending.pop_front().is_some())
    }
}

impl Drop for VideoStream {
    fn drop(&mut self) {
        debug!(
            "Released decode handle for {} after {} frames ({} packets dropped)",
            self.path.display(),
            self.next_index,
            self.skipped_packets
        );
    }
}
