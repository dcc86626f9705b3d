//! Encoder capability used by the export pipeline.
//!
//! Two integration styles exist: frame-addressable encoders receive discrete frames with an
//! explicit display duration and never wait on a clock, while stream-captured encoders observe a
//! surface that is redrawn over real elapsed time and sample it at their own rate.

use std::time::Duration;

use crate::{
    foundation::{
        core::{Canvas, Fps},
        error::{SlidecastError, SlidecastResult},
        math::mul_div255_u16,
    },
    render::FrameRGBA,
};

pub mod ffmpeg;
pub mod gif;
pub mod memory;

pub use ffmpeg::{FfmpegCapture, negotiate_video_format};
pub use gif::GifEncoder;
pub use memory::{MemoryCapture, MemoryFrames};

/// Container format of an encoded artifact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Gif,
    Mp4,
    Webm,
    /// Uncompressed RGBA frames, produced by the in-memory encoders.
    Raw,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Gif => "gif",
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
            Self::Raw => "rgba",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Gif => "image/gif",
            Self::Mp4 => "video/mp4",
            Self::Webm => "video/webm",
            Self::Raw => "application/octet-stream",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Configuration handed to an encoder when an export starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncoderConfig {
    pub canvas: Canvas,
    pub fps: Fps,
    /// Straight-alpha color used to flatten any non-opaque pixel.
    pub background: [u8; 4],
}

/// Accepts discrete `(frame, duration)` pairs.
pub trait FrameEncoder: Send {
    fn format(&self) -> OutputFormat;
    /// Called once before any frame is added.
    fn begin(&mut self, cfg: EncoderConfig) -> SlidecastResult<()>;
    /// Append one frame shown for `duration`.
    fn add_frame(&mut self, frame: &FrameRGBA, duration: Duration) -> SlidecastResult<()>;
    /// Finalize and return the encoded bytes.
    fn finish(&mut self) -> SlidecastResult<Vec<u8>>;
}

/// Observes a continuously redrawn surface over elapsed time.
pub trait CaptureEncoder: Send {
    fn format(&self) -> OutputFormat;
    /// Called once when capture starts; elapsed time is measured from here.
    fn begin(&mut self, cfg: EncoderConfig) -> SlidecastResult<()>;
    /// The surface shows `frame` from `at` onwards.
    fn present(&mut self, frame: &FrameRGBA, at: Duration) -> SlidecastResult<()>;
    /// Stop capturing at `at` and return the encoded bytes.
    fn finish(&mut self, at: Duration) -> SlidecastResult<Vec<u8>>;
}

/// An encoder backend in one of its two integration styles.
pub enum Encoder {
    FrameAddressable(Box<dyn FrameEncoder>),
    StreamCaptured(Box<dyn CaptureEncoder>),
}

impl Encoder {
    /// Animated GIF, looping forever.
    pub fn gif() -> Self {
        Self::FrameAddressable(Box::new(GifEncoder::new()))
    }

    /// Video capture through ffmpeg in the best container this machine supports.
    pub fn video() -> SlidecastResult<Self> {
        let format = negotiate_video_format()?;
        Ok(Self::StreamCaptured(Box::new(FfmpegCapture::new(format)?)))
    }

    pub fn format(&self) -> OutputFormat {
        match self {
            Self::FrameAddressable(e) => e.format(),
            Self::StreamCaptured(e) => e.format(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::FrameAddressable(_) => "frame-addressable",
            Self::StreamCaptured(_) => "stream-captured",
        }
    }
}

impl std::fmt::Debug for Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encoder")
            .field("kind", &self.kind())
            .field("format", &self.format())
            .finish()
    }
}

/// Fixed-rate sampler for stream capture: how many output frames a span of elapsed time covers.
#[derive(Clone, Copy, Debug)]
pub(crate) struct CaptureClock {
    fps: Fps,
    emitted: u64,
}

impl CaptureClock {
    pub(crate) fn new(fps: Fps) -> Self {
        Self { fps, emitted: 0 }
    }

    /// Number of new samples needed to cover `[0, at)`; advances the clock.
    pub(crate) fn samples_until(&mut self, at: Duration) -> u64 {
        let at_ms = at.as_millis();
        let target = (at_ms * u128::from(self.fps.get()) + 500) / 1000;
        let target = u64::try_from(target).unwrap_or(u64::MAX);
        let n = target.saturating_sub(self.emitted);
        self.emitted = self.emitted.max(target);
        n
    }

    pub(crate) fn emitted(&self) -> u64 {
        self.emitted
    }
}

pub(crate) fn check_frame(cfg: &EncoderConfig, frame: &FrameRGBA) -> SlidecastResult<()> {
    if frame.width != cfg.canvas.width || frame.height != cfg.canvas.height {
        return Err(SlidecastError::encoder(format!(
            "frame size mismatch: got {}x{}, expected {}x{}",
            frame.width, frame.height, cfg.canvas.width, cfg.canvas.height
        )));
    }
    if frame.data.len() != cfg.canvas.byte_len() {
        return Err(SlidecastError::encoder(
            "frame.data size mismatch with width*height*4",
        ));
    }
    Ok(())
}

/// Flatten an RGBA8 frame over `bg_rgba` into opaque straight RGBA8.
pub(crate) fn flatten_to_opaque_rgba8(
    dst: &mut [u8],
    frame: &FrameRGBA,
    bg_rgba: [u8; 4],
) -> SlidecastResult<()> {
    let src = frame.data.as_slice();
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(SlidecastError::encoder(
            "flatten_to_opaque_rgba8 expects equal-length rgba8 buffers",
        ));
    }

    let [bg_r, bg_g, bg_b, _] = bg_rgba.map(u16::from);
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let a = u16::from(s[3]);
        if a == 255 {
            d.copy_from_slice(s);
            continue;
        }

        let inv = 255 - a;
        let channel = |c: u8, bg: u16| {
            let c = u16::from(c);
            let c = if frame.premultiplied {
                c
            } else {
                mul_div255_u16(c, a)
            };
            (c + mul_div255_u16(bg, inv)).min(255) as u8
        };
        d[0] = channel(s[0], bg_r);
        d[1] = channel(s[1], bg_g);
        d[2] = channel(s[2], bg_b);
        d[3] = 255;
    }
    Ok(())
}
