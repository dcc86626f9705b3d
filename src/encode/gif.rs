use std::{
    io::Write,
    sync::{Arc, Mutex},
    time::Duration,
};

use image::codecs::gif::{GifEncoder as ImageGifEncoder, Repeat};

use crate::{
    encode::{EncoderConfig, FrameEncoder, OutputFormat, check_frame, flatten_to_opaque_rgba8},
    foundation::error::{SlidecastError, SlidecastResult},
    render::FrameRGBA,
};

/// Quantizer speed passed to the GIF codec (1 = best quality, 30 = fastest).
pub const DEFAULT_GIF_SPEED: i32 = 10;

/// Animated GIF output that loops forever.
///
/// GIF delays are whole centiseconds. Delays are derived from the running total of frame
/// durations, so rounding never accumulates across frames.
pub struct GifEncoder {
    speed: i32,
    state: Option<GifState>,
}

struct GifState {
    cfg: EncoderConfig,
    codec: ImageGifEncoder<SharedBuffer>,
    out: SharedBuffer,
    scratch: Vec<u8>,
    elapsed_ms: u128,
    emitted_cs: u128,
    frames: usize,
}

impl Default for GifEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl GifEncoder {
    pub fn new() -> Self {
        Self::with_speed(DEFAULT_GIF_SPEED)
    }

    pub fn with_speed(speed: i32) -> Self {
        Self {
            speed: speed.clamp(1, 30),
            state: None,
        }
    }

    fn state_mut(&mut self) -> SlidecastResult<&mut GifState> {
        self.state
            .as_mut()
            .ok_or_else(|| SlidecastError::encoder("gif encoder not started"))
    }
}

impl FrameEncoder for GifEncoder {
    fn format(&self) -> OutputFormat {
        OutputFormat::Gif
    }

    fn begin(&mut self, cfg: EncoderConfig) -> SlidecastResult<()> {
        if cfg.canvas.width > u32::from(u16::MAX) || cfg.canvas.height > u32::from(u16::MAX) {
            return Err(SlidecastError::encoder("gif dimensions exceed u16"));
        }
        let out = SharedBuffer::default();
        let mut codec = ImageGifEncoder::new_with_speed(out.clone(), self.speed);
        codec
            .set_repeat(Repeat::Infinite)
            .map_err(|e| SlidecastError::encoder(format!("failed to initialize gif: {e}")))?;
        self.state = Some(GifState {
            cfg,
            codec,
            out,
            scratch: vec![0u8; cfg.canvas.byte_len()],
            elapsed_ms: 0,
            emitted_cs: 0,
            frames: 0,
        });
        Ok(())
    }

    fn add_frame(&mut self, frame: &FrameRGBA, duration: Duration) -> SlidecastResult<()> {
        let state = self.state_mut()?;
        check_frame(&state.cfg, frame)?;
        flatten_to_opaque_rgba8(&mut state.scratch, frame, state.cfg.background)?;

        state.elapsed_ms += duration.as_millis();
        let total_cs = (state.elapsed_ms + 5) / 10;
        let delay_cs = total_cs - state.emitted_cs;
        state.emitted_cs = total_cs;
        let delay_ms = u32::try_from(delay_cs * 10)
            .map_err(|_| SlidecastError::encoder("gif frame delay out of range"))?;

        let buffer = image::RgbaImage::from_raw(
            state.cfg.canvas.width,
            state.cfg.canvas.height,
            state.scratch.clone(),
        )
        .ok_or_else(|| SlidecastError::encoder("gif frame buffer has the wrong size"))?;
        let delay = image::Delay::from_numer_denom_ms(delay_ms, 1);
        state
            .codec
            .encode_frame(image::Frame::from_parts(buffer, 0, 0, delay))
            .map_err(|e| SlidecastError::encoder(format!("failed to encode gif frame: {e}")))?;
        state.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> SlidecastResult<Vec<u8>> {
        let state = self
            .state
            .take()
            .ok_or_else(|| SlidecastError::encoder("gif encoder not started"))?;
        if state.frames == 0 {
            return Err(SlidecastError::encoder("gif has no frames"));
        }
        let GifState {
            codec, out, frames, ..
        } = state;
        // Dropping the codec writes the GIF trailer.
        drop(codec);
        let bytes = out.take()?;
        tracing::debug!(frames, bytes = bytes.len(), "gif finalized");
        Ok(bytes)
    }
}

/// Byte sink the codec can own while the encoder keeps a handle to the output.
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn take(&self) -> SlidecastResult<Vec<u8>> {
        let mut buf = self
            .0
            .lock()
            .map_err(|_| SlidecastError::encoder("gif output buffer poisoned"))?;
        Ok(std::mem::take(&mut *buf))
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        let mut buf = self
            .0
            .lock()
            .map_err(|_| std::io::Error::other("gif output buffer poisoned"))?;
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
