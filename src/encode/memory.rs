//! In-memory encoders for tests and debugging.
//!
//! Both keep their recordings behind an `Arc`, so a clone held by the caller can inspect what an
//! export produced after the encoder itself was consumed.

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use crate::{
    encode::{CaptureClock, CaptureEncoder, EncoderConfig, FrameEncoder, OutputFormat, check_frame},
    foundation::error::{SlidecastError, SlidecastResult},
    render::FrameRGBA,
};

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedFrame {
    pub frame: FrameRGBA,
    pub duration: Duration,
}

#[derive(Debug, Default)]
struct FramesLog {
    cfg: Option<EncoderConfig>,
    frames: Vec<RecordedFrame>,
    finished: bool,
}

/// Frame-addressable encoder that records every `(frame, duration)` pair.
#[derive(Clone, Debug, Default)]
pub struct MemoryFrames {
    log: Arc<Mutex<FramesLog>>,
}

impl MemoryFrames {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> SlidecastResult<MutexGuard<'_, FramesLog>> {
        self.log
            .lock()
            .map_err(|_| SlidecastError::encoder("memory encoder log poisoned"))
    }

    pub fn config(&self) -> Option<EncoderConfig> {
        self.lock().ok().and_then(|log| log.cfg)
    }

    pub fn frames(&self) -> Vec<RecordedFrame> {
        self.lock().map(|log| log.frames.clone()).unwrap_or_default()
    }

    pub fn total_duration(&self) -> Duration {
        self.lock()
            .map(|log| log.frames.iter().map(|f| f.duration).sum())
            .unwrap_or_default()
    }

    pub fn is_finished(&self) -> bool {
        self.lock().map(|log| log.finished).unwrap_or(false)
    }
}

impl FrameEncoder for MemoryFrames {
    fn format(&self) -> OutputFormat {
        OutputFormat::Raw
    }

    fn begin(&mut self, cfg: EncoderConfig) -> SlidecastResult<()> {
        let mut log = self.lock()?;
        *log = FramesLog {
            cfg: Some(cfg),
            ..FramesLog::default()
        };
        Ok(())
    }

    fn add_frame(&mut self, frame: &FrameRGBA, duration: Duration) -> SlidecastResult<()> {
        let mut log = self.lock()?;
        let cfg = log
            .cfg
            .ok_or_else(|| SlidecastError::encoder("memory encoder not started"))?;
        check_frame(&cfg, frame)?;
        log.frames.push(RecordedFrame {
            frame: frame.clone(),
            duration,
        });
        Ok(())
    }

    fn finish(&mut self) -> SlidecastResult<Vec<u8>> {
        let mut log = self.lock()?;
        log.finished = true;
        Ok(log
            .frames
            .iter()
            .flat_map(|f| f.frame.data.iter().copied())
            .collect())
    }
}

/// One surface update observed by [`MemoryCapture`].
#[derive(Clone, Debug, PartialEq)]
pub struct Presentation {
    pub at: Duration,
    pub frame: FrameRGBA,
}

#[derive(Debug, Default)]
struct CaptureLog {
    cfg: Option<EncoderConfig>,
    clock: Option<CaptureClock>,
    presented: Vec<Presentation>,
    /// Sampled output frames, as indices into `presented`.
    samples: Vec<usize>,
    stopped_at: Option<Duration>,
}

impl CaptureLog {
    fn sample_until(&mut self, at: Duration) -> SlidecastResult<()> {
        let clock = self
            .clock
            .as_mut()
            .ok_or_else(|| SlidecastError::encoder("memory capture not started"))?;
        let n = clock.samples_until(at);
        if let Some(last) = self.presented.len().checked_sub(1) {
            self.samples
                .extend(std::iter::repeat_n(last, n as usize));
        }
        Ok(())
    }
}

/// Stream-captured encoder that samples presentations at the capture rate, like ffmpeg capture.
#[derive(Clone, Debug, Default)]
pub struct MemoryCapture {
    log: Arc<Mutex<CaptureLog>>,
}

impl MemoryCapture {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> SlidecastResult<MutexGuard<'_, CaptureLog>> {
        self.log
            .lock()
            .map_err(|_| SlidecastError::encoder("memory capture log poisoned"))
    }

    pub fn presentations(&self) -> Vec<Presentation> {
        self.lock()
            .map(|log| log.presented.clone())
            .unwrap_or_default()
    }

    /// Number of frames sampled at the capture rate.
    pub fn sampled_frames(&self) -> usize {
        self.lock().map(|log| log.samples.len()).unwrap_or(0)
    }

    pub fn stopped_at(&self) -> Option<Duration> {
        self.lock().ok().and_then(|log| log.stopped_at)
    }
}

impl CaptureEncoder for MemoryCapture {
    fn format(&self) -> OutputFormat {
        OutputFormat::Raw
    }

    fn begin(&mut self, cfg: EncoderConfig) -> SlidecastResult<()> {
        let mut log = self.lock()?;
        *log = CaptureLog {
            cfg: Some(cfg),
            clock: Some(CaptureClock::new(cfg.fps)),
            ..CaptureLog::default()
        };
        Ok(())
    }

    fn present(&mut self, frame: &FrameRGBA, at: Duration) -> SlidecastResult<()> {
        let mut log = self.lock()?;
        let cfg = log
            .cfg
            .ok_or_else(|| SlidecastError::encoder("memory capture not started"))?;
        check_frame(&cfg, frame)?;
        log.sample_until(at)?;
        log.presented.push(Presentation {
            at,
            frame: frame.clone(),
        });
        Ok(())
    }

    fn finish(&mut self, at: Duration) -> SlidecastResult<Vec<u8>> {
        let mut log = self.lock()?;
        log.sample_until(at)?;
        log.stopped_at = Some(at);
        let bytes = log
            .samples
            .iter()
            .filter_map(|&i| log.presented.get(i))
            .flat_map(|p| p.frame.data.iter().copied())
            .collect();
        Ok(bytes)
    }
}
