use std::{
    io::Read,
    path::PathBuf,
    process::{Child, ChildStdin, Command, Stdio},
    time::Duration,
};

use crate::{
    encode::{
        CaptureClock, CaptureEncoder, EncoderConfig, OutputFormat, check_frame,
        flatten_to_opaque_rgba8,
    },
    foundation::error::{SlidecastError, SlidecastResult},
    render::FrameRGBA,
};

/// Pick the video container from the `ffmpeg -encoders` listing.
pub fn pick_video_format(encoders_listing: &str) -> SlidecastResult<OutputFormat> {
    let has = |name: &str| {
        encoders_listing
            .lines()
            .any(|line| line.split_whitespace().nth(1) == Some(name))
    };
    if has("libx264") {
        Ok(OutputFormat::Mp4)
    } else if has("libvpx-vp9") {
        Ok(OutputFormat::Webm)
    } else {
        Err(SlidecastError::encoder("video capture is not supported"))
    }
}

/// Ask the system `ffmpeg` which video container it can produce: mp4, else webm.
pub fn negotiate_video_format() -> SlidecastResult<OutputFormat> {
    let output = Command::new("ffmpeg")
        .args(["-hide_banner", "-encoders"])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .map_err(|e| {
            tracing::debug!(error = %e, "ffmpeg not available");
            SlidecastError::encoder("video capture is not supported")
        })?;
    if !output.status.success() {
        return Err(SlidecastError::encoder("video capture is not supported"));
    }
    let format = pick_video_format(&String::from_utf8_lossy(&output.stdout))?;
    tracing::debug!(%format, "negotiated video format");
    Ok(format)
}

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Stream capture through the system `ffmpeg` binary.
///
/// Presented frames are sampled at the configured capture rate, flattened and piped to ffmpeg as
/// raw RGBA. Output goes to a temporary file whose bytes are returned by `finish`. Dropping an
/// unfinished capture kills the child process.
pub struct FfmpegCapture {
    format: OutputFormat,
    cfg: Option<EncoderConfig>,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,
    out_file: TempFileGuard,
    clock: Option<CaptureClock>,
    scratch: Vec<u8>,
    has_frame: bool,
}

impl FfmpegCapture {
    pub fn new(format: OutputFormat) -> SlidecastResult<Self> {
        if !matches!(format, OutputFormat::Mp4 | OutputFormat::Webm) {
            return Err(SlidecastError::encoder(format!(
                "ffmpeg capture cannot produce '{format}'"
            )));
        }
        Ok(Self {
            format,
            cfg: None,
            child: None,
            stdin: None,
            stderr_drain: None,
            out_file: TempFileGuard(None),
            clock: None,
            scratch: Vec::new(),
            has_frame: false,
        })
    }

    fn codec_args(&self) -> &'static [&'static str] {
        match self.format {
            OutputFormat::Webm => &[
                "-an",
                "-c:v",
                "libvpx-vp9",
                "-pix_fmt",
                "yuv420p",
                "-b:v",
                "0",
                "-crf",
                "32",
                "-row-mt",
                "1",
            ],
            _ => &[
                "-an",
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                "-movflags",
                "+faststart",
            ],
        }
    }

    /// Write the currently presented frame until the capture clock reaches `at`.
    fn sample_until(&mut self, at: Duration) -> SlidecastResult<()> {
        let clock = self
            .clock
            .as_mut()
            .ok_or_else(|| SlidecastError::encoder("ffmpeg capture not started"))?;
        let samples = clock.samples_until(at);
        if !self.has_frame || samples == 0 {
            return Ok(());
        }
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(SlidecastError::encoder("ffmpeg capture is already finalized"));
        };

        use std::io::Write as _;
        for _ in 0..samples {
            stdin.write_all(&self.scratch).map_err(|e| {
                SlidecastError::encoder(format!("failed to write frame to ffmpeg stdin: {e}"))
            })?;
        }
        Ok(())
    }
}

impl CaptureEncoder for FfmpegCapture {
    fn format(&self) -> OutputFormat {
        self.format
    }

    fn begin(&mut self, cfg: EncoderConfig) -> SlidecastResult<()> {
        let (w, h) = (cfg.canvas.width, cfg.canvas.height);
        if w == 0 || h == 0 {
            return Err(SlidecastError::encoder(
                "ffmpeg capture width/height must be non-zero",
            ));
        }
        if !w.is_multiple_of(2) || !h.is_multiple_of(2) {
            return Err(SlidecastError::encoder(
                "ffmpeg capture width/height must be even (required for yuv420p output)",
            ));
        }
        if !is_ffmpeg_on_path() {
            return Err(SlidecastError::encoder(
                "ffmpeg is required for video capture, but was not found on PATH",
            ));
        }

        let out_path = temp_output_path(self.format);
        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        // Input: raw RGBA8, already flattened to opaque in `present`.
        cmd.args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{w}x{h}"),
            "-r",
            &cfg.fps.get().to_string(),
            "-i",
            "pipe:0",
        ])
        .args(self.codec_args())
        .arg(&out_path);

        let mut child = cmd.spawn().map_err(|e| {
            SlidecastError::encoder(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;
        self.out_file = TempFileGuard(Some(out_path));

        let stdin = child.stdin.take().ok_or_else(|| {
            SlidecastError::encoder("failed to open ffmpeg stdin (unexpected)")
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| {
            SlidecastError::encoder("failed to open ffmpeg stderr (unexpected)")
        })?;
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        tracing::debug!(
            format = %self.format,
            width = w,
            height = h,
            fps = cfg.fps.get(),
            "ffmpeg capture started"
        );
        self.scratch = vec![0u8; cfg.canvas.byte_len()];
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(stderr_drain);
        self.clock = Some(CaptureClock::new(cfg.fps));
        self.cfg = Some(cfg);
        self.has_frame = false;
        Ok(())
    }

    fn present(&mut self, frame: &FrameRGBA, at: Duration) -> SlidecastResult<()> {
        let cfg = self
            .cfg
            .ok_or_else(|| SlidecastError::encoder("ffmpeg capture not started"))?;
        check_frame(&cfg, frame)?;
        self.sample_until(at)?;
        flatten_to_opaque_rgba8(&mut self.scratch, frame, cfg.background)?;
        self.has_frame = true;
        Ok(())
    }

    fn finish(&mut self, at: Duration) -> SlidecastResult<Vec<u8>> {
        self.sample_until(at)?;
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| SlidecastError::encoder("ffmpeg capture not started"))?;

        let status = child.wait().map_err(|e| {
            SlidecastError::encoder(format!("failed to wait for ffmpeg to finish: {e}"))
        })?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| SlidecastError::encoder("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| SlidecastError::encoder(format!("ffmpeg stderr read failed: {e}")))?,
            None => Vec::new(),
        };
        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(SlidecastError::encoder(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }

        let path = self
            .out_file
            .0
            .as_ref()
            .ok_or_else(|| SlidecastError::encoder("ffmpeg output path missing"))?;
        let bytes = std::fs::read(path).map_err(|e| {
            SlidecastError::encoder(format!(
                "failed to read ffmpeg output '{}': {e}",
                path.display()
            ))
        })?;
        let frames = self.clock.map(|c| c.emitted()).unwrap_or(0);
        tracing::debug!(frames, bytes = bytes.len(), "ffmpeg capture finalized");
        self.out_file = TempFileGuard(None);
        self.cfg = None;
        Ok(bytes)
    }
}

impl Drop for FfmpegCapture {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
            tracing::debug!("ffmpeg capture aborted");
        }
    }
}

fn temp_output_path(format: OutputFormat) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    std::env::temp_dir().join(format!(
        "slidecast-{}-{nanos}.{}",
        std::process::id(),
        format.extension()
    ))
}

struct TempFileGuard(Option<PathBuf>);

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}
