//! Offline export: step every slide through its theme timeline, compose each frame on the
//! shared surface and feed the result to an encoder, then hand the artifact to a sink.

use std::{
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use anyhow::Context as _;
use tokio_util::sync::CancellationToken;

use crate::{
    assets::{SlideImage, decode_input},
    encode::{CaptureEncoder, Encoder, EncoderConfig, FrameEncoder, OutputFormat},
    foundation::{
        core::{Canvas, Fps, SLIDE_DURATION_MS},
        error::{SlidecastError, SlidecastResult},
    },
    model::{ImageInput, Language, SlideshowConfig},
    playback::PauseSwitch,
    render::{Compositor, FrameRGBA, SharedSurface, Surface},
    schedule::Scheduler,
    timeline::{SlidePlan, ThemeTimeline},
};

/// Fixed output parameters of an export.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExportSettings {
    pub canvas: Canvas,
    pub fps: Fps,
    pub slide_duration_ms: u64,
    /// Opaque straight-alpha color the encoders flatten against.
    pub background: [u8; 4],
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            canvas: Canvas::EXPORT,
            fps: Fps::default(),
            slide_duration_ms: SLIDE_DURATION_MS,
            background: [0, 0, 0, 255],
        }
    }
}

impl ExportSettings {
    pub fn validate(&self) -> SlidecastResult<()> {
        self.canvas.validate()?;
        let animation_ms = ThemeTimeline::longest_animation_ms();
        if self.slide_duration_ms < animation_ms {
            return Err(SlidecastError::validation(format!(
                "slide_duration_ms must cover the {animation_ms} ms entrance animation"
            )));
        }
        if self.background[3] != 255 {
            return Err(SlidecastError::validation(
                "export background must be opaque",
            ));
        }
        Ok(())
    }

    fn encoder_config(&self) -> EncoderConfig {
        EncoderConfig {
            canvas: self.canvas,
            fps: self.fps,
            background: self.background,
        }
    }
}

/// Everything one export needs from the slideshow session.
#[derive(Clone, Debug)]
pub struct ExportRequest {
    pub images: Vec<ImageInput>,
    pub config: SlideshowConfig,
    pub language: Language,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExportStatus {
    #[default]
    Idle,
    Rendering,
    Encoding,
    Done,
    Failed,
}

/// Progress of the export in flight, owned by the [`Exporter`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExportSession {
    pub status: ExportStatus,
    pub current_image_index: usize,
    pub current_frame_index: usize,
    /// Frames handed to the encoder so far.
    pub accumulated_chunks: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExportOutcome {
    Completed {
        filename: String,
        format: OutputFormat,
        bytes_len: usize,
        duration_ms: u64,
        frames: usize,
    },
    /// Another export was already in flight; nothing was done.
    Ignored,
    Cancelled,
}

/// Encoded bytes plus the name they are saved under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportArtifact {
    pub filename: String,
    pub format: OutputFormat,
    pub bytes: Vec<u8>,
}

/// Destination of a finished export (the "save as file" action).
pub trait ArtifactSink: Send + Sync {
    fn save(&self, artifact: &ExportArtifact) -> SlidecastResult<()>;
}

/// Saves artifacts as files in a download directory.
#[derive(Clone, Debug)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }
}

impl ArtifactSink for DirectorySink {
    fn save(&self, artifact: &ExportArtifact) -> SlidecastResult<()> {
        std::fs::create_dir_all(&self.dir).with_context(|| {
            format!("failed to create output directory '{}'", self.dir.display())
        })?;
        let path = self.path_for(&artifact.filename);
        std::fs::write(&path, &artifact.bytes)
            .with_context(|| format!("failed to write '{}'", path.display()))?;
        tracing::info!(path = %path.display(), bytes = artifact.bytes.len(), "artifact saved");
        Ok(())
    }
}

/// Keeps saved artifacts in memory.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    saved: Arc<Mutex<Vec<ExportArtifact>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn artifacts(&self) -> Vec<ExportArtifact> {
        self.saved.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl ArtifactSink for MemorySink {
    fn save(&self, artifact: &ExportArtifact) -> SlidecastResult<()> {
        self.saved
            .lock()
            .map_err(|_| SlidecastError::validation("memory sink poisoned"))?
            .push(artifact.clone());
        Ok(())
    }
}

/// Download filename stem: trimmed, lower-cased, whitespace runs collapsed to `_`,
/// `"slideshow"` when nothing is left. Normalizing twice gives the same result.
pub fn normalize_filename(title: &str) -> String {
    let stem = title
        .split_whitespace()
        .map(|word| {
            word.chars()
                .map(|c| match c {
                    '/' | '\\' | '\0' => '_',
                    c => c,
                })
                .collect::<String>()
                .to_lowercase()
        })
        .collect::<Vec<_>>()
        .join("_");
    if stem.is_empty() {
        "slideshow".to_string()
    } else {
        stem
    }
}

pub fn artifact_filename(title: &str, format: OutputFormat) -> String {
    format!("{}.{}", normalize_filename(title), format.extension())
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Rendered {
    bytes: Vec<u8>,
    format: OutputFormat,
    duration_ms: u64,
    frames: usize,
}

/// Runs exports against the shared surface, one at a time.
pub struct Exporter {
    settings: ExportSettings,
    surface: SharedSurface,
    compositor: tokio::sync::Mutex<Compositor>,
    scheduler: Scheduler,
    pause: PauseSwitch,
    busy: AtomicBool,
    session: Mutex<ExportSession>,
}

impl Exporter {
    pub fn new(
        settings: ExportSettings,
        surface: SharedSurface,
        compositor: Compositor,
        scheduler: Scheduler,
        pause: PauseSwitch,
    ) -> SlidecastResult<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            surface,
            compositor: tokio::sync::Mutex::new(compositor),
            scheduler,
            pause,
            busy: AtomicBool::new(false),
            session: Mutex::new(ExportSession::default()),
        })
    }

    pub fn settings(&self) -> ExportSettings {
        self.settings
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Snapshot of the current session.
    pub fn status(&self) -> ExportSession {
        self.session
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    fn update(&self, f: impl FnOnce(&mut ExportSession)) {
        if let Ok(mut session) = self.session.lock() {
            f(&mut session);
        }
    }

    fn set_status(&self, status: ExportStatus) {
        self.update(|s| s.status = status);
        tracing::debug!(?status, "export status");
    }

    /// Render every slide through `encoder` and save the artifact to `sink`.
    ///
    /// While running, live playback is paused and the surface lock is held. A request made
    /// while another export is in flight returns [`ExportOutcome::Ignored`]. Cancelling
    /// `cancel` drops the encoder, releases the surface and resets the session to idle.
    #[tracing::instrument(
        skip_all,
        fields(
            images = request.images.len(),
            theme = %request.config.theme,
            encoder = encoder.kind(),
        )
    )]
    pub async fn export(
        &self,
        request: ExportRequest,
        encoder: Encoder,
        sink: &dyn ArtifactSink,
        cancel: CancellationToken,
    ) -> SlidecastResult<ExportOutcome> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::info!("export already in progress; request ignored");
            return Ok(ExportOutcome::Ignored);
        }
        let _busy = BusyGuard(&self.busy);
        self.update(|s| *s = ExportSession::default());

        if request.images.len() < 2 {
            let e = SlidecastError::input_validation(format!(
                "export needs at least 2 images, got {}",
                request.images.len()
            ));
            return Err(self.fail(e));
        }

        let _paused = self.pause.hold();
        let mut surface = self.surface.lock().await;
        let mut compositor = self.compositor.lock().await;
        if surface.canvas() != self.settings.canvas {
            let e = SlidecastError::validation(format!(
                "surface is {}x{}, export expects {}x{}",
                surface.canvas().width,
                surface.canvas().height,
                self.settings.canvas.width,
                self.settings.canvas.height
            ));
            return Err(self.fail(e));
        }

        self.set_status(ExportStatus::Rendering);
        tracing::info!(format = %encoder.format(), "export started");

        let run = self.render(&mut surface, &mut compositor, &request, encoder);
        let rendered = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            res = run => Some(res),
        };

        let rendered = match rendered {
            None => {
                self.update(|s| *s = ExportSession::default());
                tracing::info!("export cancelled");
                return Ok(ExportOutcome::Cancelled);
            }
            Some(Err(e)) => return Err(self.fail(e)),
            Some(Ok(r)) => r,
        };

        let title = request.config.title_for(request.language);
        let artifact = ExportArtifact {
            filename: artifact_filename(title, rendered.format),
            format: rendered.format,
            bytes: rendered.bytes,
        };
        if let Err(e) = sink.save(&artifact) {
            return Err(self.fail(e));
        }

        self.set_status(ExportStatus::Done);
        tracing::info!(
            filename = %artifact.filename,
            bytes = artifact.bytes.len(),
            duration_ms = rendered.duration_ms,
            frames = rendered.frames,
            "export done"
        );
        Ok(ExportOutcome::Completed {
            filename: artifact.filename,
            format: artifact.format,
            bytes_len: artifact.bytes.len(),
            duration_ms: rendered.duration_ms,
            frames: rendered.frames,
        })
    }

    fn fail(&self, e: SlidecastError) -> SlidecastError {
        self.set_status(ExportStatus::Failed);
        tracing::warn!(error = %e, user_message = e.user_message(), "export failed");
        self.update(|s| *s = ExportSession::default());
        e
    }

    async fn render(
        &self,
        surface: &mut Surface,
        compositor: &mut Compositor,
        request: &ExportRequest,
        encoder: Encoder,
    ) -> SlidecastResult<Rendered> {
        let timeline = ThemeTimeline {
            total_duration_ms: self.settings.slide_duration_ms,
            ..ThemeTimeline::for_theme(request.config.theme)
        };
        let plan = SlidePlan::new(&timeline, self.settings.fps);
        let slides = SlideRenderer {
            exporter: self,
            timeline,
            plan: &plan,
            title: request.config.title_for(request.language),
        };
        tracing::debug!(
            steps = plan.frame_count(),
            hold_ms = plan.hold.map(|h| h.duration_ms).unwrap_or(0),
            "slide plan"
        );

        match encoder {
            Encoder::FrameAddressable(enc) => {
                slides
                    .render_frames(surface, compositor, &request.images, enc)
                    .await
            }
            Encoder::StreamCaptured(enc) => {
                slides
                    .render_capture(surface, compositor, &request.images, enc)
                    .await
            }
        }
    }
}

struct SlideRenderer<'a> {
    exporter: &'a Exporter,
    timeline: ThemeTimeline,
    plan: &'a SlidePlan,
    title: &'a str,
}

impl SlideRenderer<'_> {
    async fn load(&self, index: usize, input: &ImageInput) -> SlidecastResult<SlideImage> {
        self.exporter.update(|s| {
            s.current_image_index = index;
            s.current_frame_index = 0;
        });
        tokio::task::yield_now().await;
        decode_input(input).map_err(|e| match e {
            SlidecastError::ImageDecode(msg) => {
                SlidecastError::image_decode(format!("image {index}: {msg}"))
            }
            other => other,
        })
    }

    fn compose(
        &self,
        surface: &mut Surface,
        compositor: &mut Compositor,
        image: &SlideImage,
        progress: f64,
        frame_index: usize,
    ) -> FrameRGBA {
        compositor.compose(surface, image, self.timeline.params_at(progress), self.title);
        self.exporter.update(|s| {
            s.current_frame_index = frame_index;
            s.accumulated_chunks += 1;
        });
        surface.read_frame()
    }

    /// Frame-addressable path: explicit durations, no clock.
    async fn render_frames(
        &self,
        surface: &mut Surface,
        compositor: &mut Compositor,
        images: &[ImageInput],
        mut enc: Box<dyn FrameEncoder>,
    ) -> SlidecastResult<Rendered> {
        let settings = self.exporter.settings;
        enc.begin(settings.encoder_config())?;
        let mut frames = 0usize;
        let mut duration_ms = 0u64;

        for (i, input) in images.iter().enumerate() {
            let image = self.load(i, input).await?;
            let mut last = None;
            for step in &self.plan.steps {
                let frame = self.compose(
                    surface,
                    compositor,
                    &image,
                    step.progress,
                    step.index as usize,
                );
                if step.duration_ms > 0 {
                    enc.add_frame(&frame, Duration::from_millis(step.duration_ms))?;
                    frames += 1;
                    duration_ms += step.duration_ms;
                }
                last = Some(frame);
                tokio::task::yield_now().await;
            }
            if let (Some(hold), Some(frame)) = (self.plan.hold, last.as_ref()) {
                enc.add_frame(frame, Duration::from_millis(hold.duration_ms))?;
                frames += 1;
                duration_ms += hold.duration_ms;
            }
        }

        self.exporter.set_status(ExportStatus::Encoding);
        let bytes = enc.finish()?;
        Ok(Rendered {
            bytes,
            format: enc.format(),
            duration_ms,
            frames,
        })
    }

    /// Stream-captured path: the surface is presented and then held for real elapsed time.
    async fn render_capture(
        &self,
        surface: &mut Surface,
        compositor: &mut Compositor,
        images: &[ImageInput],
        mut enc: Box<dyn CaptureEncoder>,
    ) -> SlidecastResult<Rendered> {
        let settings = self.exporter.settings;
        let scheduler = &self.exporter.scheduler;
        enc.begin(settings.encoder_config())?;
        let start = scheduler.now();
        let mut frames = 0usize;

        for (i, input) in images.iter().enumerate() {
            let slide_start = start + Duration::from_millis(self.plan.total_ms * i as u64);
            let image = self.load(i, input).await?;
            for step in &self.plan.steps {
                let frame = self.compose(
                    surface,
                    compositor,
                    &image,
                    step.progress,
                    step.index as usize,
                );
                enc.present(&frame, scheduler.now() - start)?;
                frames += 1;
                let step_end =
                    slide_start + Duration::from_millis(step.start_ms + step.duration_ms);
                scheduler.at(step_end).wait().await;
            }
            // Static hold: the last composed frame stays on the surface until the slide ends.
            let slide_end = slide_start + Duration::from_millis(self.plan.total_ms);
            scheduler.at(slide_end).wait().await;
        }

        self.exporter.set_status(ExportStatus::Encoding);
        let elapsed = scheduler.now() - start;
        let bytes = enc.finish(elapsed)?;
        Ok(Rendered {
            bytes,
            format: enc.format(),
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            frames,
        })
    }
}
