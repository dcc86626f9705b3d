//! Slidecast turns a handful of still images and a small style descriptor (title and theme)
//! into an animated slideshow, and exports it as a looping GIF or an ffmpeg-encoded video
//! whose timing matches the live preview.
//!
//! - Get a [`SlideshowConfig`] from a [`DescriptionService`] via [`generate_config`]
//! - Open a [`SlideshowView`] (live playback, preview frames, fullscreen)
//! - Export through an [`Encoder`] into an [`ArtifactSink`]
#![forbid(unsafe_code)]

mod foundation;

pub mod assets;
pub mod describe;
pub mod encode;
pub mod export;
pub mod model;
pub mod playback;
pub mod present;
pub mod render;
pub mod schedule;
pub mod timeline;

pub use crate::foundation::core::{
    Affine, Canvas, EXPORT_FPS, EXPORT_HEIGHT, EXPORT_WIDTH, Fps, Rect, SLIDE_DURATION_MS,
};
pub use crate::foundation::error::{SlidecastError, SlidecastResult};

pub use crate::assets::{SlideImage, decode_image, decode_input};
pub use crate::describe::{
    DescriptionService, GeminiDescriber, StaticDescriber, generate_config, parse_description,
};
pub use crate::encode::{
    CaptureEncoder, Encoder, EncoderConfig, FfmpegCapture, FrameEncoder, GifEncoder,
    MemoryCapture, MemoryFrames, OutputFormat, negotiate_video_format,
};
pub use crate::export::{
    ArtifactSink, DirectorySink, ExportArtifact, ExportOutcome, ExportRequest, ExportSession,
    ExportSettings, ExportStatus, Exporter, MemorySink, artifact_filename, normalize_filename,
};
pub use crate::model::{ImageInput, Language, LocalizedText, SlideshowConfig, Theme};
pub use crate::playback::{PauseGuard, PauseSwitch, Playback};
pub use crate::present::{Fullscreen, HeadlessFullscreen, SlideshowView, Studio, StudioState};
pub use crate::render::{
    Compositor, CompositorStyle, FONT_ENV, FrameRGBA, SharedSurface, Surface, TitleFont,
    fit_contain,
};
pub use crate::schedule::{Scheduler, TimerHandle, TimerOutcome};
pub use crate::timeline::{SlidePlan, ThemeParams, ThemeTimeline};
pub use tokio_util::sync::CancellationToken;
