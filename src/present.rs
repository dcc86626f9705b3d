//! Presentation layer: one slideshow session (`SlideshowView`) and the app flow around it
//! (`Studio`: upload, generate, show).

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio_util::sync::CancellationToken;

use crate::{
    assets::{SlideImage, decode_input},
    describe::{DescriptionService, MIN_IMAGES, generate_config},
    encode::Encoder,
    export::{ArtifactSink, ExportOutcome, ExportRequest, ExportSettings, Exporter},
    foundation::error::{SlidecastError, SlidecastResult},
    model::{ImageInput, Language, SlideshowConfig},
    playback::{PauseSwitch, Playback},
    render::{Compositor, FrameRGBA, SharedSurface, Surface, TitleFont},
    schedule::Scheduler,
    timeline::ThemeTimeline,
};

pub type FullscreenCallback = Box<dyn Fn(bool) + Send + Sync>;

/// Fullscreen presentation capability, scoped to the presentation surface.
pub trait Fullscreen: Send + Sync {
    fn request_fullscreen(&self) -> SlidecastResult<()>;
    fn exit_fullscreen(&self) -> SlidecastResult<()>;
    fn is_fullscreen(&self) -> bool;
    /// Register a callback run with the new state on every change.
    fn on_change(&self, callback: FullscreenCallback);
}

/// In-memory fullscreen state for headless runs and tests.
#[derive(Default)]
pub struct HeadlessFullscreen {
    active: AtomicBool,
    listeners: Mutex<Vec<FullscreenCallback>>,
}

impl HeadlessFullscreen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Change state from outside the view (e.g. the user pressed Escape).
    pub fn set_external(&self, active: bool) {
        self.set(active);
    }

    fn set(&self, active: bool) {
        if self.active.swap(active, Ordering::AcqRel) == active {
            return;
        }
        if let Ok(listeners) = self.listeners.lock() {
            for listener in listeners.iter() {
                listener(active);
            }
        }
    }
}

impl std::fmt::Debug for HeadlessFullscreen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessFullscreen")
            .field("active", &self.is_fullscreen())
            .finish_non_exhaustive()
    }
}

impl Fullscreen for HeadlessFullscreen {
    fn request_fullscreen(&self) -> SlidecastResult<()> {
        self.set(true);
        Ok(())
    }

    fn exit_fullscreen(&self) -> SlidecastResult<()> {
        self.set(false);
        Ok(())
    }

    fn is_fullscreen(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn on_change(&self, callback: FullscreenCallback) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(callback);
        }
    }
}

/// A running slideshow: live playback, preview rendering and export over one shared surface.
pub struct SlideshowView {
    images: Vec<ImageInput>,
    decoded: Vec<Option<SlideImage>>,
    config: SlideshowConfig,
    language: Language,
    playback: Playback,
    surface: SharedSurface,
    compositor: Compositor,
    exporter: Arc<Exporter>,
    fullscreen: Arc<dyn Fullscreen>,
    fullscreen_state: Arc<AtomicBool>,
}

impl SlideshowView {
    pub fn new(
        images: Vec<ImageInput>,
        config: SlideshowConfig,
        settings: ExportSettings,
        font: Option<TitleFont>,
        fullscreen: Arc<dyn Fullscreen>,
    ) -> SlidecastResult<Self> {
        if images.len() < MIN_IMAGES {
            return Err(SlidecastError::input_validation(format!(
                "a slideshow needs at least {MIN_IMAGES} images, got {}",
                images.len()
            )));
        }
        settings.validate()?;

        let scheduler = Scheduler::new();
        let pause = PauseSwitch::new();
        let surface = Surface::shared(settings.canvas)?;
        let playback = Playback::new(
            images.len(),
            Duration::from_millis(settings.slide_duration_ms),
            scheduler.clone(),
            &pause,
        )?;
        let exporter = Arc::new(Exporter::new(
            settings,
            surface.clone(),
            Compositor::new(font.clone()),
            scheduler,
            pause,
        )?);

        let fullscreen_state = Arc::new(AtomicBool::new(fullscreen.is_fullscreen()));
        let mirror = fullscreen_state.clone();
        fullscreen.on_change(Box::new(move |active| {
            mirror.store(active, Ordering::Release);
            tracing::debug!(active, "fullscreen changed");
        }));

        tracing::info!(
            images = images.len(),
            theme = %config.theme,
            "slideshow started"
        );
        Ok(Self {
            decoded: vec![None; images.len()],
            images,
            config,
            language: Language::default(),
            playback,
            surface,
            compositor: Compositor::new(font),
            exporter,
            fullscreen,
            fullscreen_state,
        })
    }

    pub fn config(&self) -> &SlideshowConfig {
        &self.config
    }

    pub fn images(&self) -> &[ImageInput] {
        &self.images
    }

    pub fn current(&self) -> usize {
        self.playback.current()
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Title in the current display language.
    pub fn title(&self) -> &str {
        self.config.title_for(self.language)
    }

    pub fn surface(&self) -> SharedSurface {
        self.surface.clone()
    }

    pub fn exporter(&self) -> Arc<Exporter> {
        self.exporter.clone()
    }

    pub fn next(&mut self) -> usize {
        self.playback.next()
    }

    pub fn previous(&mut self) -> usize {
        self.playback.previous()
    }

    pub fn go_to(&mut self, index: usize) -> SlidecastResult<()> {
        self.playback.go_to(index)
    }

    /// Wait for the next automatic slide change.
    pub async fn advance(&mut self) -> usize {
        self.playback.advance().await
    }

    pub fn toggle_language(&mut self) -> Language {
        self.language = self.language.toggled();
        tracing::debug!(language = self.language.code(), "display language toggled");
        self.language
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen_state.load(Ordering::Acquire)
    }

    /// Enter or leave fullscreen; returns the requested state.
    pub fn toggle_fullscreen(&self) -> SlidecastResult<bool> {
        if self.fullscreen.is_fullscreen() {
            self.fullscreen.exit_fullscreen()?;
            Ok(false)
        } else {
            self.fullscreen.request_fullscreen()?;
            Ok(true)
        }
    }

    /// Draw the current slide in its settled state.
    ///
    /// Returns `None` without drawing while an export holds the surface.
    pub fn render_preview(&mut self) -> SlidecastResult<Option<FrameRGBA>> {
        let Ok(mut surface) = self.surface.try_lock() else {
            tracing::debug!("surface busy; preview skipped");
            return Ok(None);
        };
        let index = self.playback.current();
        let image = match &self.decoded[index] {
            Some(image) => image.clone(),
            None => {
                let image = decode_input(&self.images[index])?;
                self.decoded[index] = Some(image.clone());
                image
            }
        };
        let params = ThemeTimeline::for_theme(self.config.theme).params_at(1.0);
        let title = self.config.title_for(self.language);
        self.compositor.compose(&mut surface, &image, params, title);
        Ok(Some(surface.read_frame()))
    }

    pub fn export_request(&self) -> ExportRequest {
        ExportRequest {
            images: self.images.clone(),
            config: self.config.clone(),
            language: self.language,
        }
    }

    /// Export the slideshow in the current display language.
    pub async fn export(
        &self,
        encoder: Encoder,
        sink: &dyn ArtifactSink,
        cancel: CancellationToken,
    ) -> SlidecastResult<ExportOutcome> {
        self.exporter
            .export(self.export_request(), encoder, sink, cancel)
            .await
    }

    pub fn teardown(self) {
        if self.fullscreen.is_fullscreen()
            && let Err(e) = self.fullscreen.exit_fullscreen()
        {
            tracing::warn!(error = %e, "failed to leave fullscreen");
        }
        let Self { playback, .. } = self;
        playback.teardown();
        tracing::info!("slideshow closed");
    }
}

/// Where the app currently is.
pub enum StudioState {
    Upload,
    Generating,
    Showing(Box<SlideshowView>),
}

impl std::fmt::Debug for StudioState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl StudioState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Generating => "generating",
            Self::Showing(_) => "showing",
        }
    }
}

/// App flow: collect images, generate a config, then show the slideshow.
pub struct Studio {
    images: Vec<ImageInput>,
    state: StudioState,
    error: Option<&'static str>,
    settings: ExportSettings,
    font: Option<TitleFont>,
    fullscreen: Arc<dyn Fullscreen>,
}

impl Studio {
    pub fn new(
        settings: ExportSettings,
        font: Option<TitleFont>,
        fullscreen: Arc<dyn Fullscreen>,
    ) -> Self {
        Self {
            images: Vec::new(),
            state: StudioState::Upload,
            error: None,
            settings,
            font,
            fullscreen,
        }
    }

    pub fn state(&self) -> &StudioState {
        &self.state
    }

    pub fn images(&self) -> &[ImageInput] {
        &self.images
    }

    /// User-facing message of the last failure, cleared by the next attempt.
    pub fn error(&self) -> Option<&'static str> {
        self.error
    }

    pub fn view(&self) -> Option<&SlideshowView> {
        match &self.state {
            StudioState::Showing(view) => Some(view.as_ref()),
            _ => None,
        }
    }

    pub fn view_mut(&mut self) -> Option<&mut SlideshowView> {
        match &mut self.state {
            StudioState::Showing(view) => Some(view.as_mut()),
            _ => None,
        }
    }

    /// Append images in order; non-image inputs are skipped. Returns how many were accepted.
    pub fn add_images(&mut self, inputs: impl IntoIterator<Item = ImageInput>) -> usize {
        let before = self.images.len();
        for input in inputs {
            if input.is_image() {
                self.images.push(input);
            } else {
                tracing::warn!(mime_type = %input.mime_type, "skipping non-image input");
            }
        }
        self.images.len() - before
    }

    pub fn remove_image(&mut self, index: usize) -> Option<ImageInput> {
        (index < self.images.len()).then(|| self.images.remove(index))
    }

    /// Ask `service` for a config and start the slideshow.
    ///
    /// On failure the studio stays on the upload step with a user-facing message.
    pub async fn generate<S: DescriptionService>(&mut self, service: &S) -> SlidecastResult<()> {
        if !matches!(self.state, StudioState::Upload) {
            return Err(SlidecastError::validation(format!(
                "cannot generate while {}",
                self.state.name()
            )));
        }
        self.error = None;
        if self.images.len() < MIN_IMAGES {
            let e = SlidecastError::input_validation(format!(
                "need at least {MIN_IMAGES} images, got {}",
                self.images.len()
            ));
            self.error = Some(e.user_message());
            return Err(e);
        }

        self.state = StudioState::Generating;
        let result = match generate_config(service, &self.images).await {
            Ok(config) => SlideshowView::new(
                self.images.clone(),
                config,
                self.settings,
                self.font.clone(),
                self.fullscreen.clone(),
            ),
            Err(e) => Err(e),
        };
        match result {
            Ok(view) => {
                self.state = StudioState::Showing(Box::new(view));
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "slideshow generation failed");
                self.error = Some(e.user_message());
                self.state = StudioState::Upload;
                Err(e)
            }
        }
    }

    /// Leave the slideshow and start over with no images.
    pub fn back(&mut self) {
        if let StudioState::Showing(view) = std::mem::replace(&mut self.state, StudioState::Upload)
        {
            view.teardown();
        }
        self.images.clear();
        self.error = None;
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use serde_json::json;

    use super::*;
    use crate::{describe::StaticDescriber, foundation::core::Canvas, model::Theme};

    fn png(rgba: [u8; 4]) -> ImageInput {
        let img = image::RgbaImage::from_pixel(8, 6, image::Rgba(rgba));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        ImageInput::new("image/png", buf)
    }

    fn settings() -> ExportSettings {
        ExportSettings {
            canvas: Canvas::new(32, 18).unwrap(),
            ..ExportSettings::default()
        }
    }

    fn view() -> SlideshowView {
        let config = SlideshowConfig {
            title: serde_json::from_value(json!({"en": "Summer Trip", "zh": "夏日之旅"}))
                .unwrap(),
            theme: Theme::Calm,
        };
        SlideshowView::new(
            vec![png([255, 0, 0, 255]), png([0, 0, 255, 255])],
            config,
            settings(),
            None,
            Arc::new(HeadlessFullscreen::new()),
        )
        .unwrap()
    }

    #[test]
    fn headless_fullscreen_notifies_on_change_only() {
        let fs = HeadlessFullscreen::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        fs.on_change(Box::new(move |a| sink.lock().unwrap().push(a)));
        fs.request_fullscreen().unwrap();
        fs.request_fullscreen().unwrap();
        fs.set_external(false);
        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn view_controls_navigation_language_and_fullscreen() {
        let mut v = view();
        assert_eq!(v.title(), "Summer Trip");
        assert_eq!(v.toggle_language(), Language::Zh);
        assert_eq!(v.title(), "夏日之旅");
        assert_eq!(v.export_request().language, Language::Zh);

        assert_eq!(v.next(), 1);
        assert_eq!(v.next(), 0);
        assert_eq!(v.previous(), 1);

        assert!(v.toggle_fullscreen().unwrap());
        assert!(v.is_fullscreen());
        assert!(!v.toggle_fullscreen().unwrap());
        assert!(!v.is_fullscreen());
        v.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn preview_draws_current_slide_and_yields_to_export() {
        let mut v = view();
        let frame = v.render_preview().unwrap().unwrap();
        let center = frame.pixel(16, 4);
        assert!(center[0] > 200 && center[2] < 50, "{center:?}");

        v.next();
        let frame = v.render_preview().unwrap().unwrap();
        let center = frame.pixel(16, 4);
        assert!(center[2] > 200 && center[0] < 50, "{center:?}");

        let surface = v.surface();
        let held = surface.lock().await;
        assert!(v.render_preview().unwrap().is_none());
        drop(held);
        assert!(v.render_preview().unwrap().is_some());
    }

    #[test]
    fn view_needs_two_images() {
        let err = SlideshowView::new(
            vec![png([0, 0, 0, 255])],
            SlideshowConfig::new("x", Theme::Calm),
            settings(),
            None,
            Arc::new(HeadlessFullscreen::new()),
        )
        .err()
        .unwrap();
        assert!(matches!(err, SlidecastError::InputValidation(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn studio_flow_upload_generate_back() {
        let mut studio = Studio::new(settings(), None, Arc::new(HeadlessFullscreen::new()));
        let service = StaticDescriber::raw(json!({"title": "Summer Trip", "theme": "energetic"}));

        assert_eq!(studio.add_images([png([1, 2, 3, 255])]), 1);
        assert!(studio.generate(&service).await.is_err());
        assert_eq!(
            studio.error(),
            Some("Please upload at least 2 images to create a slideshow.")
        );
        assert_eq!(service.calls(), 0);

        let text = ImageInput::new("text/plain", b"hello".to_vec());
        assert_eq!(studio.add_images([png([4, 5, 6, 255]), text]), 1);
        assert_eq!(studio.images().len(), 2);

        studio.generate(&service).await.unwrap();
        assert_eq!(studio.state().name(), "showing");
        assert_eq!(studio.view().unwrap().config().theme, Theme::Energetic);
        assert!(studio.error().is_none());

        studio.back();
        assert_eq!(studio.state().name(), "upload");
        assert!(studio.images().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn studio_stays_on_upload_when_service_answers_badly() {
        let mut studio = Studio::new(settings(), None, Arc::new(HeadlessFullscreen::new()));
        studio.add_images([png([1, 1, 1, 255]), png([2, 2, 2, 255])]);
        let service = StaticDescriber::raw(json!({"title": "Trip", "theme": "bogus"}));
        let err = studio.generate(&service).await.unwrap_err();
        assert!(matches!(err, SlidecastError::DescriptionService(_)));
        assert_eq!(studio.state().name(), "upload");
        assert_eq!(
            studio.error(),
            Some("Failed to generate slideshow. The AI model might be busy. Please try again.")
        );
        assert_eq!(studio.images().len(), 2);
        assert_eq!(studio.remove_image(0).map(|i| i.mime_type), Some("image/png".into()));
        assert!(studio.remove_image(5).is_none());
    }
}
