//! Boundary to the generative description service that proposes a title and a theme.
//!
//! The service returns raw JSON; nothing it says is trusted until [`parse_description`] has
//! validated it into a [`SlideshowConfig`].

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use serde_json::Value;

use crate::{
    foundation::error::{SlidecastError, SlidecastResult},
    model::{ImageInput, Language, LocalizedText, SlideshowConfig, Theme},
};

pub mod gemini;

pub use gemini::GeminiDescriber;

/// Minimum number of images a slideshow needs.
pub const MIN_IMAGES: usize = 2;

/// Asynchronous `describe(images) -> {title, theme}` call.
pub trait DescriptionService {
    fn describe(
        &self,
        images: &[ImageInput],
    ) -> impl Future<Output = SlidecastResult<Value>> + Send;
}

/// Validate a raw service response.
///
/// `title` must be a non-empty string or an `{"en": .., "zh": ..}` map of non-empty strings;
/// `theme` must be one of the built-in theme tags.
pub fn parse_description(raw: &Value) -> SlidecastResult<SlideshowConfig> {
    let obj = raw
        .as_object()
        .ok_or_else(|| SlidecastError::description_service("response is not a JSON object"))?;

    let title = match obj.get("title") {
        Some(Value::String(s)) if !s.trim().is_empty() => LocalizedText::Plain(s.clone()),
        Some(Value::Object(map)) => {
            let mut localized = BTreeMap::new();
            for (code, text) in map {
                let text = text.as_str().filter(|s| !s.trim().is_empty()).ok_or_else(|| {
                    SlidecastError::description_service(format!(
                        "title.{code} must be a non-empty string"
                    ))
                })?;
                localized.insert(code.clone(), text.to_string());
            }
            for lang in [Language::En, Language::Zh] {
                if !localized.contains_key(lang.code()) {
                    return Err(SlidecastError::description_service(format!(
                        "localized title is missing '{}'",
                        lang.code()
                    )));
                }
            }
            LocalizedText::Localized(localized)
        }
        _ => {
            return Err(SlidecastError::description_service(
                "response is missing a non-empty title",
            ));
        }
    };

    let theme = obj
        .get("theme")
        .and_then(Value::as_str)
        .and_then(Theme::parse)
        .ok_or_else(|| {
            SlidecastError::description_service(format!(
                "invalid theme {}; expected one of calm, energetic, professional",
                obj.get("theme").map(Value::to_string).unwrap_or_else(|| "<missing>".into())
            ))
        })?;

    Ok(SlideshowConfig { title, theme })
}

/// Ask `service` for a slideshow config and validate it.
///
/// Non-image inputs are skipped. Fewer than [`MIN_IMAGES`] remaining images fail with an input
/// validation error before the service is called. Every service or validation failure is a
/// description service error.
#[tracing::instrument(skip_all, fields(images = images.len()))]
pub async fn generate_config<S: DescriptionService>(
    service: &S,
    images: &[ImageInput],
) -> SlidecastResult<SlideshowConfig> {
    let images = images
        .iter()
        .filter(|input| {
            let keep = input.is_image();
            if !keep {
                tracing::warn!(mime_type = %input.mime_type, "skipping non-image input");
            }
            keep
        })
        .cloned()
        .collect::<Vec<_>>();
    if images.len() < MIN_IMAGES {
        return Err(SlidecastError::input_validation(format!(
            "need at least {MIN_IMAGES} images, got {}",
            images.len()
        )));
    }

    let raw = service.describe(&images).await.map_err(|e| match e {
        SlidecastError::DescriptionService(_) => e,
        other => SlidecastError::description_service(other.to_string()),
    })?;
    let config = parse_description(&raw)?;
    tracing::info!(
        theme = %config.theme,
        title = config.title_for(Language::En),
        "slideshow config generated"
    );
    Ok(config)
}

/// Returns a fixed response without contacting any service.
#[derive(Clone, Debug)]
pub struct StaticDescriber {
    response: Value,
    calls: Arc<AtomicUsize>,
}

impl StaticDescriber {
    pub fn new(config: &SlideshowConfig) -> SlidecastResult<Self> {
        let response = serde_json::to_value(config)
            .map_err(|e| SlidecastError::validation(format!("serialize config: {e}")))?;
        Ok(Self::raw(response))
    }

    /// Answer every request with `response` verbatim, valid or not.
    pub fn raw(response: Value) -> Self {
        Self {
            response,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl DescriptionService for StaticDescriber {
    async fn describe(&self, _images: &[ImageInput]) -> SlidecastResult<Value> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.response.clone())
    }
}
