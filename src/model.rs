use std::{collections::BTreeMap, path::Path, sync::Arc};

use anyhow::Context as _;

use crate::foundation::error::{SlidecastError, SlidecastResult};

/// Named animation style of a slideshow.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Calm,
    Energetic,
    Professional,
}

impl Theme {
    pub const ALL: [Theme; 3] = [Theme::Calm, Theme::Energetic, Theme::Professional];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Calm => "calm",
            Self::Energetic => "energetic",
            Self::Professional => "professional",
        }
    }

    /// Strict parse; `None` for anything outside the fixed enum.
    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == tag)
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display language of the bilingual title.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Zh,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Zh => "zh",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::En => Self::Zh,
            Self::Zh => Self::En,
        }
    }
}

/// Title text, either a single string or a language-code → string map.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum LocalizedText {
    Plain(String),
    Localized(BTreeMap<String, String>),
}

impl LocalizedText {
    /// Pick the text for `lang`, falling back to English and then to any non-empty entry.
    pub fn select(&self, lang: Language) -> &str {
        match self {
            Self::Plain(s) => s,
            Self::Localized(map) => map
                .get(lang.code())
                .filter(|s| !s.trim().is_empty())
                .or_else(|| map.get(Language::En.code()))
                .filter(|s| !s.trim().is_empty())
                .or_else(|| map.values().find(|s| !s.trim().is_empty()))
                .map(String::as_str)
                .unwrap_or(""),
        }
    }

    pub fn is_bilingual(&self) -> bool {
        matches!(self, Self::Localized(map) if map.len() > 1)
    }
}

impl From<&str> for LocalizedText {
    fn from(value: &str) -> Self {
        Self::Plain(value.to_string())
    }
}

/// Style descriptor produced once per session by the description service.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SlideshowConfig {
    pub title: LocalizedText,
    pub theme: Theme,
}

impl SlideshowConfig {
    pub fn new(title: impl Into<String>, theme: Theme) -> Self {
        Self {
            title: LocalizedText::Plain(title.into()),
            theme,
        }
    }

    pub fn title_for(&self, lang: Language) -> &str {
        self.title.select(lang)
    }

    pub fn from_json_path(path: &Path) -> SlidecastResult<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("read slideshow config '{}'", path.display()))?;
        let raw: serde_json::Value = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse slideshow config '{}'", path.display()))?;
        crate::describe::parse_description(&raw)
            .map_err(|e| SlidecastError::validation(format!("{}: {e}", path.display())))
    }
}

/// One uploaded image: raw encoded bytes plus their MIME type, in insertion order.
#[derive(Clone, Debug)]
pub struct ImageInput {
    pub mime_type: String,
    pub bytes: Arc<Vec<u8>>,
}

impl ImageInput {
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes: Arc::new(bytes),
        }
    }

    pub fn from_path(path: &Path) -> SlidecastResult<Self> {
        let format = image::ImageFormat::from_path(path).map_err(|e| {
            SlidecastError::input_validation(format!(
                "'{}' is not a recognized image file: {e}",
                path.display()
            ))
        })?;
        let bytes =
            std::fs::read(path).with_context(|| format!("read image '{}'", path.display()))?;
        Ok(Self::new(format.to_mime_type(), bytes))
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn theme_parse_is_strict() {
        assert_eq!(Theme::parse("energetic"), Some(Theme::Energetic));
        assert_eq!(Theme::parse("Energetic"), None);
        assert_eq!(Theme::parse("bogus"), None);
        assert_eq!(Theme::default(), Theme::Calm);
    }

    #[test]
    fn localized_title_selects_language_with_fallback() {
        let title: LocalizedText =
            serde_json::from_str(r#"{"en": "Summer Trip", "zh": "夏日之旅"}"#).unwrap();
        assert!(title.is_bilingual());
        assert_eq!(title.select(Language::En), "Summer Trip");
        assert_eq!(title.select(Language::Zh), "夏日之旅");

        let en_only: LocalizedText = serde_json::from_str(r#"{"en": "Only English"}"#).unwrap();
        assert_eq!(en_only.select(Language::Zh), "Only English");

        let plain: LocalizedText = serde_json::from_str(r#""Plain""#).unwrap();
        assert_eq!(plain.select(Language::Zh), "Plain");
    }

    #[test]
    fn config_roundtrips_through_json() {
        let cfg = SlideshowConfig::new("Summer Trip", Theme::Energetic);
        let json = serde_json::to_string(&cfg).unwrap();
        assert_eq!(json, r#"{"title":"Summer Trip","theme":"energetic"}"#);
        let back: SlideshowConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn language_toggles_between_two_codes() {
        assert_eq!(Language::En.toggled(), Language::Zh);
        assert_eq!(Language::Zh.toggled().code(), "en");
    }
}
