use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::{Value, json};

use crate::{
    describe::DescriptionService,
    foundation::error::{SlidecastError, SlidecastResult},
    model::{ImageInput, Theme},
};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Environment variables consulted for the API key, in order.
pub const API_KEY_ENV: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

const PROMPT: &str = concat!(
    "Analyze these images. Based on their content and mood, ",
    "suggest a creative and fitting title for a slideshow. ",
    "Also, suggest the most appropriate animation theme for transitioning between them. ",
    "The available themes are: 'calm' (slow, gentle transitions), ",
    "'energetic' (fast, dynamic transitions), 'professional' (clean, sleek transitions). ",
    "Return your answer in the specified JSON format.",
);

const BILINGUAL_PROMPT: &str =
    " Provide the title both in English (en) and in Simplified Chinese (zh).";

const THEME_DESCRIPTION: &str = concat!(
    "The most appropriate animation theme. ",
    "Must be one of: 'calm', 'energetic', or 'professional'.",
);

const TITLE_DESCRIPTION: &str =
    "A creative and fitting title for the image slideshow, no longer than 10 words.";

/// Description service backed by the Gemini `generateContent` REST endpoint.
#[derive(Clone)]
pub struct GeminiDescriber {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    bilingual: bool,
}

impl std::fmt::Debug for GeminiDescriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiDescriber")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("bilingual", &self.bilingual)
            .finish_non_exhaustive()
    }
}

impl GeminiDescriber {
    pub fn new(api_key: impl Into<String>) -> SlidecastResult<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(SlidecastError::description_service(
                "Gemini API key must not be empty",
            ));
        }
        let http = reqwest::Client::builder().build().map_err(|e| {
            SlidecastError::description_service(format!("failed to build http client: {e}"))
        })?;
        Ok(Self {
            http,
            api_key,
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            bilingual: false,
        })
    }

    /// Build from `GEMINI_API_KEY`, falling back to `API_KEY`.
    pub fn from_env() -> SlidecastResult<Self> {
        let key = API_KEY_ENV
            .iter()
            .find_map(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()))
            .ok_or_else(|| {
                SlidecastError::description_service("GEMINI_API_KEY (or API_KEY) is not set")
            })?;
        Self::new(key)
    }

    /// Ask for an `{en, zh}` title instead of a single string.
    pub fn bilingual(mut self, bilingual: bool) -> Self {
        self.bilingual = bilingual;
        self
    }

    fn url(&self) -> String {
        format!("{}/{}:generateContent", self.endpoint, self.model)
    }

    pub fn request_body(&self, images: &[ImageInput]) -> Value {
        let prompt = if self.bilingual {
            format!("{PROMPT}{BILINGUAL_PROMPT}")
        } else {
            PROMPT.to_string()
        };
        let parts = std::iter::once(json!({ "text": prompt }))
            .chain(images.iter().map(|image| {
                json!({
                    "inlineData": {
                        "mimeType": image.mime_type,
                        "data": STANDARD.encode(image.bytes.as_slice()),
                    }
                })
            }))
            .collect::<Vec<_>>();

        let title_schema = if self.bilingual {
            json!({
                "type": "OBJECT",
                "description": TITLE_DESCRIPTION,
                "properties": {
                    "en": { "type": "STRING" },
                    "zh": { "type": "STRING" },
                },
                "required": ["en", "zh"],
            })
        } else {
            json!({ "type": "STRING", "description": TITLE_DESCRIPTION })
        };
        let themes = Theme::ALL.map(Theme::as_str);

        json!({
            "contents": [{ "parts": parts }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "OBJECT",
                    "properties": {
                        "title": title_schema,
                        "theme": {
                            "type": "STRING",
                            "description": THEME_DESCRIPTION,
                            "enum": themes,
                        },
                    },
                    "required": ["title", "theme"],
                },
            },
        })
    }
}

/// Pull the model's JSON answer out of a `generateContent` response.
pub fn response_json(body: &Value) -> SlidecastResult<Value> {
    let text = body
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| SlidecastError::description_service("response has no text candidate"))?;
    serde_json::from_str(&text).map_err(|e| {
        SlidecastError::description_service(format!("model answer is not valid JSON: {e}"))
    })
}

impl DescriptionService for GeminiDescriber {
    #[tracing::instrument(skip_all, fields(model = %self.model, images = images.len()))]
    async fn describe(&self, images: &[ImageInput]) -> SlidecastResult<Value> {
        let body = self.request_body(images);
        let response = self
            .http
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SlidecastError::description_service(format!("request failed: {e}")))?;

        let status = response.status();
        let payload: Value = response.json().await.map_err(|e| {
            SlidecastError::description_service(format!("unreadable response ({status}): {e}"))
        })?;
        if !status.is_success() {
            let message = payload
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("no error message");
            return Err(SlidecastError::description_service(format!(
                "Gemini API returned {status}: {message}"
            )));
        }
        tracing::debug!("Gemini response received");
        response_json(&payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_prompt_images_and_schema() {
        let g = GeminiDescriber::new("k").unwrap();
        let body = g.request_body(&[
            ImageInput::new("image/png", vec![1, 2, 3]),
            ImageInput::new("image/jpeg", vec![4]),
        ]);
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 3);
        assert!(parts[0]["text"].as_str().unwrap().starts_with("Analyze these images."));
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[1]["inlineData"]["data"], "AQID");
        let schema = &body["generationConfig"]["responseSchema"];
        assert_eq!(
            schema["properties"]["theme"]["enum"],
            json!(["calm", "energetic", "professional"])
        );
        assert_eq!(schema["properties"]["title"]["type"], "STRING");
        assert_eq!(g.url(), format!("{DEFAULT_ENDPOINT}/gemini-2.5-flash:generateContent"));
    }

    #[test]
    fn bilingual_schema_asks_for_both_languages() {
        let g = GeminiDescriber::new("k").unwrap().bilingual(true);
        let body = g.request_body(&[]);
        let title = &body["generationConfig"]["responseSchema"]["properties"]["title"];
        assert_eq!(title["required"], json!(["en", "zh"]));
        assert!(body["contents"][0]["parts"][0]["text"].as_str().unwrap().contains("Chinese"));
    }

    #[test]
    fn answer_text_is_extracted_and_parsed() {
        let text = r#"{"title": "Summer Trip", "theme": "energetic"}"#;
        let body = json!({
            "candidates": [{ "content": { "parts": [{ "text": text }] } }]
        });
        let answer = response_json(&body).unwrap();
        assert_eq!(answer["theme"], "energetic");

        assert!(response_json(&json!({ "candidates": [] })).is_err());
        let not_json = json!({ "candidates": [{ "content": { "parts": [{ "text": "sure!" }] } }] });
        assert!(matches!(response_json(&not_json), Err(SlidecastError::DescriptionService(_))));
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(GeminiDescriber::new("  ").is_err());
    }
}
