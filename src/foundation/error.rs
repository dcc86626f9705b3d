pub type SlidecastResult<T> = Result<T, SlidecastError>;

#[derive(thiserror::Error, Debug)]
pub enum SlidecastError {
    #[error("input validation error: {0}")]
    InputValidation(String),

    #[error("description service error: {0}")]
    DescriptionService(String),

    #[error("image decode error: {0}")]
    ImageDecode(String),

    #[error("encoder error: {0}")]
    Encoder(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SlidecastError {
    pub fn input_validation(msg: impl Into<String>) -> Self {
        Self::InputValidation(msg.into())
    }

    pub fn description_service(msg: impl Into<String>) -> Self {
        Self::DescriptionService(msg.into())
    }

    pub fn image_decode(msg: impl Into<String>) -> Self {
        Self::ImageDecode(msg.into())
    }

    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// The single human-readable message shown to the user for this failure.
    ///
    /// None of these are fatal; every message invites a retry.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InputValidation(_) => "Please upload at least 2 images to create a slideshow.",
            Self::DescriptionService(_) => {
                "Failed to generate slideshow. The AI model might be busy. Please try again."
            }
            Self::ImageDecode(_) | Self::Encoder(_) | Self::Validation(_) | Self::Other(_) => {
                "Sorry, there was an error generating the export. Please try again."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            SlidecastError::input_validation("x")
                .to_string()
                .contains("input validation error:")
        );
        assert!(
            SlidecastError::description_service("x")
                .to_string()
                .contains("description service error:")
        );
        assert!(
            SlidecastError::image_decode("x")
                .to_string()
                .contains("image decode error:")
        );
        assert!(
            SlidecastError::encoder("x")
                .to_string()
                .contains("encoder error:")
        );
        assert!(
            SlidecastError::validation("x")
                .to_string()
                .contains("validation error:")
        );
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = SlidecastError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn user_messages_are_grouped_by_operation() {
        assert!(
            SlidecastError::input_validation("one image")
                .user_message()
                .contains("at least 2 images")
        );
        assert!(
            SlidecastError::description_service("bad theme")
                .user_message()
                .contains("Failed to generate slideshow")
        );
        assert_eq!(
            SlidecastError::image_decode("x").user_message(),
            SlidecastError::encoder("y").user_message()
        );
    }
}
