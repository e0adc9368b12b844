//! Error types for the Google model integration.

use crate::config::ConfigError;
use crate::gemini::safety::SafetyViolation;
use thiserror::Error;

/// Errors raised while converting, sending, or interpreting a Google model request.
#[derive(Error, Debug)]
pub enum GoogleError {
    /// A generation parameter is out of range.
    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// The parameter name as it appears on the wire (e.g. `topP`).
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// An `image_url` part has an empty URL.
    #[error("Missing Image URL")]
    MissingImageUrl,

    /// A media part is malformed or was not resolved before encoding.
    #[error("Invalid media content: {0}")]
    InvalidMediaContent(String),

    /// A media reference could not be resolved through the blob stores.
    #[error("Media resolution failed for {uri}: {reason}")]
    MediaResolutionFailed {
        /// The unresolved URI.
        uri: String,
        /// Why resolution failed.
        reason: String,
    },

    /// A system message appeared somewhere other than the start of the conversation.
    #[error("Unsupported system message: {0}")]
    UnsupportedSystemMessage(String),

    /// A streaming response was passed where a complete response is required.
    #[error("Cannot normalize a streaming response")]
    CannotNormalizeStream,

    /// The provider blocked the prompt or the generation.
    #[error("Safety violation: {0}")]
    SafetyViolation(Box<SafetyViolation>),

    /// The blob store failed.
    #[error("Blob store error: {0}")]
    BlobStore(String),

    /// The transport failed to deliver the request.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The provider answered with a non-success status.
    #[error("Provider returned status {status}: {body}")]
    ProviderStatus {
        /// HTTP status code.
        status: u16,
        /// Response body, as text.
        body: String,
    },

    /// The model configuration is unusable.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A payload could not be serialized or deserialized.
    #[error("Serialization Error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GoogleError {
    /// Returns the safety violation if this error is one.
    pub fn as_safety_violation(&self) -> Option<&SafetyViolation> {
        match self {
            Self::SafetyViolation(violation) => Some(violation),
            _ => None,
        }
    }
}

impl From<SafetyViolation> for GoogleError {
    fn from(violation: SafetyViolation) -> Self {
        Self::SafetyViolation(Box::new(violation))
    }
}

impl From<reqwest::Error> for GoogleError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Result type alias for Google model operations.
pub type Result<T> = std::result::Result<T, GoogleError>;
