//! Gemini `generateContent` schema support.
//!
//! This module converts generic conversations into Gemini requests and interprets the
//! responses, with a safety gate between the raw response and its projections.

pub mod assembler;
pub mod parts;
pub mod response;
pub mod safety;
pub mod types;

use serde::{Deserialize, Serialize};

pub use assembler::{AssembledConversation, ConversationAssembler, SystemInstructionMode};
pub use parts::{from_provider_parts, to_provider_parts};
pub use response::{
    GoogleLlmResponse, ResponseStream, extract_content, extract_parts, extract_text,
    extract_tool_calls, normalize, response_to_chat_generation, response_to_chat_result,
    response_to_generation, response_to_message, response_to_text,
};
pub use safety::{
    DefaultSafetyHandler, MessageSafetyHandler, SafetyHandler, SafetyReply, SafetyViolation,
    safe_apply,
};

/// Returns `true` for Gemini model names (case-insensitive `gemini` prefix).
pub fn is_model_gemini(model: &str) -> bool {
    model.to_lowercase().starts_with("gemini")
}

/// Wire schema family of a model served by the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    /// Gemini `generateContent` schema.
    #[default]
    Gemini,
    /// Anthropic messages schema.
    Claude,
}

impl ModelFamily {
    /// Detects the family from a model name. Unrecognized names are treated as Gemini.
    pub fn from_model(model: &str) -> Self {
        if model.to_lowercase().starts_with("claude") { Self::Claude } else { Self::Gemini }
    }
}
