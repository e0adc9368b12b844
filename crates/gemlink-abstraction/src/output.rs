//! Generation results returned by chat models.

use crate::message::{AiMessage, MessageContent};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Provider-specific details attached to a generation (finish reason, ratings, ...).
pub type GenerationInfo = HashMap<String, serde_json::Value>;

/// Usage statistics for a model request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelUsage {
    /// Number of tokens in the prompt.
    pub prompt_tokens: u32,

    /// Number of tokens in the completion.
    pub completion_tokens: u32,

    /// Total number of tokens used.
    pub total_tokens: u32,
}

/// A plain text generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    /// The generated text.
    pub text: String,
    /// Optional provider details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_info: Option<GenerationInfo>,
}

/// A chat generation: the generated message plus its flattened text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatGeneration {
    /// Text of the generated message.
    pub text: String,
    /// The generated message.
    pub message: AiMessage,
    /// Optional provider details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_info: Option<GenerationInfo>,
}

/// The full result of a chat request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResult {
    /// Generations, most relevant first. Empty when the provider produced nothing.
    pub generations: Vec<ChatGeneration>,
    /// Token usage, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<ModelUsage>,
}

impl ChatResult {
    /// Returns the first generated message, or an empty AI message if there is none.
    pub fn into_message(self) -> AiMessage {
        self.generations
            .into_iter()
            .next()
            .map(|generation| generation.message)
            .unwrap_or_else(|| AiMessage::new(MessageContent::default()))
    }
}
