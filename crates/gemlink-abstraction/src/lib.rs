//! Chat model abstraction layer for gemlink.
//!
//! This crate defines the provider-agnostic types (messages, content parts,
//! tool definitions, generation results) and the traits chat model
//! integrations implement.

pub mod message;
pub mod output;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

pub use message::{AiMessage, ContentPart, Message, MessageContent, ToolCall};
pub use output::{ChatGeneration, ChatResult, Generation, GenerationInfo, ModelUsage};

/// A tool the model may call, described by a JSON schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name, as the model will refer to it.
    pub name: String,
    /// What the tool does.
    pub description: String,
    /// JSON schema of the tool arguments.
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Creates a tool definition.
    pub fn new<N: Into<String>, D: Into<String>>(
        name: N,
        description: D,
        parameters: serde_json::Value,
    ) -> Self {
        Self { name: name.into(), description: description.into(), parameters }
    }
}

/// A forward-only stream of chat generation chunks.
pub type ChatStream<E> = BoxStream<'static, Result<ChatGeneration, E>>;

/// A trait for chat models.
///
/// All models must be `Send + Sync` to allow concurrent use across threads.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// The error type returned by the model.
    type Error: std::error::Error + Send + 'static;

    /// Generates a chat result for the given conversation.
    ///
    /// # Arguments
    /// * `messages` - The conversation history
    ///
    /// # Errors
    /// Returns `Self::Error` if the request cannot be built, sent, or interpreted.
    async fn generate(&self, messages: &[Message]) -> Result<ChatResult, Self::Error>;

    /// Generates the next AI message for the given conversation.
    ///
    /// # Errors
    /// Returns `Self::Error` if generation fails.
    async fn invoke(&self, messages: &[Message]) -> Result<AiMessage, Self::Error> {
        Ok(self.generate(messages).await?.into_message())
    }

    /// Returns the ID of the model.
    fn model_id(&self) -> &str;
}

/// A chat model that can stream its output chunk by chunk.
#[async_trait]
pub trait StreamingChatModel: ChatModel {
    /// Starts a streaming generation.
    ///
    /// Dropping the returned stream stops consumption; cancelling the underlying
    /// request is up to the transport.
    ///
    /// # Errors
    /// Returns `Self::Error` if the request cannot be built or sent.
    async fn stream(&self, messages: &[Message]) -> Result<ChatStream<Self::Error>, Self::Error>;
}
