//! Anthropic messages schema, for Claude models served through the same platform.
//!
//! The conversation rules match the Gemini assembler: a system message is only allowed
//! first, tool results go back as `user` turns, and consecutive tool results share a
//! turn. The system text goes in the dedicated `system` field.

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::{GoogleError, Result};
use crate::gemini::parts::parse_data_uri;
use crate::media::MediaManager;
use crate::params::GoogleModelParams;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use gemlink_abstraction::{
    AiMessage, ChatGeneration, ChatResult, ContentPart, GenerationInfo, Message, MessageContent,
    ModelUsage, ToolCall, ToolDefinition,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `anthropic_version` sent to the platform.
pub const ANTHROPIC_VERSION: &str = "vertex-2023-10-16";

/// `max_tokens` used when no output limit is configured.
pub const DEFAULT_MAX_TOKENS: i32 = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnthropicRole {
    User,
    Assistant,
}

/// Where an image or document comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicSource {
    Base64 { media_type: String, data: String },
    Url { url: String },
}

/// One content block of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicContent {
    Text {
        text: String,
    },
    Image {
        source: AnthropicSource,
    },
    Document {
        source: AnthropicSource,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
    /// Block types this crate does not interpret.
    #[serde(other)]
    Unknown,
}

impl AnthropicContent {
    fn text<S: Into<String>>(text: S) -> Self {
        Self::Text { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnthropicMessage {
    pub role: AnthropicRole,
    pub content: Vec<AnthropicContent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnthropicTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl From<&ToolDefinition> for AnthropicTool {
    fn from(tool: &ToolDefinition) -> Self {
        Self {
            name: tool.name.clone(),
            description: tool.description.clone(),
            input_schema: tool.parameters.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicToolChoice {
    Auto,
    Any,
    Tool { name: String },
}

/// A `rawPredict` request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnthropicRequest {
    pub anthropic_version: String,
    pub messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub max_tokens: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<AnthropicTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<AnthropicToolChoice>,
}

impl AnthropicRequest {
    /// Creates a request with sampling settings taken from `params`.
    pub fn new(
        messages: Vec<AnthropicMessage>,
        system: Option<String>,
        params: &GoogleModelParams,
    ) -> Self {
        Self {
            anthropic_version: ANTHROPIC_VERSION.to_string(),
            messages,
            system,
            max_tokens: params.max_output_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: params.temperature,
            top_p: params.top_p,
            top_k: params.top_k,
            stop_sequences: params.stop_sequences.clone(),
            tools: Vec::new(),
            tool_choice: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnthropicUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

/// A `rawPredict` response body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnthropicResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub content: Vec<AnthropicContent>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Option<AnthropicUsage>,
}

/// The system text and message list of an assembled conversation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnthropicConversation {
    pub system: Option<String>,
    pub messages: Vec<AnthropicMessage>,
}

/// Converts message content into content blocks.
///
/// # Errors
/// Returns `MissingImageUrl` or `InvalidMediaContent` for unusable image or media parts.
pub fn content_to_blocks(content: &MessageContent) -> Result<Vec<AnthropicContent>> {
    match content {
        MessageContent::Text(text) => Ok(vec![AnthropicContent::text(text.clone())]),
        MessageContent::Parts(parts) => parts.iter().map(part_to_block).collect(),
    }
}

fn part_to_block(part: &ContentPart) -> Result<AnthropicContent> {
    match part {
        ContentPart::Text { text } => Ok(AnthropicContent::text(text.clone())),
        ContentPart::ImageUrl { image_url } => {
            if image_url.is_empty() {
                return Err(GoogleError::MissingImageUrl);
            }
            let source = match image_url.strip_prefix("data:") {
                Some(rest) => {
                    let (media_type, data) = parse_data_uri(rest)?;
                    AnthropicSource::Base64 { media_type, data }
                }
                None => AnthropicSource::Url { url: image_url.clone() },
            };
            Ok(AnthropicContent::Image { source })
        }
        ContentPart::Media { file_uri, mime_type, data } => {
            let Some(mime_type) = mime_type else {
                return Err(GoogleError::InvalidMediaContent(format!(
                    "media {} has no mime type",
                    file_uri.as_deref().unwrap_or("<inline>")
                )));
            };
            let source = match (data, file_uri) {
                (Some(data), _) => {
                    AnthropicSource::Base64 { media_type: mime_type.clone(), data: STANDARD.encode(data) }
                }
                (None, Some(uri)) => AnthropicSource::Url { url: uri.clone() },
                (None, None) => {
                    return Err(GoogleError::InvalidMediaContent(
                        "media has neither data nor a URI".to_string(),
                    ));
                }
            };
            if mime_type.starts_with("image/") {
                Ok(AnthropicContent::Image { source })
            } else {
                Ok(AnthropicContent::Document { source })
            }
        }
    }
}

/// Assembles a conversation for the messages schema.
///
/// # Errors
/// Returns `UnsupportedSystemMessage` if a system message is not first,
/// `InvalidMediaContent` if it holds non-text parts, and any content or media resolution
/// error.
pub async fn assemble_conversation(
    messages: &[Message],
    media: Option<&MediaManager>,
    diagnostics: &dyn DiagnosticSink,
) -> Result<AnthropicConversation> {
    let mut conversation = AnthropicConversation::default();
    let mut previous_was_tool = false;

    for (index, message) in messages.iter().enumerate() {
        let is_tool = matches!(message, Message::Tool { .. });

        match message {
            Message::System { content } => {
                if index != 0 {
                    return Err(GoogleError::UnsupportedSystemMessage(format!(
                        "system message at position {index}; it must be the first message"
                    )));
                }
                let has_media = matches!(
                    content,
                    MessageContent::Parts(parts)
                        if parts.iter().any(|part| !matches!(part, ContentPart::Text { .. }))
                );
                if has_media {
                    return Err(GoogleError::InvalidMediaContent(
                        "Claude system messages accept text parts only".to_string(),
                    ));
                }
                conversation.system = Some(content.text());
            }
            Message::Human { content } => {
                let content = encode(content, media).await?;
                conversation.messages.push(AnthropicMessage { role: AnthropicRole::User, content });
            }
            Message::Ai(ai) => {
                let mut content = encode(&ai.content, media).await?;
                if !ai.tool_calls.is_empty() {
                    content.retain(|block| !matches!(block, AnthropicContent::Text { text } if text.is_empty()));
                    content.extend(ai.tool_calls.iter().map(|call| AnthropicContent::ToolUse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: call.args.clone(),
                    }));
                }
                conversation
                    .messages
                    .push(AnthropicMessage { role: AnthropicRole::Assistant, content });
            }
            Message::Tool { tool_call_id, content } => {
                let block = AnthropicContent::ToolResult {
                    tool_use_id: tool_call_id.clone(),
                    content: content.text(),
                };
                match conversation.messages.last_mut() {
                    Some(last) if previous_was_tool => last.content.push(block),
                    _ => conversation
                        .messages
                        .push(AnthropicMessage { role: AnthropicRole::User, content: vec![block] }),
                }
            }
            Message::Generic { role, .. } => {
                diagnostics.report(Diagnostic::UnsupportedMessage { role: role.clone() });
            }
        }

        previous_was_tool = is_tool;
    }

    Ok(conversation)
}

async fn encode(
    content: &MessageContent,
    media: Option<&MediaManager>,
) -> Result<Vec<AnthropicContent>> {
    match media {
        Some(media) => content_to_blocks(&media.resolve_content(content).await?),
        None => content_to_blocks(content),
    }
}

/// Projects a response to an AI message. Tool use ids are kept.
pub fn response_to_message(response: &AnthropicResponse) -> AiMessage {
    let text: String = response
        .content
        .iter()
        .filter_map(|block| match block {
            AnthropicContent::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    let tool_calls = response
        .content
        .iter()
        .filter_map(|block| match block {
            AnthropicContent::ToolUse { id, name, input } => {
                Some(ToolCall { id: id.clone(), name: name.clone(), args: input.clone() })
            }
            _ => None,
        })
        .collect();
    AiMessage { content: MessageContent::Text(text), tool_calls }
}

/// Projects a response to a chat result. An empty response has no generations.
pub fn response_to_chat_result(response: &AnthropicResponse) -> ChatResult {
    let usage = response.usage.map(|usage| ModelUsage {
        prompt_tokens: usage.input_tokens,
        completion_tokens: usage.output_tokens,
        total_tokens: usage.input_tokens + usage.output_tokens,
    });
    if response.content.is_empty() {
        return ChatResult { generations: Vec::new(), usage };
    }

    let message = response_to_message(response);
    let mut info = GenerationInfo::new();
    if let Some(reason) = &response.stop_reason {
        info.insert("finish_reason".to_string(), Value::String(reason.clone()));
    }
    if let Some(model) = &response.model {
        info.insert("model_version".to_string(), Value::String(model.clone()));
    }

    ChatResult {
        generations: vec![ChatGeneration {
            text: message.content.text(),
            message,
            generation_info: (!info.is_empty()).then_some(info),
        }],
        usage,
    }
}
