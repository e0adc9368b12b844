//! Builds Gemini `contents` from a generic conversation.

use super::is_model_gemini;
use super::parts::to_provider_parts;
use super::types::{
    GeminiContent, GeminiFunctionCall, GeminiFunctionResponse, GeminiPart, GeminiRole,
    GeminiSystemInstruction,
};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::{GoogleError, Result};
use crate::media::MediaManager;
use gemlink_abstraction::{Message, MessageContent};
use serde_json::{Value, json};
use std::collections::HashMap;

/// Text of the model turn inserted after a folded system message.
pub const SYSTEM_ACKNOWLEDGEMENT: &str = "Ok";

/// Where system instructions go in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemInstructionMode {
    /// Send the system message as a `user` turn followed by a `model` "Ok" turn.
    FoldIntoContents,
    /// Send the system message in the `systemInstruction` slot.
    Dedicated,
}

impl SystemInstructionMode {
    /// Picks the mode a model supports.
    ///
    /// Gemini models before 1.5 (and the unversioned `gemini-pro`) have no system
    /// instruction slot.
    pub fn for_model(model: &str) -> Self {
        if !is_model_gemini(model) {
            return Self::Dedicated;
        }
        match gemini_version(model) {
            Some(version) if version >= (1, 5) => Self::Dedicated,
            _ => Self::FoldIntoContents,
        }
    }

    /// Applies an explicit caller choice, falling back to [`Self::for_model`].
    pub fn resolve(convert_system_message_to_human: Option<bool>, model: &str) -> Self {
        match convert_system_message_to_human {
            Some(true) => Self::FoldIntoContents,
            Some(false) => Self::Dedicated,
            None => Self::for_model(model),
        }
    }
}

/// Parses `(major, minor)` out of names like `gemini-1.5-pro-002`.
fn gemini_version(model: &str) -> Option<(u32, u32)> {
    let lower = model.to_lowercase();
    let segment = lower.strip_prefix("gemini-")?.split('-').next()?;
    let mut numbers = segment.split('.');
    let major = numbers.next()?.parse().ok()?;
    let minor = numbers.next().map_or(Some(0), |minor| minor.parse().ok())?;
    Some((major, minor))
}

/// The result of assembling a conversation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledConversation {
    /// Ordered content turns.
    pub contents: Vec<GeminiContent>,
    /// System instruction, set only in dedicated mode.
    pub system_instruction: Option<GeminiSystemInstruction>,
}

/// Converts a conversation to Gemini contents in a single left-to-right pass.
pub struct ConversationAssembler<'a> {
    mode: SystemInstructionMode,
    media: Option<&'a MediaManager>,
    diagnostics: &'a dyn DiagnosticSink,
}

impl<'a> ConversationAssembler<'a> {
    /// Creates an assembler.
    pub fn new(mode: SystemInstructionMode, diagnostics: &'a dyn DiagnosticSink) -> Self {
        Self { mode, media: None, diagnostics }
    }

    /// Resolves media parts through `media` before encoding them.
    #[must_use]
    pub fn with_media(mut self, media: Option<&'a MediaManager>) -> Self {
        self.media = media;
        self
    }

    /// Assembles `messages`.
    ///
    /// # Errors
    /// Returns `UnsupportedSystemMessage` if a system message is not the first message,
    /// and any codec or media resolution error.
    pub async fn assemble(&self, messages: &[Message]) -> Result<AssembledConversation> {
        let mut assembled = AssembledConversation::default();
        let mut tool_names: HashMap<&str, &str> = HashMap::new();
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
                    let parts = self.encode(content).await?;
                    match self.mode {
                        SystemInstructionMode::FoldIntoContents => {
                            assembled.contents.push(GeminiContent::new(GeminiRole::User, parts));
                            assembled.contents.push(GeminiContent::new(
                                GeminiRole::Model,
                                vec![GeminiPart::text(SYSTEM_ACKNOWLEDGEMENT)],
                            ));
                        }
                        SystemInstructionMode::Dedicated => {
                            assembled.system_instruction = Some(GeminiSystemInstruction { parts });
                        }
                    }
                }
                Message::Human { content } => {
                    let parts = self.encode(content).await?;
                    assembled.contents.push(GeminiContent::new(GeminiRole::User, parts));
                }
                Message::Ai(ai) => {
                    let mut parts = self.encode(&ai.content).await?;
                    if !ai.tool_calls.is_empty() {
                        parts.retain(|part| part.as_text().is_none_or(|text| !text.is_empty()));
                        for call in &ai.tool_calls {
                            tool_names.insert(&call.id, &call.name);
                            parts.push(GeminiPart::FunctionCall {
                                function_call: GeminiFunctionCall {
                                    name: call.name.clone(),
                                    args: call.args.clone(),
                                },
                            });
                        }
                    }
                    assembled.contents.push(GeminiContent::new(GeminiRole::Model, parts));
                }
                Message::Tool { tool_call_id, content } => {
                    let name = if let Some(name) = tool_names.get(tool_call_id.as_str()) {
                        (*name).to_string()
                    } else {
                        self.diagnostics.report(Diagnostic::UnknownToolCallId {
                            tool_call_id: tool_call_id.clone(),
                        });
                        tool_call_id.clone()
                    };
                    let part = GeminiPart::FunctionResponse {
                        function_response: GeminiFunctionResponse {
                            name,
                            response: tool_response(content),
                        },
                    };
                    match assembled.contents.last_mut() {
                        Some(last) if previous_was_tool => last.parts.push(part),
                        _ => assembled.contents.push(GeminiContent::new(GeminiRole::User, vec![part])),
                    }
                }
                Message::Generic { role, .. } => {
                    self.diagnostics.report(Diagnostic::UnsupportedMessage { role: role.clone() });
                }
            }

            previous_was_tool = is_tool;
        }

        Ok(assembled)
    }

    async fn encode(&self, content: &MessageContent) -> Result<Vec<GeminiPart>> {
        match self.media {
            Some(media) => to_provider_parts(&media.resolve_content(content).await?),
            None => to_provider_parts(content),
        }
    }
}

/// Tool output as a JSON object: parsed when it already is one, wrapped otherwise.
pub(crate) fn tool_response(content: &MessageContent) -> Value {
    let text = content.text();
    match serde_json::from_str::<Value>(&text) {
        Ok(value @ Value::Object(_)) => value,
        _ => json!({ "content": text }),
    }
}
