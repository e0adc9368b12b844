//! Response normalization and projection into generic outputs.

use super::parts::from_provider_parts;
use super::types::{GeminiPart, GenerateContentResponse};
use crate::error::{GoogleError, Result};
use crate::transport::RawResponse;
use futures::StreamExt;
use futures::stream::BoxStream;
use gemlink_abstraction::{
    AiMessage, ChatGeneration, ChatResult, ContentPart, Generation, GenerationInfo, MessageContent,
    ModelUsage, ToolCall,
};
use serde_json::Value;

/// A forward-only stream of response payloads.
pub type ResponseStream = BoxStream<'static, Result<GenerateContentResponse>>;

/// A provider response in one of the shapes the transport can deliver.
pub enum GoogleLlmResponse {
    /// One complete payload.
    Single(GenerateContentResponse),
    /// A fully received streamed answer, one payload per chunk.
    Chunks(Vec<GenerateContentResponse>),
    /// A live cursor over payloads.
    Stream(ResponseStream),
}

impl std::fmt::Debug for GoogleLlmResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(payload) => f.debug_tuple("Single").field(payload).finish(),
            Self::Chunks(chunks) => f.debug_tuple("Chunks").field(chunks).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<GenerateContentResponse> for GoogleLlmResponse {
    fn from(payload: GenerateContentResponse) -> Self {
        Self::Single(payload)
    }
}

impl GoogleLlmResponse {
    /// Decodes a raw transport response.
    ///
    /// # Errors
    /// Returns `Serialization` if a payload does not match the response schema.
    /// Stream items are decoded lazily, so their errors surface as stream items.
    pub fn from_raw(raw: RawResponse) -> Result<Self> {
        match raw {
            RawResponse::Single(value) => Ok(Self::Single(serde_json::from_value(value)?)),
            RawResponse::Chunks(values) => Ok(Self::Chunks(
                values.into_iter().map(serde_json::from_value).collect::<std::result::Result<_, _>>()?,
            )),
            RawResponse::Stream(stream) => Ok(Self::Stream(
                stream
                    .map(|item| {
                        item.and_then(|value| {
                            serde_json::from_value::<GenerateContentResponse>(value)
                                .map_err(GoogleError::from)
                        })
                    })
                    .boxed(),
            )),
        }
    }

    /// Returns `true` for a live stream.
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }
}

/// Collapses a response into one payload.
///
/// Chunks are merged left to right: the parts of each later chunk's first candidate are
/// appended to the first candidate, and `promptFeedback` takes the latest chunk's value.
/// Other candidates of later chunks are ignored.
///
/// # Errors
/// Returns `CannotNormalizeStream` for a live stream.
pub fn normalize(response: &GoogleLlmResponse) -> Result<GenerateContentResponse> {
    match response {
        GoogleLlmResponse::Single(payload) => Ok(payload.clone()),
        GoogleLlmResponse::Chunks(chunks) => Ok(merge_chunks(chunks)),
        GoogleLlmResponse::Stream(_) => Err(GoogleError::CannotNormalizeStream),
    }
}

fn merge_chunks(chunks: &[GenerateContentResponse]) -> GenerateContentResponse {
    let mut chunks = chunks.iter();
    let Some(first) = chunks.next() else {
        return GenerateContentResponse::default();
    };

    let mut merged = first.clone();
    for chunk in chunks {
        if let Some(candidate) = chunk.candidates.first() {
            match merged.candidates.first_mut() {
                Some(target) => {
                    let parts = candidate
                        .content
                        .as_ref()
                        .map(|content| content.parts.clone())
                        .unwrap_or_default();
                    target.content.get_or_insert_with(Default::default).parts.extend(parts);
                }
                None => merged.candidates.push(candidate.clone()),
            }
        }
        merged.prompt_feedback.clone_from(&chunk.prompt_feedback);
    }
    merged
}

fn payload_parts(payload: &GenerateContentResponse) -> &[GeminiPart] {
    payload
        .first_candidate()
        .and_then(|candidate| candidate.content.as_ref())
        .map(|content| content.parts.as_slice())
        .unwrap_or(&[])
}

fn payload_text(payload: &GenerateContentResponse) -> String {
    payload_parts(payload).iter().filter_map(GeminiPart::as_text).collect()
}

fn payload_tool_calls(payload: &GenerateContentResponse) -> Vec<ToolCall> {
    payload_parts(payload)
        .iter()
        .filter_map(|part| match part {
            GeminiPart::FunctionCall { function_call } => Some(ToolCall {
                id: uuid::Uuid::new_v4().to_string(),
                name: function_call.name.clone(),
                args: function_call.args.clone(),
            }),
            _ => None,
        })
        .collect()
}

fn payload_message(payload: &GenerateContentResponse) -> AiMessage {
    let parts = from_provider_parts(payload_parts(payload));
    let content = if parts.iter().all(|part| matches!(part, ContentPart::Text { .. })) {
        MessageContent::Text(parts.iter().filter_map(ContentPart::as_text).collect())
    } else {
        MessageContent::Parts(parts)
    };
    AiMessage { content, tool_calls: payload_tool_calls(payload) }
}

fn payload_generation_info(payload: &GenerateContentResponse) -> Option<GenerationInfo> {
    let mut info = GenerationInfo::new();
    if let Some(candidate) = payload.first_candidate() {
        if let Some(reason) = &candidate.finish_reason {
            info.insert("finish_reason".to_string(), Value::String(reason.clone()));
        }
        if !candidate.safety_ratings.is_empty() {
            if let Ok(ratings) = serde_json::to_value(&candidate.safety_ratings) {
                info.insert("safety_ratings".to_string(), ratings);
            }
        }
    }
    if let Some(version) = &payload.model_version {
        info.insert("model_version".to_string(), Value::String(version.clone()));
    }
    (!info.is_empty()).then_some(info)
}

fn payload_usage(payload: &GenerateContentResponse) -> Option<ModelUsage> {
    payload.usage_metadata.map(|usage| ModelUsage {
        prompt_tokens: usage.prompt_token_count,
        completion_tokens: usage.candidates_token_count,
        total_tokens: usage.total_token_count,
    })
}

fn payload_chat_generation(payload: &GenerateContentResponse) -> ChatGeneration {
    ChatGeneration {
        text: payload_text(payload),
        message: payload_message(payload),
        generation_info: payload_generation_info(payload),
    }
}

/// Parts of the first candidate of the normalized response.
///
/// # Errors
/// Returns `CannotNormalizeStream` for a live stream.
pub fn extract_parts(response: &GoogleLlmResponse) -> Result<Vec<GeminiPart>> {
    Ok(payload_parts(&normalize(response)?).to_vec())
}

/// Concatenation of every text part, without separators.
///
/// # Errors
/// Returns `CannotNormalizeStream` for a live stream.
pub fn extract_text(response: &GoogleLlmResponse) -> Result<String> {
    Ok(payload_text(&normalize(response)?))
}

/// Generic content of the response. Function calls are not included.
///
/// # Errors
/// Returns `CannotNormalizeStream` for a live stream.
pub fn extract_content(response: &GoogleLlmResponse) -> Result<MessageContent> {
    Ok(MessageContent::Parts(from_provider_parts(payload_parts(&normalize(response)?))))
}

/// Function calls of the response, each with a freshly generated id.
///
/// # Errors
/// Returns `CannotNormalizeStream` for a live stream.
pub fn extract_tool_calls(response: &GoogleLlmResponse) -> Result<Vec<ToolCall>> {
    Ok(payload_tool_calls(&normalize(response)?))
}

/// Projects a response to its text.
///
/// # Errors
/// Returns `CannotNormalizeStream` for a live stream.
pub fn response_to_text(response: &GoogleLlmResponse) -> Result<String> {
    extract_text(response)
}

/// Projects a response to a text generation.
///
/// # Errors
/// Returns `CannotNormalizeStream` for a live stream.
pub fn response_to_generation(response: &GoogleLlmResponse) -> Result<Generation> {
    let payload = normalize(response)?;
    Ok(Generation { text: payload_text(&payload), generation_info: payload_generation_info(&payload) })
}

/// Projects a response to an AI message. Text-only content collapses to a plain string.
///
/// # Errors
/// Returns `CannotNormalizeStream` for a live stream.
pub fn response_to_message(response: &GoogleLlmResponse) -> Result<AiMessage> {
    Ok(payload_message(&normalize(response)?))
}

/// Projects a response to a chat generation.
///
/// # Errors
/// Returns `CannotNormalizeStream` for a live stream.
pub fn response_to_chat_generation(response: &GoogleLlmResponse) -> Result<ChatGeneration> {
    Ok(payload_chat_generation(&normalize(response)?))
}

/// Projects a response to a chat result.
///
/// The result has no generations when the first candidate has no parts (for example
/// when the prompt was blocked).
///
/// # Errors
/// Returns `CannotNormalizeStream` for a live stream.
pub fn response_to_chat_result(response: &GoogleLlmResponse) -> Result<ChatResult> {
    let payload = normalize(response)?;
    let generations = if payload_parts(&payload).is_empty() {
        Vec::new()
    } else {
        vec![payload_chat_generation(&payload)]
    };
    Ok(ChatResult { generations, usage: payload_usage(&payload) })
}
