//! Safety gate: pluggable policies applied to responses before projection.

use super::response::{GoogleLlmResponse, normalize};
use super::types::{Candidate, GeminiContent, GeminiPart, GeminiRole, GenerateContentResponse};
use crate::error::GoogleError;
use gemlink_abstraction::{AiMessage, ChatGeneration, ChatResult, Generation};
use thiserror::Error;
use tracing::warn;

/// Finish reasons that mean the generation was cut short by a policy.
pub const ERROR_FINISH_REASONS: [&str; 3] = ["SAFETY", "RECITATION", "OTHER"];

/// The partial result salvaged from a response that failed the safety check.
#[derive(Debug, Clone, PartialEq)]
pub enum SafetyReply {
    Text(String),
    Generation(Generation),
    Message(AiMessage),
    ChatGeneration(ChatGeneration),
    ChatResult(ChatResult),
}

impl From<String> for SafetyReply {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Generation> for SafetyReply {
    fn from(generation: Generation) -> Self {
        Self::Generation(generation)
    }
}

impl From<AiMessage> for SafetyReply {
    fn from(message: AiMessage) -> Self {
        Self::Message(message)
    }
}

impl From<ChatGeneration> for SafetyReply {
    fn from(generation: ChatGeneration) -> Self {
        Self::ChatGeneration(generation)
    }
}

impl From<ChatResult> for SafetyReply {
    fn from(result: ChatResult) -> Self {
        Self::ChatResult(result)
    }
}

/// A response rejected by a [`SafetyHandler`].
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SafetyViolation {
    message: String,
    response: GoogleLlmResponse,
    reply: Option<SafetyReply>,
}

impl SafetyViolation {
    /// Creates a violation for `response` without a reply.
    pub fn new<S: Into<String>>(message: S, response: GoogleLlmResponse) -> Self {
        Self { message: message.into(), response, reply: None }
    }

    /// Attaches the projected partial result.
    #[must_use]
    pub fn with_reply(mut self, reply: SafetyReply) -> Self {
        self.reply = Some(reply);
        self
    }

    /// Why the response was rejected (e.g. `Prompt blocked: SAFETY`).
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The response that triggered the violation.
    pub fn response(&self) -> &GoogleLlmResponse {
        &self.response
    }

    /// The partial result, if one could be projected.
    pub fn reply(&self) -> Option<&SafetyReply> {
        self.reply.as_ref()
    }
}

/// Inspects a response and either returns it (possibly rewritten) or rejects it.
pub trait SafetyHandler: Send + Sync {
    /// Applies the policy.
    ///
    /// # Errors
    /// Returns a `SafetyViolation` if the response must not be used.
    fn handle(&self, response: GoogleLlmResponse) -> Result<GoogleLlmResponse, SafetyViolation>;
}

impl<F> SafetyHandler for F
where
    F: Fn(GoogleLlmResponse) -> Result<GoogleLlmResponse, SafetyViolation> + Send + Sync,
{
    fn handle(&self, response: GoogleLlmResponse) -> Result<GoogleLlmResponse, SafetyViolation> {
        self(response)
    }
}

fn payload_violation(payload: &GenerateContentResponse) -> Option<String> {
    if let Some(reason) =
        payload.prompt_feedback.as_ref().and_then(|feedback| feedback.block_reason.as_ref())
    {
        return Some(format!("Prompt blocked: {reason}"));
    }

    payload
        .candidates
        .iter()
        .filter_map(|candidate| candidate.finish_reason.as_deref())
        .find(|reason| ERROR_FINISH_REASONS.contains(reason))
        .map(|reason| format!("Finish reason: {reason}"))
}

/// The message the default policy would reject `response` with, if any.
/// Live streams are never rejected.
fn violation_message(response: &GoogleLlmResponse) -> Option<String> {
    match response {
        GoogleLlmResponse::Single(payload) => payload_violation(payload),
        GoogleLlmResponse::Chunks(chunks) => chunks.iter().find_map(payload_violation),
        GoogleLlmResponse::Stream(_) => None,
    }
}

/// Rejects blocked prompts and generations stopped for safety, recitation or other
/// policy reasons. Each chunk of a chunked response is checked.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSafetyHandler;

impl SafetyHandler for DefaultSafetyHandler {
    fn handle(&self, response: GoogleLlmResponse) -> Result<GoogleLlmResponse, SafetyViolation> {
        match violation_message(&response) {
            Some(message) => Err(SafetyViolation::new(message, response)),
            None => Ok(response),
        }
    }
}

/// Replaces responses the default policy would reject with a fixed model message.
#[derive(Debug, Clone)]
pub struct MessageSafetyHandler {
    message: String,
}

impl MessageSafetyHandler {
    /// Creates a handler answering with `message`.
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self { message: message.into() }
    }
}

impl SafetyHandler for MessageSafetyHandler {
    fn handle(&self, response: GoogleLlmResponse) -> Result<GoogleLlmResponse, SafetyViolation> {
        let Some(reason) = violation_message(&response) else {
            return Ok(response);
        };
        let original = match normalize(&response) {
            Ok(payload) => payload,
            Err(_) => return Ok(response),
        };
        warn!(reason = %reason, "Replacing unsafe response with the configured message");

        let finish_reason = original.first_candidate().and_then(|c| c.finish_reason.clone());
        let replacement = GenerateContentResponse {
            candidates: vec![Candidate {
                content: Some(GeminiContent::new(
                    GeminiRole::Model,
                    vec![GeminiPart::text(self.message.clone())],
                )),
                finish_reason,
                ..Candidate::default()
            }],
            prompt_feedback: None,
            usage_metadata: original.usage_metadata,
            model_version: original.model_version,
        };
        Ok(GoogleLlmResponse::Single(replacement))
    }
}

/// Runs `handler` on `response`, then `projector` on the result.
///
/// On a violation the same projector runs on the rejected response, and its output is
/// attached as the reply of the returned violation. A projection that fails there
/// keeps whatever reply the handler attached.
///
/// # Errors
/// Returns `SafetyViolation` when the handler rejects the response, or the projector's
/// error.
pub fn safe_apply<T, F>(
    response: GoogleLlmResponse,
    handler: &dyn SafetyHandler,
    projector: F,
) -> Result<T, GoogleError>
where
    T: Into<SafetyReply>,
    F: Fn(&GoogleLlmResponse) -> Result<T, GoogleError>,
{
    match handler.handle(response) {
        Ok(handled) => projector(&handled),
        Err(violation) => match projector(violation.response()) {
            Ok(reply) => Err(violation.with_reply(reply.into()).into()),
            Err(_) => Err(violation.into()),
        },
    }
}
