//! Gemini `generateContent` wire types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Author of a Gemini content turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeminiRole {
    /// The user (also carries system text and tool results).
    User,
    /// The model.
    #[default]
    Model,
}

/// Inline base64 data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeminiInlineData {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    /// Base64-encoded payload.
    pub data: String,
}

/// Reference to a file by URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeminiFileData {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    #[serde(rename = "fileUri")]
    pub file_uri: String,
}

/// A function call emitted by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiFunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

/// The result of a function call, sent back by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiFunctionResponse {
    pub name: String,
    pub response: Value,
}

/// One part of a Gemini content turn.
///
/// Parts the provider adds in later API versions deserialize as `Unknown` and are
/// re-serialized verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
    FileData {
        #[serde(rename = "fileData")]
        file_data: GeminiFileData,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: GeminiFunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: GeminiFunctionResponse,
    },
    Unknown(Value),
}

impl GeminiPart {
    /// Creates a text part.
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self::Text { text: text.into() }
    }

    /// Returns the text if this is a text part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// A content turn: a role plus its ordered parts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeminiContent {
    #[serde(default)]
    pub role: GeminiRole,
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

impl GeminiContent {
    /// Creates a content turn.
    pub fn new(role: GeminiRole, parts: Vec<GeminiPart>) -> Self {
        Self { role, parts }
    }
}

/// The dedicated system instruction slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiSystemInstruction {
    pub parts: Vec<GeminiPart>,
}

/// A function the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiFunctionDeclaration {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// A tool entry of the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiTool {
    #[serde(rename = "functionDeclarations")]
    pub function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeminiFunctionCallingConfig {
    /// `AUTO`, `ANY` or `NONE`.
    pub mode: String,
    #[serde(rename = "allowedFunctionNames", skip_serializing_if = "Option::is_none")]
    pub allowed_function_names: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeminiToolConfig {
    #[serde(rename = "functionCallingConfig")]
    pub function_calling_config: GeminiFunctionCallingConfig,
}

impl GeminiToolConfig {
    /// Forces the model to call exactly the named function.
    pub fn force(function_name: &str) -> Self {
        Self {
            function_calling_config: GeminiFunctionCallingConfig {
                mode: "ANY".to_string(),
                allowed_function_names: Some(vec![function_name.to_string()]),
            },
        }
    }
}

/// Sampling parameters as sent on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(rename = "topP", skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(rename = "topK", skip_serializing_if = "Option::is_none")]
    pub top_k: Option<i32>,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<i32>,
    #[serde(rename = "stopSequences", skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(rename = "responseMimeType", skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
}

impl GeminiGenerationConfig {
    /// Returns `true` when no field is set.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// A safety threshold for one harm category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeminiSafetySetting {
    /// e.g. `HARM_CATEGORY_DANGEROUS_CONTENT`.
    pub category: String,
    /// e.g. `BLOCK_ONLY_HIGH`.
    pub threshold: String,
}

/// A full `generateContent` request body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeminiRequest {
    pub contents: Vec<GeminiContent>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GeminiSystemInstruction>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tools: Vec<GeminiTool>,
    #[serde(rename = "toolConfig", skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<GeminiToolConfig>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GeminiGenerationConfig>,
    #[serde(rename = "safetySettings", skip_serializing_if = "Vec::is_empty", default)]
    pub safety_settings: Vec<GeminiSafetySetting>,
}

/// A safety rating attached to a prompt or a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyRating {
    pub category: String,
    pub probability: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked: Option<bool>,
}

/// Feedback about the prompt itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptFeedback {
    #[serde(rename = "blockReason", default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
    #[serde(rename = "blockReasonMessage", default, skip_serializing_if = "Option::is_none")]
    pub block_reason_message: Option<String>,
    #[serde(rename = "safetyRatings", default, skip_serializing_if = "Vec::is_empty")]
    pub safety_ratings: Vec<SafetyRating>,
}

/// One candidate completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<GeminiContent>,
    #[serde(rename = "finishReason", default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(rename = "safetyRatings", default, skip_serializing_if = "Vec::is_empty")]
    pub safety_ratings: Vec<SafetyRating>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(rename = "citationMetadata", default, skip_serializing_if = "Option::is_none")]
    pub citation_metadata: Option<Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_field_names)] // Matches API naming
pub struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    pub prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    pub candidates_token_count: u32,
    #[serde(rename = "totalTokenCount", default)]
    pub total_token_count: u32,
}

/// A complete (or partial, when streamed) `generateContent` payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback", default, skip_serializing_if = "Option::is_none")]
    pub prompt_feedback: Option<PromptFeedback>,
    #[serde(rename = "usageMetadata", default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,
    #[serde(rename = "modelVersion", default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

impl GenerateContentResponse {
    /// Builds a payload with one `model` candidate holding the given parts.
    pub fn from_parts(parts: Vec<GeminiPart>) -> Self {
        Self {
            candidates: vec![Candidate {
                content: Some(GeminiContent::new(GeminiRole::Model, parts)),
                ..Candidate::default()
            }],
            ..Self::default()
        }
    }

    /// Builds a payload with one `model` candidate holding a single text part.
    pub fn from_text<S: Into<String>>(text: S) -> Self {
        Self::from_parts(vec![GeminiPart::text(text)])
    }

    /// The first candidate, if any.
    pub fn first_candidate(&self) -> Option<&Candidate> {
        self.candidates.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_part_shapes_on_the_wire() {
        let inline = GeminiPart::InlineData {
            inline_data: GeminiInlineData {
                mime_type: "image/png".to_string(),
                data: "AAA=".to_string(),
            },
        };
        assert_eq!(
            serde_json::to_value(&inline).unwrap(),
            json!({"inlineData": {"mimeType": "image/png", "data": "AAA="}})
        );

        let file = GeminiPart::FileData {
            file_data: GeminiFileData {
                mime_type: "image/png".to_string(),
                file_uri: "gs://bucket/cat.png".to_string(),
            },
        };
        assert_eq!(
            serde_json::to_value(&file).unwrap(),
            json!({"fileData": {"mimeType": "image/png", "fileUri": "gs://bucket/cat.png"}})
        );
    }

    #[test]
    fn test_unknown_part_is_preserved() {
        let raw = json!({"executableCode": {"language": "PYTHON", "code": "print(1)"}});
        let part: GeminiPart = serde_json::from_value(raw.clone()).unwrap();
        assert!(matches!(part, GeminiPart::Unknown(_)));
        assert_eq!(serde_json::to_value(&part).unwrap(), raw);
    }

    #[test]
    fn test_function_call_without_args() {
        let part: GeminiPart =
            serde_json::from_value(json!({"functionCall": {"name": "test"}})).unwrap();
        match part {
            GeminiPart::FunctionCall { function_call } => {
                assert_eq!(function_call.name, "test");
                assert!(function_call.args.is_null());
            }
            other => panic!("Expected FunctionCall, got {other:?}"),
        }
    }

    #[test]
    fn test_response_deserialization() {
        let raw = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hi"}]},
                "finishReason": "STOP",
                "safetyRatings": [
                    {"category": "HARM_CATEGORY_HARASSMENT", "probability": "NEGLIGIBLE"}
                ],
                "index": 0
            }],
            "promptFeedback": {"safetyRatings": []},
            "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 1, "totalTokenCount": 4}
        });
        let response: GenerateContentResponse = serde_json::from_value(raw).unwrap();
        let candidate = response.first_candidate().unwrap();
        assert_eq!(candidate.finish_reason.as_deref(), Some("STOP"));
        assert_eq!(candidate.safety_ratings.len(), 1);
        assert_eq!(response.usage_metadata.unwrap().total_token_count, 4);
        assert!(response.prompt_feedback.unwrap().block_reason.is_none());
    }

    #[test]
    fn test_request_omits_empty_sections() {
        let request = GeminiRequest {
            contents: vec![GeminiContent::new(GeminiRole::User, vec![GeminiPart::text("hi")])],
            ..GeminiRequest::default()
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value, json!({"contents": [{"role": "user", "parts": [{"text": "hi"}]}]}));
    }

    #[test]
    fn test_tool_config_force() {
        let value = serde_json::to_value(GeminiToolConfig::force("extract")).unwrap();
        assert_eq!(
            value,
            json!({"functionCallingConfig": {"mode": "ANY", "allowedFunctionNames": ["extract"]}})
        );
    }
}
