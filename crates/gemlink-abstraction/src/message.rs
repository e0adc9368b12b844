//! Conversation messages and their content.

use serde::{Deserialize, Serialize};

/// A single piece of structured message content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text.
    Text {
        /// The text itself.
        text: String,
    },
    /// An image given as a `data:` URI or a remote URL.
    ImageUrl {
        /// The URL (possibly an inline `data:` URI).
        image_url: String,
    },
    /// A reference to externally stored media.
    Media {
        /// Location of the media (e.g. `gs://bucket/cat.png`).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_uri: Option<String>,
        /// Declared MIME type, if known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        /// Inline bytes, when the media has already been loaded.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Vec<u8>>,
    },
}

impl ContentPart {
    /// Creates a text part.
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self::Text { text: text.into() }
    }

    /// Creates an image part from a URL or `data:` URI.
    pub fn image_url<S: Into<String>>(url: S) -> Self {
        Self::ImageUrl { image_url: url.into() }
    }

    /// Creates a media reference by URI.
    pub fn media<S: Into<String>>(file_uri: S, mime_type: Option<String>) -> Self {
        Self::Media { file_uri: Some(file_uri.into()), mime_type, data: None }
    }

    /// Creates a media part that already carries its bytes.
    pub fn inline_media<S: Into<String>>(mime_type: S, data: Vec<u8>) -> Self {
        Self::Media { file_uri: None, mime_type: Some(mime_type.into()), data: Some(data) }
    }

    /// Returns the text if this is a text part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Message content: either a plain string or an ordered list of parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text content.
    Text(String),
    /// Structured, possibly multimodal, content.
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Concatenates every text fragment of the content.
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts.iter().filter_map(ContentPart::as_text).collect(),
        }
    }

    /// Returns `true` when the content holds no text and no parts.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Parts(parts) => parts.is_empty(),
        }
    }
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<ContentPart>> for MessageContent {
    fn from(parts: Vec<ContentPart>) -> Self {
        Self::Parts(parts)
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier used to match the tool result back to this call.
    pub id: String,
    /// Name of the tool to run.
    pub name: String,
    /// Arguments as a JSON object.
    pub args: serde_json::Value,
}

/// A message produced by the model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiMessage {
    /// Generated content.
    pub content: MessageContent,
    /// Tool invocations requested alongside (or instead of) the content.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl AiMessage {
    /// Creates an AI message with text content and no tool calls.
    pub fn new<C: Into<MessageContent>>(content: C) -> Self {
        Self { content: content.into(), tool_calls: Vec::new() }
    }

    /// Adds a tool call to the message.
    #[must_use]
    pub fn with_tool_call(mut self, tool_call: ToolCall) -> Self {
        self.tool_calls.push(tool_call);
        self
    }
}

/// One turn of a conversation.
///
/// `Generic` carries role-tagged messages whose role is not one of the four
/// conversational roles; providers decide how (or whether) to send them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    /// Instructions for the model.
    System {
        /// Instruction content.
        content: MessageContent,
    },
    /// Input from the user.
    Human {
        /// User content.
        content: MessageContent,
    },
    /// Output from the model.
    Ai(AiMessage),
    /// The result of a tool call.
    Tool {
        /// Id of the [`ToolCall`] this result answers.
        tool_call_id: String,
        /// Tool output.
        content: MessageContent,
    },
    /// A message with an application-defined role.
    Generic {
        /// The custom role name.
        #[serde(rename = "custom_role")]
        role: String,
        /// Message content.
        content: MessageContent,
    },
}

impl Message {
    /// Creates a system message.
    pub fn system<C: Into<MessageContent>>(content: C) -> Self {
        Self::System { content: content.into() }
    }

    /// Creates a human message.
    pub fn human<C: Into<MessageContent>>(content: C) -> Self {
        Self::Human { content: content.into() }
    }

    /// Creates an AI message without tool calls.
    pub fn ai<C: Into<MessageContent>>(content: C) -> Self {
        Self::Ai(AiMessage::new(content))
    }

    /// Creates a tool result message.
    pub fn tool<S: Into<String>, C: Into<MessageContent>>(tool_call_id: S, content: C) -> Self {
        Self::Tool { tool_call_id: tool_call_id.into(), content: content.into() }
    }

    /// Returns the role tag of the message.
    pub fn role(&self) -> &str {
        match self {
            Self::System { .. } => "system",
            Self::Human { .. } => "human",
            Self::Ai(_) => "ai",
            Self::Tool { .. } => "tool",
            Self::Generic { role, .. } => role,
        }
    }

    /// Returns the content of the message.
    pub fn content(&self) -> &MessageContent {
        match self {
            Self::System { content }
            | Self::Human { content }
            | Self::Tool { content, .. }
            | Self::Generic { content, .. } => content,
            Self::Ai(message) => &message.content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_roles() {
        assert_eq!(Message::system("s").role(), "system");
        assert_eq!(Message::human("h").role(), "human");
        assert_eq!(Message::ai("a").role(), "ai");
        assert_eq!(Message::tool("id", "{}").role(), "tool");
        let generic = Message::Generic { role: "critic".to_string(), content: "x".into() };
        assert_eq!(generic.role(), "critic");
    }

    #[test]
    fn test_content_text_concatenates_parts() {
        let content = MessageContent::Parts(vec![
            ContentPart::text("Hello, "),
            ContentPart::image_url("https://example.com/a.png"),
            ContentPart::text("world"),
        ]);
        assert_eq!(content.text(), "Hello, world");
    }

    #[test]
    fn test_content_part_serialization_is_tagged() {
        let json = serde_json::to_value(ContentPart::media("gs://b/a.png", None)).unwrap();
        assert_eq!(json["type"], "media");
        assert_eq!(json["file_uri"], "gs://b/a.png");
        assert!(json.get("mime_type").is_none());
    }

    #[test]
    fn test_message_content_untagged_roundtrip() {
        let text: MessageContent = serde_json::from_str("\"hi\"").unwrap();
        assert_eq!(text, MessageContent::Text("hi".to_string()));

        let parts: MessageContent =
            serde_json::from_str(r#"[{"type":"text","text":"hi"}]"#).unwrap();
        assert_eq!(parts, MessageContent::Parts(vec![ContentPart::text("hi")]));
    }
}
