//! Conversion between generic content parts and Gemini parts.

use super::types::{GeminiFileData, GeminiInlineData, GeminiPart};
use crate::error::{GoogleError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use gemlink_abstraction::{ContentPart, MessageContent};

/// MIME type assumed for image URLs that are not `data:` URIs.
pub const DEFAULT_IMAGE_MIME_TYPE: &str = "image/png";

/// Converts message content into Gemini parts.
///
/// Media parts must already be resolved (see [`crate::media::MediaManager`]).
///
/// # Errors
/// Returns `MissingImageUrl` for an empty image URL and `InvalidMediaContent` for a
/// malformed `data:` URI or an unresolved media part.
pub fn to_provider_parts(content: &MessageContent) -> Result<Vec<GeminiPart>> {
    match content {
        MessageContent::Text(text) => Ok(vec![GeminiPart::text(text.clone())]),
        MessageContent::Parts(parts) => parts.iter().map(to_provider_part).collect(),
    }
}

/// Converts a single content part.
///
/// # Errors
/// See [`to_provider_parts`].
pub fn to_provider_part(part: &ContentPart) -> Result<GeminiPart> {
    match part {
        ContentPart::Text { text } => Ok(GeminiPart::text(text.clone())),
        ContentPart::ImageUrl { image_url } => image_url_to_part(image_url),
        ContentPart::Media { file_uri, mime_type, data } => {
            media_to_part(file_uri.as_deref(), mime_type.as_deref(), data.as_deref())
        }
    }
}

fn image_url_to_part(url: &str) -> Result<GeminiPart> {
    if url.is_empty() {
        return Err(GoogleError::MissingImageUrl);
    }

    match url.strip_prefix("data:") {
        Some(rest) => {
            let (mime_type, data) = parse_data_uri(rest)?;
            Ok(GeminiPart::InlineData { inline_data: GeminiInlineData { mime_type, data } })
        }
        None => Ok(GeminiPart::FileData {
            file_data: GeminiFileData {
                mime_type: DEFAULT_IMAGE_MIME_TYPE.to_string(),
                file_uri: url.to_string(),
            },
        }),
    }
}

/// Splits the body of a `data:` URI into its mime type and base64 payload.
///
/// A payload without a `;base64` marker is taken as raw text and encoded.
pub(crate) fn parse_data_uri(rest: &str) -> Result<(String, String)> {
    let (header, data) = rest.split_once(',').ok_or_else(|| {
        GoogleError::InvalidMediaContent("data URI has no ',' separator".to_string())
    })?;
    let mut params = header.split(';');
    let mime_type = params.next().unwrap_or_default();
    let is_base64 = params.any(|param| param.eq_ignore_ascii_case("base64"));
    let data = if is_base64 { data.to_string() } else { STANDARD.encode(data) };
    Ok((mime_type.to_string(), data))
}

fn media_to_part(
    file_uri: Option<&str>,
    mime_type: Option<&str>,
    data: Option<&[u8]>,
) -> Result<GeminiPart> {
    match (mime_type, data, file_uri) {
        (Some(mime_type), Some(data), _) => Ok(GeminiPart::InlineData {
            inline_data: GeminiInlineData {
                mime_type: mime_type.to_string(),
                data: STANDARD.encode(data),
            },
        }),
        (Some(mime_type), None, Some(uri)) => Ok(GeminiPart::FileData {
            file_data: GeminiFileData {
                mime_type: mime_type.to_string(),
                file_uri: uri.to_string(),
            },
        }),
        (None, _, _) => Err(GoogleError::InvalidMediaContent(format!(
            "media {} has no mime type",
            file_uri.unwrap_or("<inline>")
        ))),
        (Some(_), None, None) => {
            Err(GoogleError::InvalidMediaContent("media has neither data nor a URI".to_string()))
        }
    }
}

/// Converts Gemini parts back into generic content parts.
///
/// Inline data becomes a `data:` image URL and file data becomes an image URL of the
/// file URI. Function calls, function responses and unknown parts are skipped.
pub fn from_provider_parts(parts: &[GeminiPart]) -> Vec<ContentPart> {
    parts
        .iter()
        .filter_map(|part| match part {
            GeminiPart::Text { text } => Some(ContentPart::text(text.clone())),
            GeminiPart::InlineData { inline_data } => Some(ContentPart::image_url(format!(
                "data:{};base64,{}",
                inline_data.mime_type, inline_data.data
            ))),
            GeminiPart::FileData { file_data } => {
                Some(ContentPart::image_url(file_data.file_uri.clone()))
            }
            GeminiPart::FunctionCall { .. }
            | GeminiPart::FunctionResponse { .. }
            | GeminiPart::Unknown(_) => None,
        })
        .collect()
}
