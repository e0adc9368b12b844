//! Integration tests for `GoogleChatModel` driven through `MockTransport`.
//!
//! Tests cover:
//! - Request shape (contents, system instruction placement, media, tools)
//! - Response projection (text, tool calls, usage)
//! - Safety handling (default violation, replacement message)
//! - Claude models through the messages schema
//! - Streaming

use futures::StreamExt;
use gemlink_abstraction::{
    AiMessage, ChatModel, ContentPart, Message, MessageContent, StreamingChatModel, ToolCall,
    ToolDefinition,
};
use gemlink_models::{
    Blob, BlobStore, CollectingDiagnostics, Diagnostic, GoogleChatConfig, GoogleChatModel,
    GoogleError, InMemoryBlobStore, MediaManager, MessageSafetyHandler, MockTransport,
    ModelFamily, SafetyReply,
};
use serde_json::{Value, json};
use std::sync::Arc;

fn text_answer(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP",
            "index": 0,
            "safetyRatings": [
                {"category": "HARM_CATEGORY_HARASSMENT", "probability": "NEGLIGIBLE"}
            ]
        }],
        "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 1, "totalTokenCount": 13},
        "modelVersion": "gemini-1.5-flash-001"
    })
}

fn blocked_answer() -> Value {
    json!({
        "candidates": [{
            "finishReason": "SAFETY",
            "index": 0,
            "safetyRatings": [
                {"category": "HARM_CATEGORY_DANGEROUS_CONTENT", "probability": "HIGH", "blocked": true}
            ]
        }],
        "usageMetadata": {"promptTokenCount": 10, "totalTokenCount": 10}
    })
}

fn test_tool() -> ToolDefinition {
    ToolDefinition::new(
        "test",
        "Run a test with a specific name and get if it passed or failed",
        json!({
            "type": "object",
            "properties": {
                "testName": {"type": "string", "description": "The name of the test that should be run."}
            },
            "required": ["testName"]
        }),
    )
}

fn create_model(name: &str, answer: Value) -> (GoogleChatModel, Arc<MockTransport>) {
    let transport = Arc::new(MockTransport::json(answer));
    let model = GoogleChatModel::new(GoogleChatConfig::for_model(name), transport.clone())
        .expect("default parameters are valid");
    (model, transport)
}

fn sent_body(transport: &MockTransport) -> Value {
    transport.last_request().expect("a request was sent").body
}

fn coin_conversation() -> Vec<Message> {
    vec![
        Message::system("I will ask you to flip a coin and tell me H for heads and T for tails"),
        Message::human("Flip it"),
        Message::ai("H"),
        Message::human("Flip it again"),
    ]
}

#[tokio::test]
async fn test_basic_request_format() {
    let (model, transport) = create_model("gemini-pro", text_answer("T"));
    let messages = vec![
        Message::human("Flip a coin and tell me H for heads and T for tails"),
        Message::ai("H"),
        Message::human("Flip it again"),
    ];
    model.invoke(&messages).await.unwrap();

    let body = sent_body(&transport);
    let contents = body["contents"].as_array().unwrap();
    assert_eq!(contents.len(), 3);
    assert_eq!(contents[0]["role"], "user");
    assert!(contents[0]["parts"][0]["text"].is_string());
    assert_eq!(contents[1]["role"], "model");
    assert!(body.get("systemInstruction").is_none());
}

#[tokio::test]
async fn test_response_format() {
    let (model, _) = create_model("gemini-pro", text_answer("T"));
    let message = model.invoke(&[Message::human("Flip it")]).await.unwrap();
    assert_eq!(message.content, MessageContent::Text("T".to_string()));
    assert!(message.tool_calls.is_empty());
}

#[tokio::test]
async fn test_generate_reports_usage_and_info() {
    let (model, _) = create_model("gemini-1.5-flash", text_answer("T"));
    let result = model.generate(&[Message::human("Flip it")]).await.unwrap();

    assert_eq!(result.generations.len(), 1);
    let usage = result.usage.unwrap();
    assert_eq!(usage.prompt_tokens, 12);
    assert_eq!(usage.total_tokens, 13);
    let info = result.generations[0].generation_info.as_ref().unwrap();
    assert_eq!(info["finish_reason"], "STOP");
    assert_eq!(info["model_version"], "gemini-1.5-flash-001");
}

#[tokio::test]
async fn test_system_folded_for_old_model() {
    let (model, transport) = create_model("gemini-1.0-pro-001", text_answer("T"));
    model.invoke(&coin_conversation()).await.unwrap();

    let body = sent_body(&transport);
    let contents = body["contents"].as_array().unwrap();
    assert_eq!(contents.len(), 5);
    assert_eq!(
        contents[0]["parts"][0]["text"],
        "I will ask you to flip a coin and tell me H for heads and T for tails"
    );
    assert_eq!(contents[1]["role"], "model");
    assert_eq!(contents[1]["parts"][0]["text"], "Ok");
    assert!(body.get("systemInstruction").is_none());
}

#[tokio::test]
async fn test_system_folded_when_forced() {
    let transport = Arc::new(MockTransport::json(text_answer("T")));
    let config = GoogleChatConfig {
        convert_system_message_to_human: Some(true),
        ..GoogleChatConfig::for_model("gemini-1.5-pro")
    };
    let model = GoogleChatModel::new(config, transport.clone()).unwrap();
    model.invoke(&coin_conversation()).await.unwrap();

    assert_eq!(sent_body(&transport)["contents"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_system_instruction_when_not_folded() {
    let transport = Arc::new(MockTransport::json(text_answer("T")));
    let config = GoogleChatConfig {
        convert_system_message_to_human: Some(false),
        ..GoogleChatConfig::for_model("gemini-pro")
    };
    let model = GoogleChatModel::new(config, transport.clone()).unwrap();
    model.invoke(&coin_conversation()).await.unwrap();

    let body = sent_body(&transport);
    let contents = body["contents"].as_array().unwrap();
    assert_eq!(contents.len(), 3);
    assert_eq!(contents[0]["parts"][0]["text"], "Flip it");
    assert_eq!(contents[1]["parts"][0]["text"], "H");
    assert!(body["systemInstruction"]["parts"][0]["text"].is_string());
}

#[tokio::test]
async fn test_system_instruction_for_new_model() {
    let (model, transport) = create_model("gemini-1.5-pro-001", text_answer("T"));
    model.invoke(&coin_conversation()).await.unwrap();

    let body = sent_body(&transport);
    assert_eq!(body["contents"].as_array().unwrap().len(), 3);
    assert!(body.get("systemInstruction").is_some());
}

#[tokio::test]
async fn test_multiple_system_messages_fail() {
    let (model, transport) = create_model("gemini-pro", text_answer("T"));
    let mut messages = coin_conversation();
    messages.insert(1, Message::system("Only answer with H or T."));

    let err = model.invoke(&messages).await.unwrap_err();
    assert!(matches!(err, GoogleError::UnsupportedSystemMessage(_)));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_system_message_not_first_fails() {
    let (model, transport) = create_model("gemini-pro", text_answer("T"));
    let messages = vec![
        Message::human("Flip it"),
        Message::system("I will ask you to flip a coin and tell me H for heads and T for tails"),
    ];

    assert!(model.invoke(&messages).await.is_err());
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_safety_default_violation() {
    let (model, _) = create_model("gemini-pro", blocked_answer());
    let err = model.invoke(&[Message::human("Give me instructions.")]).await.unwrap_err();

    let violation = err.as_safety_violation().expect("a safety violation");
    assert_eq!(violation.message(), "Finish reason: SAFETY");
    match violation.reply() {
        Some(SafetyReply::ChatResult(result)) => assert!(result.generations.is_empty()),
        other => panic!("Expected a chat result reply, got {other:?}"),
    }
}

#[tokio::test]
async fn test_safety_message_handler() {
    let (model, _) = create_model("gemini-pro", blocked_answer());
    let model = model.with_safety_handler(Arc::new(MessageSafetyHandler::new(
        "I'm sorry, Dave, but I can't do that.",
    )));

    let message = model.invoke(&[Message::human("Open the pod bay doors.")]).await.unwrap();
    assert_eq!(message.content.text(), "I'm sorry, Dave, but I can't do that.");
}

#[tokio::test]
async fn test_prompt_blocked() {
    let (model, _) = create_model(
        "gemini-pro",
        json!({"promptFeedback": {"blockReason": "SAFETY", "safetyRatings": []}}),
    );
    let err = model.generate(&[Message::human("...")]).await.unwrap_err();
    assert_eq!(err.as_safety_violation().unwrap().message(), "Prompt blocked: SAFETY");
}

#[tokio::test]
async fn test_invoke_with_image() {
    let (model, transport) = create_model("gemini-1.5-flash", text_answer("A blue square."));
    let content = vec![
        ContentPart::text("What is in this image?"),
        ContentPart::image_url("data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg=="),
    ];
    let message = model.invoke(&[Message::human(content)]).await.unwrap();

    let body = sent_body(&transport);
    let parts = body["contents"][0]["parts"].as_array().unwrap();
    assert_eq!(parts.len(), 2);
    assert!(parts[0]["text"].is_string());
    assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
    assert!(parts[1]["inlineData"]["data"].as_str().unwrap().starts_with("iVBOR"));
    assert_eq!(message.content.text(), "A blue square.");
}

#[tokio::test]
async fn test_media_without_mime_type_is_invalid() {
    let (model, transport) = create_model("gemini-1.5-flash", text_answer("A blue square."));
    let content = vec![
        ContentPart::text("What is in this image?"),
        ContentPart::media("mock://example.com/blue-box.png", None),
    ];

    let err = model.invoke(&[Message::human(content)]).await.unwrap_err();
    assert!(err.to_string().starts_with("Invalid media content"));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_media_without_manager() {
    let (model, transport) = create_model("gemini-1.5-flash", text_answer("A blue square."));
    let content = vec![
        ContentPart::text("What is in this image?"),
        ContentPart::media("mock://example.com/blue-box.png", Some("image/png".to_string())),
    ];
    let message = model.invoke(&[Message::human(content)]).await.unwrap();

    let body = sent_body(&transport);
    let file_data = &body["contents"][0]["parts"][1]["fileData"];
    assert_eq!(file_data["mimeType"], "image/png");
    assert_eq!(file_data["fileUri"], "mock://example.com/blue-box.png");
    assert_eq!(message.content.text(), "A blue square.");
}

#[tokio::test]
async fn test_media_with_manager() {
    let resolver = Arc::new(InMemoryBlobStore::new());
    resolver
        .store(Blob::new("resolve://host/foo/blue-box.png", "image/png", b"<blue box>".to_vec()))
        .await
        .unwrap();
    resolver
        .store(Blob::new("resolve://host/foo/blue-box.txt", "text/plain", b"A blue box".to_vec()))
        .await
        .unwrap();
    let canonical = Arc::new(InMemoryBlobStore::with_path_prefix("canonical://store/"));
    let manager = MediaManager::new(canonical.clone()).with_resolver(resolver);

    let (model, transport) = create_model("gemini-1.5-flash", text_answer("A blue square."));
    let model = model.with_media_manager(Arc::new(manager));
    let content = vec![
        ContentPart::text("What is in this image?"),
        ContentPart::media("resolve://host/foo/blue-box.png", None),
    ];
    let message = model.invoke(&[Message::human(content)]).await.unwrap();

    let body = sent_body(&transport);
    let parts = body["contents"][0]["parts"].as_array().unwrap();
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[1]["fileData"]["mimeType"], "image/png");
    assert_eq!(parts[1]["fileData"]["fileUri"], "canonical://store/host/foo/blue-box.png");
    assert_eq!(canonical.len(), 1);
    assert_eq!(message.content.text(), "A blue square.");
}

#[tokio::test]
async fn test_unknown_media_with_manager_fails() {
    let manager = MediaManager::new(Arc::new(InMemoryBlobStore::new()))
        .with_resolver(Arc::new(InMemoryBlobStore::new()));
    let (model, transport) = create_model("gemini-1.5-flash", text_answer("A blue square."));
    let model = model.with_media_manager(Arc::new(manager));

    let content = vec![ContentPart::media("resolve://host/missing.png", None)];
    let err = model.invoke(&[Message::human(content)]).await.unwrap_err();
    assert!(matches!(err, GoogleError::MediaResolutionFailed { .. }));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_bind_tools_request() {
    let (model, transport) = create_model("gemini-pro", text_answer("OK"));
    let model = model.bind_tools(vec![test_tool()]);
    model.invoke(&[Message::human("Run a test on the cobalt project.")]).await.unwrap();

    let body = sent_body(&transport);
    let tools = body["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 1);
    let declarations = tools[0]["functionDeclarations"].as_array().unwrap();
    assert_eq!(declarations.len(), 1);
    assert_eq!(declarations[0]["name"], "test");
    assert_eq!(
        declarations[0]["description"],
        "Run a test with a specific name and get if it passed or failed"
    );
    let parameters = &declarations[0]["parameters"];
    assert_eq!(parameters["type"], "object");
    assert_eq!(parameters["properties"]["testName"]["type"], "string");
    assert_eq!(parameters["required"], json!(["testName"]));
    assert!(body.get("toolConfig").is_none());
}

#[tokio::test]
async fn test_tool_call_result() {
    let (model, _) = create_model(
        "gemini-pro",
        json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{"functionCall": {"name": "test", "args": {"testName": "cobalt"}}}]
                },
                "finishReason": "STOP"
            }]
        }),
    );
    let model = model.bind_tools(vec![test_tool()]);
    let message = model.invoke(&[Message::human("What?")]).await.unwrap();

    assert_eq!(message.content, MessageContent::Text(String::new()));
    assert_eq!(message.tool_calls.len(), 1);
    assert_eq!(message.tool_calls[0].name, "test");
    assert_eq!(message.tool_calls[0].args, json!({"testName": "cobalt"}));
    assert!(!message.tool_calls[0].id.is_empty());
}

#[tokio::test]
async fn test_structured_output() {
    let (model, transport) = create_model(
        "gemini-1.5-flash",
        json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{"functionCall": {"name": "test", "args": {"testName": "cobalt"}}}]
                }
            }]
        }),
    );
    let model = model.with_structured_output(test_tool());
    let args = model.invoke_structured(&[Message::human("Which test?")]).await.unwrap();

    assert_eq!(args, Some(json!({"testName": "cobalt"})));
    let body = sent_body(&transport);
    assert_eq!(body["toolConfig"]["functionCallingConfig"]["mode"], "ANY");
    assert_eq!(body["tools"][0]["functionDeclarations"][0]["name"], "test");
}

#[tokio::test]
async fn test_function_reply_request() {
    let (model, transport) = create_model("gemini-pro", text_answer("The cobalt test passed."));
    let model = model.bind_tools(vec![test_tool()]);
    let call = ToolCall {
        id: "test".to_string(),
        name: "test".to_string(),
        args: json!({"testName": "cobalt"}),
    };
    let messages = vec![
        Message::human("Run a test on the cobalt project."),
        Message::Ai(AiMessage::new("").with_tool_call(call)),
        Message::tool("test", r#"{"testPassed":true}"#),
    ];
    let message = model.invoke(&messages).await.unwrap();

    let body = sent_body(&transport);
    let contents = body["contents"].as_array().unwrap();
    assert_eq!(contents.len(), 3);
    assert_eq!(
        contents[1]["parts"],
        json!([{"functionCall": {"name": "test", "args": {"testName": "cobalt"}}}])
    );
    assert_eq!(contents[2]["role"], "user");
    assert_eq!(
        contents[2]["parts"][0]["functionResponse"],
        json!({"name": "test", "response": {"testPassed": true}})
    );
    assert_eq!(message.content.text(), "The cobalt test passed.");
}

#[tokio::test]
async fn test_unsupported_message_is_reported() {
    let sink = Arc::new(CollectingDiagnostics::new());
    let (model, transport) = create_model("gemini-pro", text_answer("T"));
    let model = model.with_diagnostics(sink.clone());
    let messages = vec![
        Message::human("Flip it"),
        Message::Generic { role: "function".to_string(), content: "ignored".into() },
    ];
    model.invoke(&messages).await.unwrap();

    assert_eq!(sent_body(&transport)["contents"].as_array().unwrap().len(), 1);
    assert_eq!(sink.events(), vec![Diagnostic::UnsupportedMessage { role: "function".to_string() }]);
}

#[tokio::test]
async fn test_safety_settings_are_sent() {
    let transport = Arc::new(MockTransport::json(text_answer("T")));
    let config = GoogleChatConfig::from_toml_str(
        r#"
        model = "gemini-1.5-flash"

        [[safety_settings]]
        category = "HARM_CATEGORY_HARASSMENT"
        threshold = "BLOCK_LOW_AND_ABOVE"
        "#,
    )
    .unwrap();
    let model = GoogleChatModel::new(config, transport.clone()).unwrap();
    model.invoke(&[Message::human("Hi")]).await.unwrap();

    assert_eq!(
        sent_body(&transport)["safetySettings"],
        json!([{"category": "HARM_CATEGORY_HARASSMENT", "threshold": "BLOCK_LOW_AND_ABOVE"}])
    );
}

#[tokio::test]
async fn test_claude_request_format() {
    let (model, transport) = create_model(
        "claude-3-5-sonnet@20240620",
        json!({
            "id": "msg_vrtx_01",
            "type": "message",
            "role": "assistant",
            "model": "claude-3-5-sonnet-20240620",
            "content": [{"type": "text", "text": "1 + 1 = 2\n\nThis is one of the most basic arithmetic equations."}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 14, "output_tokens": 29}
        }),
    );
    let message = model.invoke(&[Message::human("What is 1+1?")]).await.unwrap();

    let request = transport.last_request().unwrap();
    assert_eq!(request.family, ModelFamily::Claude);
    let messages = request.body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["content"][0]["text"], "What is 1+1?");
    assert!(request.body.get("system").is_none());
    assert_eq!(
        message.content.text(),
        "1 + 1 = 2\n\nThis is one of the most basic arithmetic equations."
    );
}

#[tokio::test]
async fn test_claude_structured_output() {
    let (model, transport) = create_model(
        "claude-3-5-sonnet@20240620",
        json!({
            "content": [{"type": "tool_use", "id": "toolu_01", "name": "test", "input": {"testName": "cobalt"}}],
            "stop_reason": "tool_use"
        }),
    );
    let model = model.with_structured_output(test_tool());
    let args = model.invoke_structured(&[Message::human("Which test?")]).await.unwrap();

    assert_eq!(args, Some(json!({"testName": "cobalt"})));
    let body = sent_body(&transport);
    assert_eq!(body["tool_choice"], json!({"type": "tool", "name": "test"}));
    assert_eq!(body["tools"][0]["input_schema"]["required"], json!(["testName"]));
}

#[tokio::test]
async fn test_stream_chunks() {
    let transport = Arc::new(MockTransport::stream(vec![text_answer("Hello"), text_answer(", world")]));
    let model =
        GoogleChatModel::new(GoogleChatConfig::for_model("gemini-1.5-flash"), transport.clone())
            .unwrap();

    let chunks: Vec<_> = model.stream(&[Message::human("Say hello")]).await.unwrap().collect().await;
    let texts: Vec<String> = chunks.into_iter().map(|chunk| chunk.unwrap().text).collect();
    assert_eq!(texts, vec!["Hello", ", world"]);
    assert!(transport.last_request().unwrap().streaming);
}

#[tokio::test]
async fn test_stream_flags_unsafe_chunk() {
    let transport = Arc::new(MockTransport::stream(vec![text_answer("Here is"), blocked_answer()]));
    let model = GoogleChatModel::new(GoogleChatConfig::for_model("gemini-1.5-flash"), transport)
        .unwrap();

    let chunks: Vec<_> = model.stream(&[Message::human("...")]).await.unwrap().collect().await;
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].as_ref().unwrap().text, "Here is");
    let err = chunks[1].as_ref().unwrap_err();
    assert!(err.as_safety_violation().is_some());
}

#[tokio::test]
async fn test_generate_collects_streamed_answer() {
    let transport = Arc::new(MockTransport::stream(vec![text_answer("Hello"), text_answer(", world")]));
    let config = GoogleChatConfig { streaming: true, ..GoogleChatConfig::for_model("gemini-1.5-flash") };
    let model = GoogleChatModel::new(config, transport).unwrap();

    let message = model.invoke(&[Message::human("Say hello")]).await.unwrap();
    assert_eq!(message.content.text(), "Hello, world");
}

#[tokio::test]
async fn test_chunked_answer_is_merged() {
    let (model, _) = create_model("gemini-pro", json!([text_answer("Hel"), text_answer("lo")]));
    let message = model.invoke(&[Message::human("Say hello")]).await.unwrap();
    assert_eq!(message.content.text(), "Hello");
}
