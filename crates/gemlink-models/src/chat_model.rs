//! Google chat model implementation.
//!
//! [`GoogleChatModel`] implements the generic `ChatModel` and `StreamingChatModel`
//! traits for models served by Google: Gemini models through the `generateContent`
//! schema and Claude models through the Anthropic messages schema.

use crate::anthropic::{self, AnthropicRequest, AnthropicResponse, AnthropicTool, AnthropicToolChoice};
use crate::config::{GoogleChatConfig, Platform};
use crate::diagnostics::{DiagnosticSink, TracingDiagnostics};
use crate::error::{GoogleError, Result};
use crate::gemini::types::{GeminiRequest, GeminiToolConfig};
use crate::gemini::{
    ConversationAssembler, DefaultSafetyHandler, GoogleLlmResponse, ModelFamily, SafetyHandler,
    SystemInstructionMode, response_to_chat_generation, response_to_chat_result, safe_apply,
};
use crate::media::MediaManager;
use crate::params::GoogleModelParams;
use crate::tools::to_gemini_tools;
use crate::transport::{GoogleTransport, HttpTransport, ProviderRequest, RawResponse};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};
use gemlink_abstraction::{
    ChatModel, ChatResult, ChatStream, Message, StreamingChatModel, ToolDefinition,
};
use serde_json::Value;
use std::env;
use std::sync::Arc;
use tracing::{debug, warn};

/// Environment variable holding the API key used by [`GoogleChatModel::from_env`].
pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";

/// Environment variable naming the Google Cloud project when the configuration has none.
pub const PROJECT_ENV: &str = "GOOGLE_CLOUD_PROJECT";

/// Chat model for Google-hosted models.
#[derive(Clone)]
pub struct GoogleChatModel {
    config: GoogleChatConfig,
    family: ModelFamily,
    transport: Arc<dyn GoogleTransport>,
    media: Option<Arc<MediaManager>>,
    safety: Arc<dyn SafetyHandler>,
    diagnostics: Arc<dyn DiagnosticSink>,
    tools: Vec<ToolDefinition>,
    /// Name of the tool every answer must call.
    forced_tool: Option<String>,
}

impl std::fmt::Debug for GoogleChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleChatModel")
            .field("config", &self.config)
            .field("family", &self.family)
            .field("media", &self.media)
            .field("tools", &self.tools)
            .field("forced_tool", &self.forced_tool)
            .finish_non_exhaustive()
    }
}

impl GoogleChatModel {
    /// Creates a model sending its requests through `transport`.
    ///
    /// Responses go through [`DefaultSafetyHandler`] and diagnostics go to `tracing`
    /// until replaced.
    ///
    /// # Arguments
    /// * `config` - Model name and settings
    /// * `transport` - Where requests are sent
    ///
    /// # Errors
    /// Returns `InvalidParameter` if the sampling parameters are out of range.
    pub fn new(config: GoogleChatConfig, transport: Arc<dyn GoogleTransport>) -> Result<Self> {
        config.params.validate()?;
        let family = ModelFamily::from_model(&config.model);
        debug!(model_id = %config.model, family = ?family, "Creating GoogleChatModel");

        Ok(Self {
            config,
            family,
            transport,
            media: None,
            safety: Arc::new(DefaultSafetyHandler),
            diagnostics: Arc::new(TracingDiagnostics),
            tools: Vec::new(),
            forced_tool: None,
        })
    }

    /// Creates a model using [`HttpTransport`] routed by the configured platform, with
    /// the API key from `GOOGLE_API_KEY`, if set.
    ///
    /// On `gcp` a missing `project_id` is read from `GOOGLE_CLOUD_PROJECT`.
    ///
    /// # Errors
    /// Returns `Config` if the platform settings are incomplete and `InvalidParameter`
    /// if the sampling parameters are out of range.
    #[allow(clippy::disallowed_methods)] // env::var is needed for API key loading
    pub fn from_env(mut config: GoogleChatConfig) -> Result<Self> {
        if config.platform == Platform::Gcp && config.project_id.is_none() {
            config.project_id = env::var(PROJECT_ENV).ok();
        }
        let route = config.route()?;
        debug!(model_id = %config.model, route = ?route, "Resolved endpoint route");
        let mut transport = HttpTransport::with_route(route);
        match env::var(API_KEY_ENV) {
            Ok(key) => transport = transport.with_api_key(key),
            Err(_) => warn!(variable = API_KEY_ENV, "API key not set; sending unauthenticated requests"),
        }
        Self::new(config, Arc::new(transport))
    }

    /// Resolves `media` content parts through `manager` before encoding.
    #[must_use]
    pub fn with_media_manager(mut self, manager: Arc<MediaManager>) -> Self {
        self.media = Some(manager);
        self
    }

    /// Replaces the safety policy.
    #[must_use]
    pub fn with_safety_handler(mut self, handler: Arc<dyn SafetyHandler>) -> Self {
        self.safety = handler;
        self
    }

    /// Replaces the diagnostic sink.
    #[must_use]
    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = sink;
        self
    }

    /// Replaces the sampling parameters.
    ///
    /// # Errors
    /// Returns `InvalidParameter` if a value is out of range.
    pub fn with_params(mut self, params: GoogleModelParams) -> Result<Self> {
        params.validate()?;
        self.config.params = params;
        Ok(self)
    }

    /// Offers `tools` to the model.
    #[must_use]
    pub fn bind_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self.forced_tool = None;
        self
    }

    /// Forces every answer to be a call of `schema`.
    ///
    /// Use [`Self::invoke_structured`] to get the call arguments.
    #[must_use]
    pub fn with_structured_output(mut self, schema: ToolDefinition) -> Self {
        self.forced_tool = Some(schema.name.clone());
        self.tools = vec![schema];
        self
    }

    /// Generates an answer and returns the arguments of its first tool call, or `None`
    /// if the model did not call a tool.
    ///
    /// # Errors
    /// Returns any error of [`ChatModel::invoke`].
    pub async fn invoke_structured(&self, messages: &[Message]) -> Result<Option<Value>> {
        let message = self.invoke(messages).await?;
        Ok(message.tool_calls.into_iter().next().map(|call| call.args))
    }

    /// The model settings.
    pub fn config(&self) -> &GoogleChatConfig {
        &self.config
    }

    /// The wire schema family of the model.
    pub fn family(&self) -> ModelFamily {
        self.family
    }

    /// Assembles `messages` into a request body for the model's schema.
    ///
    /// # Errors
    /// Returns any assembly, codec or media resolution error. Nothing is sent.
    pub async fn build_request(&self, messages: &[Message], streaming: bool) -> Result<ProviderRequest> {
        let body = match self.family {
            ModelFamily::Gemini => serde_json::to_value(self.build_gemini_request(messages).await?)?,
            ModelFamily::Claude => serde_json::to_value(self.build_anthropic_request(messages).await?)?,
        };
        Ok(ProviderRequest { model: self.config.model.clone(), family: self.family, streaming, body })
    }

    async fn build_gemini_request(&self, messages: &[Message]) -> Result<GeminiRequest> {
        let mode = SystemInstructionMode::resolve(
            self.config.convert_system_message_to_human,
            &self.config.model,
        );
        let assembled = ConversationAssembler::new(mode, self.diagnostics.as_ref())
            .with_media(self.media.as_deref())
            .assemble(messages)
            .await?;

        Ok(GeminiRequest {
            contents: assembled.contents,
            system_instruction: assembled.system_instruction,
            tools: to_gemini_tools(&self.tools),
            tool_config: self.forced_tool.as_deref().map(GeminiToolConfig::force),
            generation_config: self.config.params.to_generation_config(),
            safety_settings: self.config.safety_settings.clone(),
        })
    }

    async fn build_anthropic_request(&self, messages: &[Message]) -> Result<AnthropicRequest> {
        let conversation = anthropic::assemble_conversation(
            messages,
            self.media.as_deref(),
            self.diagnostics.as_ref(),
        )
        .await?;

        let mut request =
            AnthropicRequest::new(conversation.messages, conversation.system, &self.config.params);
        request.tools = self.tools.iter().map(AnthropicTool::from).collect();
        request.tool_choice =
            self.forced_tool.clone().map(|name| AnthropicToolChoice::Tool { name });
        Ok(request)
    }

    async fn send(&self, messages: &[Message], streaming: bool) -> Result<RawResponse> {
        let request = self.build_request(messages, streaming).await?;
        debug!(
            model_id = %self.config.model,
            message_count = messages.len(),
            tool_count = self.tools.len(),
            streaming,
            "GoogleChatModel sending request"
        );
        self.transport.send(&request).await
    }
}

/// Drains a live stream into a chunked response.
async fn collect(response: GoogleLlmResponse) -> Result<GoogleLlmResponse> {
    match response {
        GoogleLlmResponse::Stream(chunks) => Ok(GoogleLlmResponse::Chunks(chunks.try_collect::<Vec<_>>().await?)),
        other => Ok(other),
    }
}

fn anthropic_payload(raw: RawResponse) -> Result<AnthropicResponse> {
    match raw {
        RawResponse::Single(value) => Ok(serde_json::from_value(value)?),
        RawResponse::Chunks(_) | RawResponse::Stream(_) => Err(GoogleError::Transport(
            "expected a single JSON payload for a Claude model".to_string(),
        )),
    }
}

#[async_trait]
impl ChatModel for GoogleChatModel {
    type Error = GoogleError;

    async fn generate(&self, messages: &[Message]) -> Result<ChatResult> {
        let raw = self.send(messages, self.config.streaming).await?;

        match self.family {
            ModelFamily::Gemini => {
                let response = collect(GoogleLlmResponse::from_raw(raw)?).await?;
                let result = safe_apply(response, self.safety.as_ref(), response_to_chat_result)?;
                debug!(
                    model_id = %self.config.model,
                    generations = result.generations.len(),
                    usage = ?result.usage,
                    "GoogleChatModel received response"
                );
                Ok(result)
            }
            ModelFamily::Claude => Ok(anthropic::response_to_chat_result(&anthropic_payload(raw)?)),
        }
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl StreamingChatModel for GoogleChatModel {
    /// Streams the answer chunk by chunk.
    ///
    /// Gemini chunks each pass the safety handler; the first rejected chunk ends up as a
    /// `SafetyViolation` item. Claude answers arrive as one chunk.
    async fn stream(&self, messages: &[Message]) -> Result<ChatStream<GoogleError>> {
        if self.family == ModelFamily::Claude {
            let result = self.generate(messages).await?;
            return Ok(stream::iter(result.generations.into_iter().map(Ok)).boxed());
        }

        let raw = self.send(messages, true).await?;
        let safety = Arc::clone(&self.safety);
        let project = move |payload| {
            safe_apply(GoogleLlmResponse::Single(payload), safety.as_ref(), response_to_chat_generation)
        };

        Ok(match GoogleLlmResponse::from_raw(raw)? {
            GoogleLlmResponse::Single(payload) => stream::once(async move { project(payload) }).boxed(),
            GoogleLlmResponse::Chunks(chunks) => stream::iter(chunks.into_iter().map(project)).boxed(),
            GoogleLlmResponse::Stream(chunks) => chunks.map(move |item| item.and_then(&project)).boxed(),
        })
    }
}
