//! Transport contract between the chat model and the provider endpoint.

use crate::error::{GoogleError, Result};
use crate::gemini::ModelFamily;
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::Client;
use reqwest::header::USER_AGENT;
use serde_json::Value;
use std::sync::Mutex;
use tracing::{debug, error};

/// Host of the Generative Language API (AI Studio).
pub const GAI_HOST: &str = "generativelanguage.googleapis.com";

/// Host of Vertex AI; regional endpoints prefix it with `{location}-`.
pub const GCP_HOST: &str = "aiplatform.googleapis.com";

/// API version of the Vertex AI endpoints.
pub const GCP_API_VERSION: &str = "v1";

/// Default API version of the Generative Language API.
pub const DEFAULT_API_VERSION: &str = "v1beta";

/// Header naming the client library and its version.
pub const CLIENT_INFO_HEADER: &str = "Client-Info";

/// `User-Agent` value sent with every request.
pub fn user_agent() -> String {
    format!("gemlink/{}", env!("CARGO_PKG_VERSION"))
}

fn client_info() -> String {
    format!("gemlink-models/{}", env!("CARGO_PKG_VERSION"))
}

/// Where [`HttpTransport`] sends its requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Google AI Studio. Serves Gemini models only.
    Gai {
        /// API version segment (e.g. `v1beta`).
        api_version: String,
    },
    /// Vertex AI, under a project and region.
    Gcp {
        /// Google Cloud project.
        project_id: String,
        /// Region (e.g. `us-central1`) or `global`.
        location: String,
    },
    /// A fixed API root followed by `/models/{model}:{method}`.
    Custom(String),
}

impl Default for Route {
    fn default() -> Self {
        Self::Gai { api_version: DEFAULT_API_VERSION.to_string() }
    }
}

impl Route {
    /// URL of the model collection serving `family`, without trailing slash.
    ///
    /// # Errors
    /// Returns `Transport` when the route cannot serve `family`.
    pub fn models_url(&self, family: ModelFamily) -> Result<String> {
        match self {
            Self::Gai { .. } if family == ModelFamily::Claude => Err(GoogleError::Transport(
                "Claude models are only served on Vertex AI".to_string(),
            )),
            Self::Gai { api_version } => Ok(format!("https://{GAI_HOST}/{api_version}/models")),
            Self::Gcp { project_id, location } => {
                let host = if location == "global" {
                    GCP_HOST.to_string()
                } else {
                    format!("{location}-{GCP_HOST}")
                };
                Ok(format!(
                    "https://{host}/{GCP_API_VERSION}/projects/{project_id}/locations/{location}/publishers/{}/models",
                    publisher(family)
                ))
            }
            Self::Custom(base) => Ok(format!("{}/models", base.trim_end_matches('/'))),
        }
    }
}

/// Vertex AI publisher of a model family.
const fn publisher(family: ModelFamily) -> &'static str {
    match family {
        ModelFamily::Gemini => "google",
        ModelFamily::Claude => "anthropic",
    }
}

/// A request ready to be sent: the target model and its JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    /// Model name, as used in the endpoint path.
    pub model: String,
    /// Which wire schema `body` follows.
    pub family: ModelFamily,
    /// Whether a streamed answer is requested.
    pub streaming: bool,
    /// Request body.
    pub body: Value,
}

/// An undecoded provider answer.
pub enum RawResponse {
    /// One JSON payload.
    Single(Value),
    /// A fully received streamed answer.
    Chunks(Vec<Value>),
    /// A live stream of payloads.
    Stream(BoxStream<'static, Result<Value>>),
}

impl std::fmt::Debug for RawResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(value) => f.debug_tuple("Single").field(value).finish(),
            Self::Chunks(values) => f.debug_tuple("Chunks").field(values).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Value> for RawResponse {
    /// A JSON array is a chunked answer; anything else is a single payload.
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => Self::Chunks(items),
            other => Self::Single(other),
        }
    }
}

/// Sends provider requests. Authentication and retries are up to the implementation.
#[async_trait]
pub trait GoogleTransport: Send + Sync {
    /// Sends `request` and returns the provider's answer.
    ///
    /// # Errors
    /// Returns `Transport` or `ProviderStatus` when the request cannot be completed.
    async fn send(&self, request: &ProviderRequest) -> Result<RawResponse>;
}

/// JSON-over-HTTP transport using `reqwest`. No retries.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    route: Route,
    api_key: Option<String>,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::with_route(Route::default())
    }
}

impl HttpTransport {
    /// Creates a transport for the given API root (e.g. `https://host/v1beta`).
    pub fn new<S: Into<String>>(base_url: S) -> Self {
        Self::with_route(Route::Custom(base_url.into()))
    }

    /// Creates a transport for a platform route.
    pub fn with_route(route: Route) -> Self {
        Self { client: Client::new(), route, api_key: None }
    }

    /// The route requests are sent to.
    pub const fn route(&self) -> &Route {
        &self.route
    }

    /// Sends `key` in the `x-goog-api-key` header.
    #[must_use]
    pub fn with_api_key<S: Into<String>>(mut self, key: S) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Full URL for `request`.
    ///
    /// # Errors
    /// Returns `Transport` when the route does not serve the request's model family.
    pub fn endpoint(&self, request: &ProviderRequest) -> Result<String> {
        let method = match (request.family, request.streaming) {
            (ModelFamily::Claude, _) => "rawPredict",
            (ModelFamily::Gemini, true) => "streamGenerateContent",
            (ModelFamily::Gemini, false) => "generateContent",
        };
        Ok(format!("{}/{}:{}", self.route.models_url(request.family)?, request.model, method))
    }
}

#[async_trait]
impl GoogleTransport for HttpTransport {
    async fn send(&self, request: &ProviderRequest) -> Result<RawResponse> {
        let url = self.endpoint(request)?;
        debug!(model = %request.model, url = %url, streaming = request.streaming, "Sending request");

        let mut builder = self
            .client
            .post(&url)
            .header(USER_AGENT, user_agent())
            .header(CLIENT_INFO_HEADER, client_info())
            .json(&request.body);
        if let Some(key) = &self.api_key {
            builder = builder.header("x-goog-api-key", key);
        }

        let response = builder.send().await.map_err(|e| {
            error!(error = %e, url = %url, "Failed to send request");
            GoogleError::from(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Provider returned an error status");
            return Err(GoogleError::ProviderStatus { status: status.as_u16(), body });
        }

        let value: Value = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to read response body");
            GoogleError::from(e)
        })?;
        Ok(value.into())
    }
}

/// A canned answer returned by [`MockTransport`].
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// JSON answer; an array becomes a chunked response.
    Json(Value),
    /// A live stream yielding these payloads.
    Stream(Vec<Value>),
    /// A non-success HTTP status.
    Status {
        /// Status code.
        status: u16,
        /// Body text.
        body: String,
    },
}

/// Records every request and answers with a canned response.
#[derive(Debug)]
pub struct MockTransport {
    response: MockResponse,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl MockTransport {
    /// Answers every request with `response`.
    pub fn new(response: MockResponse) -> Self {
        Self { response, requests: Mutex::default() }
    }

    /// Answers every request with a JSON payload.
    pub fn json(value: Value) -> Self {
        Self::new(MockResponse::Json(value))
    }

    /// Answers every request with a live stream of `chunks`.
    pub fn stream(chunks: Vec<Value>) -> Self {
        Self::new(MockResponse::Stream(chunks))
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().map(|requests| requests.clone()).unwrap_or_default()
    }

    /// The most recent request.
    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.requests.lock().ok().and_then(|requests| requests.last().cloned())
    }
}

#[async_trait]
impl GoogleTransport for MockTransport {
    async fn send(&self, request: &ProviderRequest) -> Result<RawResponse> {
        self.requests
            .lock()
            .map_err(|_| GoogleError::Transport("mock transport lock poisoned".to_string()))?
            .push(request.clone());

        match &self.response {
            MockResponse::Json(value) => Ok(value.clone().into()),
            MockResponse::Stream(chunks) => {
                Ok(RawResponse::Stream(futures::stream::iter(chunks.clone().into_iter().map(Ok)).boxed()))
            }
            MockResponse::Status { status, body } => {
                Err(GoogleError::ProviderStatus { status: *status, body: body.clone() })
            }
        }
    }
}
