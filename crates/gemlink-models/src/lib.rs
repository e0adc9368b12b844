//! Google model integration for gemlink.
//!
//! This crate adapts Google-hosted chat models to the `gemlink-abstraction` traits.
//!
//! # Supported Schemas
//!
//! - **Gemini**: `generateContent` / `streamGenerateContent` (default for every model name
//!   not starting with `claude`)
//! - **Claude**: Anthropic messages schema through `rawPredict`
//!
//! # Pipeline
//!
//! Outbound, the conversation assembler turns messages into provider contents, resolving
//! `media` parts through an optional [`MediaManager`]. Inbound, responses are normalized,
//! checked by a [`SafetyHandler`] and projected into generic results.

pub mod anthropic;
pub mod chat_model;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod gemini;
pub mod media;
pub mod params;
pub mod tools;
pub mod transport;

pub use chat_model::{API_KEY_ENV, GoogleChatModel, PROJECT_ENV};
pub use config::{ConfigError, GoogleChatConfig, Platform, load_chat_config};
pub use diagnostics::{
    CollectingDiagnostics, Diagnostic, DiagnosticSink, TracingDiagnostics, init_tracing,
};
pub use error::{GoogleError, Result};
pub use gemini::{
    DefaultSafetyHandler, GoogleLlmResponse, MessageSafetyHandler, ModelFamily, SafetyHandler,
    SafetyReply, SafetyViolation, SystemInstructionMode, is_model_gemini, safe_apply,
};
pub use media::{Blob, BlobStore, InMemoryBlobStore, MediaManager, MissingMediaPolicy};
pub use params::GoogleModelParams;
pub use transport::{
    GoogleTransport, HttpTransport, MockResponse, MockTransport, ProviderRequest, RawResponse,
    Route,
};
