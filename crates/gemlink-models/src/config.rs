//! TOML configuration for Google chat models.

use crate::gemini::ModelFamily;
use crate::gemini::types::GeminiSafetySetting;
use crate::params::GoogleModelParams;
use crate::transport::{DEFAULT_API_VERSION, Route};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading the file.
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Configuration validation error.
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Google API serving the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Google AI Studio (Generative Language API).
    Gai,
    /// Vertex AI on Google Cloud.
    #[default]
    Gcp,
}

/// Settings of a [`crate::GoogleChatModel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleChatConfig {
    /// Model name (e.g. `gemini-1.5-flash`, `claude-3-5-sonnet@20240620`).
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling parameters.
    #[serde(flatten)]
    pub params: GoogleModelParams,

    /// Force (`true`) or forbid (`false`) folding system messages into the contents.
    /// Unset picks what the model supports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convert_system_message_to_human: Option<bool>,

    /// Request streamed answers by default.
    #[serde(default)]
    pub streaming: bool,

    /// Safety thresholds sent with every Gemini request.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub safety_settings: Vec<GeminiSafetySetting>,

    /// API serving the model (default: `gcp`).
    #[serde(default)]
    pub platform: Platform,

    /// Google Cloud project; required on `gcp`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    /// Vertex AI region (default: `us-central1`).
    #[serde(default = "default_location")]
    pub location: String,

    /// API version segment of AI Studio endpoints (default: `v1beta`).
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

fn default_model() -> String {
    "gemini-pro".to_string()
}

fn default_location() -> String {
    "us-central1".to_string()
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

impl Default for GoogleChatConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            params: GoogleModelParams::default(),
            convert_system_message_to_human: None,
            streaming: false,
            safety_settings: Vec::new(),
            platform: Platform::default(),
            project_id: None,
            location: default_location(),
            api_version: default_api_version(),
        }
    }
}

impl GoogleChatConfig {
    /// Creates a default configuration for `model`.
    pub fn for_model<S: Into<String>>(model: S) -> Self {
        Self { model: model.into(), ..Self::default() }
    }

    /// Parses a configuration whose fields are at the top level of `content`.
    ///
    /// # Errors
    /// Returns `TomlParse` for malformed TOML and `Validation` for out-of-range values.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::Validation("model must not be empty".to_string()));
        }
        if self.platform == Platform::Gai && ModelFamily::from_model(&self.model) == ModelFamily::Claude {
            return Err(ConfigError::Validation(format!(
                "model `{}` is only served on platform `gcp`",
                self.model
            )));
        }
        self.params.validate().map_err(|e| ConfigError::Validation(e.to_string()))
    }

    /// Route for [`crate::HttpTransport`].
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` if the configuration is invalid or `gcp` has no project.
    pub fn route(&self) -> Result<Route, ConfigError> {
        self.validate()?;
        match self.platform {
            Platform::Gai => Ok(Route::Gai { api_version: self.api_version.clone() }),
            Platform::Gcp => {
                let project_id = self
                    .project_id
                    .as_deref()
                    .filter(|project| !project.trim().is_empty())
                    .ok_or_else(|| ConfigError::Validation("platform `gcp` requires project_id".to_string()))?;
                Ok(Route::Gcp { project_id: project_id.to_string(), location: self.location.clone() })
            }
        }
    }
}

/// Loads the `[google]` table of a TOML file.
///
/// A missing file or a file without a `[google]` table yields the defaults.
///
/// # Arguments
/// * `path` - Path to the configuration file
///
/// # Errors
/// Returns error if the file cannot be read or parsed, or holds invalid values.
pub fn load_chat_config(path: &Path) -> Result<GoogleChatConfig, ConfigError> {
    if !path.exists() {
        debug!(path = %path.display(), "No configuration file, using defaults");
        return Ok(GoogleChatConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let mut table: toml::Table = toml::from_str(&content)?;
    let config: GoogleChatConfig = match table.remove("google") {
        Some(section) => section.try_into()?,
        None => GoogleChatConfig::default(),
    };

    config.validate()?;
    debug!(path = %path.display(), model = %config.model, "Loaded chat configuration");
    Ok(config)
}
