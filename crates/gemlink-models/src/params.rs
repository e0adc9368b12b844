//! Generation parameters and their pre-flight validation.

use crate::error::{GoogleError, Result};
use crate::gemini::types::GeminiGenerationConfig;
use serde::{Deserialize, Serialize};

/// Sampling parameters for a Google model. Unset fields use the provider's defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoogleModelParams {
    /// Sampling temperature in `[0.0, 1.0]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Nucleus sampling mass in `[0.0, 1.0]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Top-k sampling cutoff, `>= 0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<i32>,

    /// Maximum number of tokens to generate, `> 0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<i32>,

    /// Sequences that stop generation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,

    /// Response MIME type (e.g. `application/json`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
}

fn check_unit_interval(name: &'static str, value: Option<f32>) -> Result<()> {
    match value {
        Some(value) if !(0.0..=1.0).contains(&value) => Err(GoogleError::InvalidParameter {
            name,
            reason: format!("must be in the range of [0.0, 1.0], got {value}"),
        }),
        _ => Ok(()),
    }
}

impl GoogleModelParams {
    /// Checks every set parameter against its allowed range.
    ///
    /// # Errors
    /// Returns `InvalidParameter` naming the first offending parameter.
    pub fn validate(&self) -> Result<()> {
        if let Some(max_output_tokens) = self.max_output_tokens {
            if max_output_tokens <= 0 {
                return Err(GoogleError::InvalidParameter {
                    name: "maxOutputTokens",
                    reason: format!("must be a positive integer, got {max_output_tokens}"),
                });
            }
        }

        check_unit_interval("temperature", self.temperature)?;
        check_unit_interval("topP", self.top_p)?;

        if let Some(top_k) = self.top_k {
            if top_k < 0 {
                return Err(GoogleError::InvalidParameter {
                    name: "topK",
                    reason: format!("must be a non-negative integer, got {top_k}"),
                });
            }
        }

        Ok(())
    }

    /// Builds the wire `generationConfig`, or `None` when nothing is set.
    #[must_use]
    pub fn to_generation_config(&self) -> Option<GeminiGenerationConfig> {
        let config = GeminiGenerationConfig {
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            max_output_tokens: self.max_output_tokens,
            stop_sequences: (!self.stop_sequences.is_empty()).then(|| self.stop_sequences.clone()),
            response_mime_type: self.response_mime_type.clone(),
        };
        (!config.is_empty()).then_some(config)
    }
}
