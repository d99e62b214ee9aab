//! Core relay types
//!
//! Wire bodies accepted by the relay endpoint and the validated prompt that
//! every generation path is built from.

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Message returned for every prompt validation failure.
pub const PROMPT_REQUIRED: &str = "Prompt is required";

/// A prompt that passed validation: present, textual and non-empty.
///
/// Whitespace is content; a prompt of spaces is forwarded upstream as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt(String);

impl Prompt {
    /// Validate raw prompt text.
    pub fn new(text: impl Into<String>) -> Result<Self, RelayError> {
        let text = text.into();
        if text.is_empty() {
            return Err(RelayError::invalid_input(PROMPT_REQUIRED));
        }
        Ok(Self(text))
    }

    /// Validate a raw JSON request body of the form `{ "prompt": string }`.
    ///
    /// Invalid JSON, a missing field, a non-string value and empty text are all
    /// reported the same way, as the caller cannot act on the difference.
    pub fn from_json_body(body: &[u8]) -> Result<Self, RelayError> {
        let request: GenerateRequest = serde_json::from_slice(body)
            .map_err(|_| RelayError::invalid_input(PROMPT_REQUIRED))?;
        match request.prompt {
            Some(serde_json::Value::String(text)) => Self::new(text),
            _ => Err(RelayError::invalid_input(PROMPT_REQUIRED)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for Prompt {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Request body of the generate endpoints.
///
/// `prompt` is kept loosely typed so that validation, not deserialization,
/// decides how a bad value is reported.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: Option<serde_json::Value>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(serde_json::Value::String(prompt.into())),
        }
    }
}

/// Body of the non-streaming endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub text: String,
}

/// JSON error body returned for non-streaming failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Status the upstream provider answered with, for `upstream` errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_status: Option<u16>,
}

/// What a token source can do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderCapabilities {
    /// Incremental generation (`start`).
    pub streaming: bool,
    /// Single-shot generation (`generate`).
    pub completion: bool,
}

impl ProviderCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    pub fn with_completion(mut self) -> Self {
        self.completion = true;
        self
    }

    pub fn supports_streaming(&self) -> bool {
        self.streaming
    }

    pub fn supports_completion(&self) -> bool {
        self.completion
    }
}
