//! Gemini token source
//!
//! Streams `streamGenerateContent?alt=sse` through eventsource-stream and turns
//! each SSE payload into one fragment. The non-streaming path calls
//! `generateContent` and returns the joined text.

use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::Client as HttpClient;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{FragmentStreamHandle, TokenSource};
use crate::error::RelayError;
use crate::types::{Prompt, ProviderCapabilities};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Gemini-specific configuration parameters
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key for authentication; a missing key is reported per session.
    pub api_key: Option<SecretString>,
    /// Base URL for the Gemini API
    pub base_url: String,
    /// Model to use
    pub model: String,
    /// Connect timeout in seconds
    pub timeout: Option<u64>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Some(30),
        }
    }
}

impl GeminiConfig {
    /// Create a new Gemini configuration with the given API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(SecretString::from(api_key.into())),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub const fn with_timeout(mut self, timeout: u64) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Whether a non-empty API key is present.
    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_ref()
            .is_some_and(|k| !k.expose_secret().trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Clone, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Clone, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

impl<'a> GenerateContentRequest<'a> {
    fn user(prompt: &'a Prompt) -> Self {
        Self {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart {
                    text: prompt.as_str(),
                }],
            }],
        }
    }
}

/// One `generateContent` response, or one streamed chunk of it.
#[derive(Debug, Clone, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiApiError>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiPart {
    text: Option<String>,
    /// Thought summaries from thinking models are not part of the answer.
    thought: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiApiError {
    code: Option<u16>,
    message: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiErrorEnvelope {
    error: GeminiApiError,
}

impl GeminiResponse {
    /// Text of the first candidate, thought parts excluded.
    fn text(&self) -> Option<String> {
        let parts = self
            .candidates
            .as_ref()?
            .first()?
            .content
            .as_ref()?
            .parts
            .as_ref()?;
        let text: String = parts
            .iter()
            .filter(|p| p.thought != Some(true))
            .filter_map(|p| p.text.as_deref())
            .collect();
        (!text.is_empty()).then_some(text)
    }
}

impl GeminiApiError {
    fn into_relay_error(self, fallback_code: u16) -> RelayError {
        let code = self.code.unwrap_or(fallback_code);
        let message = self.message.unwrap_or_else(|| "Unknown error".to_string());
        RelayError::ApiError {
            code,
            message,
            details: self.status.map(serde_json::Value::String),
        }
    }
}

/// Parse one SSE `data:` payload into an optional fragment.
fn parse_stream_chunk(data: &str) -> Result<Option<String>, RelayError> {
    let chunk: GeminiResponse = serde_json::from_str(data)
        .map_err(|e| RelayError::ParseError(format!("Failed to parse Gemini SSE JSON: {e}")))?;
    if let Some(err) = chunk.error {
        return Err(err.into_relay_error(500));
    }
    Ok(chunk.text())
}

/// Map a non-success upstream response onto the relay error taxonomy.
async fn error_from_response(response: reqwest::Response) -> RelayError {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    let api_error = serde_json::from_str::<GeminiErrorEnvelope>(&body)
        .ok()
        .map(|env| env.error);
    let message = api_error
        .as_ref()
        .and_then(|e| e.message.clone())
        .unwrap_or_else(|| body.clone());

    match status {
        401 | 403 => RelayError::AuthenticationError(
            "API key is invalid or doesn't have proper permissions. Please check your Gemini API key."
                .to_string(),
        ),
        400 if message.to_ascii_lowercase().contains("api key") => {
            RelayError::AuthenticationError(format!(
                "Please set a valid Gemini API key ({message})"
            ))
        }
        _ => match api_error {
            Some(err) => err.into_relay_error(status),
            None => RelayError::api_error(status, format!("Gemini API error {status}: {body}")),
        },
    }
}

/// Gemini client implementing [`TokenSource`].
#[derive(Debug, Clone)]
pub struct GeminiClient {
    config: GeminiConfig,
    http_client: HttpClient,
}

impl GeminiClient {
    /// Create a new Gemini client with the given configuration
    pub fn new(config: GeminiConfig) -> Result<Self, RelayError> {
        let mut builder = HttpClient::builder();
        if let Some(secs) = config.timeout {
            // Connect only: session lifetime is bounded by the encoder.
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        let http_client = builder.build().map_err(|e| {
            RelayError::ConfigurationError(format!("Failed to create HTTP client: {e}"))
        })?;
        Ok(Self::with_http_client(config, http_client))
    }

    /// Create a new Gemini client with a custom HTTP client
    pub fn with_http_client(config: GeminiConfig, http_client: HttpClient) -> Self {
        Self {
            config,
            http_client,
        }
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn api_key(&self) -> Result<&str, RelayError> {
        match &self.config.api_key {
            Some(key) if !key.expose_secret().trim().is_empty() => Ok(key.expose_secret()),
            _ => Err(RelayError::configuration(
                "API key is not configured. Please set GEMINI_API_KEY in your environment variables.",
            )),
        }
    }

    fn endpoint(&self, method: &str) -> String {
        let model = self
            .config
            .model
            .strip_prefix("models/")
            .unwrap_or(&self.config.model);
        format!(
            "{}/models/{}:{method}",
            self.config.base_url.trim_end_matches('/'),
            urlencoding::encode(model)
        )
    }

    async fn post(
        &self,
        url: &str,
        prompt: &Prompt,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, RelayError> {
        let api_key = self.api_key()?;
        let mut request = self
            .http_client
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(&GenerateContentRequest::user(prompt));
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|e| RelayError::HttpError(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response)
    }
}

#[async_trait]
impl TokenSource for GeminiClient {
    fn provider_id(&self) -> &str {
        "gemini"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::new()
            .with_streaming()
            .with_completion()
    }

    async fn start(&self, prompt: &Prompt) -> Result<FragmentStreamHandle, RelayError> {
        let url = format!("{}?alt=sse", self.endpoint("streamGenerateContent"));
        let response = self.post(&url, prompt, None).await?;
        tracing::debug!(model = %self.config.model, "gemini stream opened");

        let mut events = Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| RelayError::HttpError(format!("Stream error: {e}"))))
                .eventsource(),
        );

        let fragments = async_stream::stream! {
            while let Some(item) = events.next().await {
                let event = match item {
                    Ok(ev) => ev,
                    Err(e) => {
                        yield Err(RelayError::StreamError(format!("SSE stream error (gemini): {e}")));
                        return;
                    }
                };

                let data = event.data.trim();
                if data.is_empty() || data == "[DONE]" {
                    continue;
                }

                match parse_stream_chunk(data) {
                    Ok(Some(text)) => yield Ok(text),
                    Ok(None) => {}
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        };

        Ok(FragmentStreamHandle::new(Box::pin(fragments)))
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, RelayError> {
        let url = self.endpoint("generateContent");
        let timeout = self.config.timeout.map(Duration::from_secs);
        let response = self.post(&url, prompt, timeout).await?;
        let body: GeminiResponse = response
            .json()
            .await
            .map_err(|e| RelayError::ParseError(format!("Failed to parse Gemini response: {e}")))?;
        if let Some(err) = body.error {
            return Err(err.into_relay_error(500));
        }
        Ok(body.text().unwrap_or_default())
    }
}
