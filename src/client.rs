//! Relay client
//!
//! Consumes the relay endpoint over HTTP and drives the frame decoder, so
//! callers see ordered text deltas and a tagged terminal outcome.
//!
//! ```rust,ignore
//! use tokenrelay::client::RelayClient;
//! use tokenrelay::streaming::MalformedPolicy;
//!
//! let client = RelayClient::new("http://127.0.0.1:3000");
//! let outcome = client
//!     .stream("Write a haiku", MalformedPolicy::default(), |d| print!("{}", d.delta))
//!     .await?;
//! assert!(outcome.is_completed());
//! ```

use reqwest::Client as HttpClient;

use crate::error::RelayError;
use crate::streaming::{MalformedPolicy, StreamOutcome, TextDelta, consume_byte_stream};
use crate::types::{CompletionResponse, ErrorBody, GenerateRequest};

/// HTTP consumer of a relay server.
#[derive(Debug, Clone)]
pub struct RelayClient {
    http_client: HttpClient,
    base_url: String,
}

impl RelayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_http_client(base_url, HttpClient::new())
    }

    pub fn with_http_client(base_url: impl Into<String>, http_client: HttpClient) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Open a streaming session and read it to its terminal outcome.
    ///
    /// `Err` is returned only when no stream was opened (connection failure or
    /// a non-success status). Failures after that are reported as
    /// [`StreamOutcome::Failed`] with the text decoded so far.
    pub async fn stream<F>(
        &self,
        prompt: impl Into<String>,
        policy: MalformedPolicy,
        on_delta: F,
    ) -> Result<StreamOutcome, RelayError>
    where
        F: FnMut(TextDelta<'_>),
    {
        let response = self
            .post("/api/generate", &GenerateRequest::new(prompt))
            .await?;
        Ok(consume_byte_stream(response.bytes_stream(), policy, on_delta).await)
    }

    /// Request the whole text in one response.
    pub async fn complete(&self, prompt: impl Into<String>) -> Result<String, RelayError> {
        let response = self
            .post("/api/generate/complete", &GenerateRequest::new(prompt))
            .await?;
        let body: CompletionResponse = response.json().await?;
        Ok(body.text)
    }

    async fn post(
        &self,
        path: &str,
        body: &GenerateRequest,
    ) -> Result<reqwest::Response, RelayError> {
        let response = self
            .http_client
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        Err(error_from_body(status, &text))
    }
}

/// Rebuild a [`RelayError`] from a relay error response.
///
/// `upstream` errors carry the provider's own status when the relay reported
/// it, so [`RelayError::is_retryable`] sees the provider's answer rather than
/// the relay's 502.
fn error_from_body(status: u16, text: &str) -> RelayError {
    let Ok(body) = serde_json::from_str::<ErrorBody>(text) else {
        return RelayError::api_error(status, text.to_string());
    };
    match body.kind.as_deref() {
        Some("validation") => RelayError::InvalidInput(body.error),
        Some("configuration") => RelayError::ConfigurationError(body.error),
        Some("upstream") => RelayError::api_error(body.upstream_status.unwrap_or(status), body.error),
        Some("transport") if status == 504 => RelayError::Timeout(body.error),
        Some("transport") => RelayError::HttpError(body.error),
        Some("internal") => RelayError::InternalError(body.error),
        _ if status == 400 => RelayError::InvalidInput(body.error),
        _ => RelayError::api_error(status, body.error),
    }
}
