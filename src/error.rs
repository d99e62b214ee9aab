//! Error Handling Module
//!
//! A single error type flows through the whole relay: the upstream token source,
//! the stream encoder, the HTTP layer and the client-side decoder.
//!
//! # Example
//!
//! ```rust,ignore
//! use tokenrelay::error::{RelayError, ErrorCategory};
//!
//! let error = RelayError::invalid_input("Prompt is required");
//! assert_eq!(error.category(), ErrorCategory::Validation);
//! assert_eq!(error.http_status(), 400);
//! ```

use std::fmt;

use thiserror::Error;

/// Errors produced anywhere in a relay session.
#[derive(Error, Debug, Clone)]
pub enum RelayError {
    /// The request was rejected before any stream was opened.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The upstream provider is not configured (missing key, bad base url, ...).
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Credentials were rejected by the upstream provider.
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// Upstream replied with a non-success status.
    #[error("API error {code}: {message}")]
    ApiError {
        code: u16,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// Transport-level failure talking to the upstream or to the relay.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// The byte/event stream failed after it was opened.
    #[error("Stream error: {0}")]
    StreamError(String),

    /// A payload could not be parsed.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// A single frame line could not be decoded.
    #[error("Malformed frame ({reason}): {line}")]
    MalformedFrame { line: String, reason: String },

    /// The session exceeded its lifetime bound.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The session was cancelled by the consumer.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Coarse classification used for HTTP status mapping and user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Bad input from the caller; never streamed.
    Validation,
    /// Misconfiguration; distinct from transient failures.
    Configuration,
    /// The upstream provider failed or rejected the request.
    Upstream,
    /// Network, framing or lifetime failures.
    Transport,
    Internal,
}

impl ErrorCategory {
    /// Stable lowercase name, used as the `kind` field of JSON error bodies.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Configuration => "configuration",
            Self::Upstream => "upstream",
            Self::Transport => "transport",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RelayError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::ConfigurationError(msg.into())
    }

    pub fn api_error(code: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn stream(msg: impl Into<String>) -> Self {
        Self::StreamError(msg.into())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidInput(_) => ErrorCategory::Validation,
            Self::ConfigurationError(_) | Self::AuthenticationError(_) => {
                ErrorCategory::Configuration
            }
            Self::ApiError { .. } => ErrorCategory::Upstream,
            Self::HttpError(_)
            | Self::StreamError(_)
            | Self::ParseError(_)
            | Self::MalformedFrame { .. }
            | Self::Timeout(_)
            | Self::Cancelled(_) => ErrorCategory::Transport,
            Self::InternalError(_) => ErrorCategory::Internal,
        }
    }

    /// Status code used when this error is reported before a stream starts.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::ConfigurationError(_) | Self::AuthenticationError(_) => 500,
            Self::ApiError { code, .. } if *code == 429 => 429,
            Self::ApiError { .. } => 502,
            Self::Timeout(_) => 504,
            Self::HttpError(_)
            | Self::StreamError(_)
            | Self::ParseError(_)
            | Self::MalformedFrame { .. } => 502,
            Self::Cancelled(_) => 499,
            Self::InternalError(_) => 500,
        }
    }

    /// Whether re-issuing a new session could plausibly succeed.
    ///
    /// Nothing in the relay retries automatically; this only informs callers.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ApiError { code, .. } => *code == 429 || *code >= 500,
            Self::HttpError(_) | Self::StreamError(_) | Self::Timeout(_) => true,
            _ => false,
        }
    }

    /// Message suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidInput(msg) => msg.clone(),
            Self::ConfigurationError(msg) => {
                format!("The generation service is not configured correctly: {msg}")
            }
            Self::AuthenticationError(msg) => msg.clone(),
            Self::ApiError { code, message, .. } => {
                format!("The upstream provider returned an error ({code}): {message}")
            }
            Self::Timeout(_) => "The response took too long and was stopped.".to_string(),
            Self::Cancelled(_) => "The response was cancelled.".to_string(),
            Self::HttpError(msg) | Self::StreamError(msg) => {
                format!("The response stream was interrupted: {msg}")
            }
            Self::ParseError(msg) => format!("The response could not be read: {msg}"),
            Self::MalformedFrame { reason, .. } => {
                format!("The response contained a corrupted frame: {reason}")
            }
            Self::InternalError(_) => "internal error".to_string(),
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if let Some(status) = err.status() {
            Self::api_error(status.as_u16(), err.to_string())
        } else {
            Self::HttpError(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_bad_request() {
        let err = RelayError::invalid_input("Prompt is required");
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert_eq!(err.http_status(), 400);
        assert_eq!(err.user_message(), "Prompt is required");
        assert!(!err.is_retryable());
    }

    #[test]
    fn configuration_is_distinct_from_transient() {
        let config = RelayError::configuration("GEMINI_API_KEY is not set");
        let transient = RelayError::stream("connection reset");

        assert_eq!(config.category(), ErrorCategory::Configuration);
        assert_eq!(transient.category(), ErrorCategory::Transport);
        assert!(config.user_message().contains("not configured"));
        assert!(transient.is_retryable());
        assert!(!config.is_retryable());
    }

    #[test]
    fn api_error_status_mapping() {
        assert_eq!(RelayError::api_error(500, "boom").http_status(), 502);
        assert_eq!(RelayError::api_error(429, "slow down").http_status(), 429);
        assert!(RelayError::api_error(503, "unavailable").is_retryable());
        assert!(!RelayError::api_error(400, "bad").is_retryable());
    }

    #[test]
    fn category_names_are_stable() {
        assert_eq!(ErrorCategory::Configuration.to_string(), "configuration");
        assert_eq!(ErrorCategory::Upstream.as_str(), "upstream");
    }
}
