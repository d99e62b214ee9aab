//! Relay server
//!
//! HTTP surface of the relay. The framework-agnostic parts (state, options,
//! error bodies) live here; the axum router and handlers live in [`axum`].
//!
//! ## Endpoints
//!
//! - `POST /api/generate` - `{ "prompt": string }` -> `text/event-stream` of
//!   `data: {"text": ...}` frames terminated by `data: [DONE]`
//! - `POST /api/generate/complete` - `{ "prompt": string }` -> `{ "text": string }`

use std::sync::Arc;
use std::time::Duration;

use crate::config::DEFAULT_SESSION_TIMEOUT;
use crate::error::{ErrorCategory, RelayError};
use crate::pipeline::GenerationPipeline;
use crate::provider::TokenSource;
use crate::types::ErrorBody;

pub mod axum;

pub use self::axum::{router, serve, sse_response};

/// Server behaviour knobs.
#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Upper bound on the lifetime of one session, streaming or not.
    ///
    /// Default: 300 seconds
    pub session_timeout: Option<Duration>,

    /// Whether to hide upstream error details from clients.
    ///
    /// Validation messages are never masked, and configuration errors keep
    /// their `kind` so clients can tell them apart from transient failures.
    /// Default: `true`
    pub mask_errors: bool,

    /// Message used when `mask_errors` is `true`.
    ///
    /// Default: `None` ("Failed to generate content")
    pub masked_error_message: Option<String>,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            session_timeout: Some(DEFAULT_SESSION_TIMEOUT),
            mask_errors: true,
            masked_error_message: None,
        }
    }
}

impl RelayOptions {
    /// Options suitable for development (errors not masked).
    pub fn development() -> Self {
        Self {
            mask_errors: false,
            ..Default::default()
        }
    }

    /// Options suitable for production (errors masked).
    pub fn production() -> Self {
        Self {
            mask_errors: true,
            ..Default::default()
        }
    }

    pub fn with_session_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.session_timeout = timeout;
        self
    }

    /// Build the JSON body reported for `err`.
    ///
    /// Validation failures carry only the message, as `{"error": "Prompt is required"}`.
    pub fn error_body(&self, err: &RelayError) -> ErrorBody {
        let category = err.category();
        let error = match category {
            ErrorCategory::Validation => err.user_message(),
            _ if !self.mask_errors => err.user_message(),
            ErrorCategory::Configuration => {
                "The generation service is not configured correctly".to_string()
            }
            _ => self
                .masked_error_message
                .clone()
                .unwrap_or_else(|| "Failed to generate content".to_string()),
        };
        let kind = (category != ErrorCategory::Validation).then(|| category.as_str().to_string());
        let upstream_status = match err {
            RelayError::ApiError { code, .. } => Some(*code),
            _ => None,
        };
        ErrorBody {
            error,
            kind,
            upstream_status,
        }
    }
}

/// Shared state of the relay handlers: the injected pipeline and options.
#[derive(Debug, Clone)]
pub struct RelayState {
    pipeline: GenerationPipeline,
    options: Arc<RelayOptions>,
}

impl RelayState {
    pub fn new(source: Arc<dyn TokenSource>, options: RelayOptions) -> Self {
        Self {
            pipeline: GenerationPipeline::new(source),
            options: Arc::new(options),
        }
    }

    pub fn pipeline(&self) -> &GenerationPipeline {
        &self.pipeline
    }

    pub fn options(&self) -> &RelayOptions {
        &self.options
    }
}
