//! # tokenrelay - Token-streaming relay
//!
//! Pulls an incremental text response from an upstream generative-text
//! provider and re-emits it, fragment by fragment, as `text/event-stream`
//! frames. The client side reassembles frames split across arbitrary chunk
//! boundaries and reports whether the stream completed or failed.
//!
#![deny(unsafe_code)]

//! ## Wire format
//!
//! ```text
//! data: {"text":"Hello"}\n\n
//! data: {"text":", world!"}\n\n
//! data: [DONE]\n\n
//! ```
//!
//! A failure mid-stream aborts the body without the `[DONE]` sentinel.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tokenrelay::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), RelayError> {
//!     let config = RelayConfig::from_env()?;
//!     let source = Arc::new(GeminiClient::new(config.provider.clone())?);
//!     let state = RelayState::new(source, config.relay_options());
//!     let listener = tokio::net::TcpListener::bind(config.bind_addr).await
//!         .map_err(|e| RelayError::configuration(e.to_string()))?;
//!     tokenrelay::server::serve(listener, state, std::future::pending()).await
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod provider;
#[cfg(feature = "server")]
pub mod server;
pub mod streaming;
pub mod telemetry;
pub mod types;
pub mod utils;

pub use client::RelayClient;
pub use config::RelayConfig;
pub use error::{ErrorCategory, RelayError};
pub use pipeline::GenerationPipeline;
pub use provider::{FragmentStream, FragmentStreamHandle, TokenSource};
pub use streaming::{
    FrameDecoder, MalformedPolicy, StreamOutcome, TextDelta, consume_byte_stream,
    encode_fragment_stream,
};
pub use types::Prompt;

/// Common imports
pub mod prelude {
    pub use crate::client::RelayClient;
    pub use crate::config::RelayConfig;
    pub use crate::error::{ErrorCategory, RelayError};
    pub use crate::pipeline::GenerationPipeline;
    pub use crate::provider::{
        FragmentStreamHandle, GeminiClient, GeminiConfig, ScriptedTokenSource, TokenSource,
    };
    #[cfg(feature = "server")]
    pub use crate::server::{RelayOptions, RelayState};
    pub use crate::streaming::{
        EncoderOptions, MalformedPolicy, StreamOutcome, Termination, TextDelta,
    };
    pub use crate::types::Prompt;
    pub use crate::utils::CancelHandle;
}
