//! Upstream token sources
//!
//! A token source wraps one generative-text provider and exposes a lazy,
//! single-use sequence of text fragments per prompt. Sources are constructed
//! explicitly and injected into the relay; nothing here is global.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::RelayError;
use crate::types::{Prompt, ProviderCapabilities};
use crate::utils::cancel::CancelHandle;

pub mod gemini;
pub mod scripted;

pub use gemini::{GeminiClient, GeminiConfig};
pub use scripted::{ScriptedRecorder, ScriptedTokenSource};

/// Fragment Stream - ordered, finite, not restartable.
///
/// An `Err` item is terminal: sources never yield after an error.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, RelayError>> + Send>>;

/// Fragment stream with first-class cancellation handle.
///
/// Cancelling the handle ends `stream` promptly and releases the upstream call.
pub struct FragmentStreamHandle {
    pub stream: FragmentStream,
    pub cancel: CancelHandle,
}

impl FragmentStreamHandle {
    /// Attach a fresh cancel handle to `stream`.
    pub fn new(stream: FragmentStream) -> Self {
        let (stream, cancel) = crate::utils::cancel::make_cancellable_stream(stream);
        Self { stream, cancel }
    }

    /// A session that yields exactly one fragment.
    pub fn single(text: String) -> Self {
        Self::new(Box::pin(futures::stream::once(async move { Ok(text) })))
    }
}

impl std::fmt::Debug for FragmentStreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentStreamHandle")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Upstream Token Source
///
/// `start` must fail before producing any fragment when the source cannot
/// run at all (missing credentials, rejected request), so that the encoder
/// never opens a stream for a session that never started.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Short provider identifier used in logs.
    fn provider_id(&self) -> &str;

    fn capabilities(&self) -> ProviderCapabilities;

    /// Start a streaming generation.
    async fn start(&self, prompt: &Prompt) -> Result<FragmentStreamHandle, RelayError>;

    /// Start a non-streaming generation and wait for the full text.
    async fn generate(&self, prompt: &Prompt) -> Result<String, RelayError>;
}
