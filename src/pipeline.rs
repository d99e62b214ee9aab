//! Generation pipeline
//!
//! One entry point for both display modes: callers that render incrementally
//! use [`GenerationPipeline::stream`], callers that only show the final text
//! use [`GenerationPipeline::complete`]. Either mode works against any source;
//! the missing capability is emulated with the other one.

use std::sync::Arc;

use futures_util::TryStreamExt;

use crate::error::RelayError;
use crate::provider::{FragmentStreamHandle, TokenSource};
use crate::types::Prompt;

#[derive(Clone)]
pub struct GenerationPipeline {
    source: Arc<dyn TokenSource>,
}

impl GenerationPipeline {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &Arc<dyn TokenSource> {
        &self.source
    }

    pub fn provider_id(&self) -> &str {
        self.source.provider_id()
    }

    /// Whether `stream` yields fragments as they are generated.
    pub fn supports_streaming(&self) -> bool {
        self.source.capabilities().supports_streaming()
    }

    /// Open a fragment stream for `prompt`.
    ///
    /// Sources without native streaming produce a single fragment holding the
    /// complete text.
    pub async fn stream(&self, prompt: &Prompt) -> Result<FragmentStreamHandle, RelayError> {
        if self.supports_streaming() {
            return self.source.start(prompt).await;
        }
        let text = self.source.generate(prompt).await?;
        Ok(if text.is_empty() {
            FragmentStreamHandle::new(Box::pin(futures::stream::empty()))
        } else {
            FragmentStreamHandle::single(text)
        })
    }

    /// Generate the full text for `prompt`.
    pub async fn complete(&self, prompt: &Prompt) -> Result<String, RelayError> {
        if self.source.capabilities().supports_completion() {
            return self.source.generate(prompt).await;
        }
        let handle = self.source.start(prompt).await?;
        handle.stream.try_collect::<Vec<_>>().await.map(|v| v.concat())
    }
}

impl std::fmt::Debug for GenerationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationPipeline")
            .field("provider", &self.source.provider_id())
            .field("capabilities", &self.source.capabilities())
            .finish()
    }
}
