//! Scripted token source
//!
//! Deterministic in-process source that replays a fixed list of fragments.
//! Used as the offline provider of the binary and as the test double for the
//! encoder, the server and the pipeline. Every session it starts is observable
//! through a [`ScriptedRecorder`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{FragmentStreamHandle, TokenSource};
use crate::error::RelayError;
use crate::types::{Prompt, ProviderCapabilities};
use crate::utils::cancel::CancelHandle;

/// Shared record of what happened to the sessions of a [`ScriptedTokenSource`].
#[derive(Debug, Default)]
pub struct ScriptedRecorder {
    starts: AtomicUsize,
    emitted: AtomicUsize,
    released: AtomicBool,
    handles: Mutex<Vec<CancelHandle>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedRecorder {
    /// Number of `start` calls that produced a stream.
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Fragments handed to consumers across all sessions.
    pub fn emitted(&self) -> usize {
        self.emitted.load(Ordering::SeqCst)
    }

    /// Whether any session's cancel handle was fired.
    pub fn was_cancelled(&self) -> bool {
        self.handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(CancelHandle::is_cancelled)
    }

    /// Whether the most recent session's fragment producer has been dropped.
    pub fn was_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Prompts seen by `start` and `generate`, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn record_prompt(&self, prompt: &Prompt) {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.as_str().to_string());
    }
}

/// Sets the recorder's release flag when the producer is dropped.
struct ReleaseOnDrop(Arc<ScriptedRecorder>);

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        self.0.released.store(true, Ordering::SeqCst);
    }
}

/// Replays `fragments`, optionally failing, stalling or pacing along the way.
#[derive(Debug, Clone)]
pub struct ScriptedTokenSource {
    fragments: Vec<String>,
    delay: Option<Duration>,
    fail_after: Option<(usize, RelayError)>,
    init_error: Option<RelayError>,
    hang: bool,
    stall_start: bool,
    capabilities: ProviderCapabilities,
    recorder: Arc<ScriptedRecorder>,
}

impl ScriptedTokenSource {
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            delay: None,
            fail_after: None,
            init_error: None,
            hang: false,
            stall_start: false,
            capabilities: ProviderCapabilities::new()
                .with_streaming()
                .with_completion(),
            recorder: Arc::new(ScriptedRecorder::default()),
        }
    }

    /// Sleep before each fragment.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Yield `error` after `count` fragments instead of finishing.
    pub fn failing_after(mut self, count: usize, error: RelayError) -> Self {
        self.fail_after = Some((count, error));
        self
    }

    /// Fail `start` and `generate` before producing anything.
    pub fn failing_on_start(mut self, error: RelayError) -> Self {
        self.init_error = Some(error);
        self
    }

    /// Never finish after the scripted fragments: simulates a stalled upstream.
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Never return from `start` or `generate`: an upstream that accepts the
    /// request but never answers.
    pub fn stalling_on_start(mut self) -> Self {
        self.stall_start = true;
        self
    }

    pub fn with_capabilities(mut self, capabilities: ProviderCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn recorder(&self) -> Arc<ScriptedRecorder> {
        self.recorder.clone()
    }
}

#[async_trait]
impl TokenSource for ScriptedTokenSource {
    fn provider_id(&self) -> &str {
        "scripted"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.capabilities
    }

    async fn start(&self, prompt: &Prompt) -> Result<FragmentStreamHandle, RelayError> {
        self.recorder.record_prompt(prompt);
        if let Some(err) = &self.init_error {
            return Err(err.clone());
        }
        if self.stall_start {
            futures::future::pending::<()>().await;
        }
        if !self.capabilities.supports_streaming() {
            return Err(RelayError::InternalError(
                "scripted source configured without streaming".to_string(),
            ));
        }

        self.recorder.starts.fetch_add(1, Ordering::SeqCst);
        self.recorder.released.store(false, Ordering::SeqCst);

        let fragments = self.fragments.clone();
        let delay = self.delay;
        let fail_after = self.fail_after.clone();
        let hang = self.hang;
        let recorder = self.recorder.clone();

        let stream = async_stream::stream! {
            let _release = ReleaseOnDrop(recorder.clone());
            for (index, fragment) in fragments.into_iter().enumerate() {
                if let Some((count, err)) = &fail_after {
                    if index == *count {
                        yield Err(err.clone());
                        return;
                    }
                }
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                recorder.emitted.fetch_add(1, Ordering::SeqCst);
                yield Ok(fragment);
            }
            if let Some((_, err)) = fail_after {
                yield Err(err);
                return;
            }
            if hang {
                futures::future::pending::<()>().await;
            }
        };

        let handle = FragmentStreamHandle::new(Box::pin(stream));
        self.recorder
            .handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handle.cancel.clone());
        Ok(handle)
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, RelayError> {
        self.recorder.record_prompt(prompt);
        if let Some(err) = &self.init_error {
            return Err(err.clone());
        }
        if self.stall_start {
            futures::future::pending::<()>().await;
        }
        if !self.capabilities.supports_completion() {
            return Err(RelayError::InternalError(
                "scripted source configured without completion".to_string(),
            ));
        }
        if let Some((_, err)) = &self.fail_after {
            return Err(err.clone());
        }
        Ok(self.fragments.concat())
    }
}
