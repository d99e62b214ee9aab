//! Stream encoder
//!
//! Turns an upstream fragment stream into framed bytes suitable for an HTTP
//! response body. Fragments are forwarded as they arrive, one frame each; the
//! sentinel frame is written only when the upstream finishes cleanly. Any
//! failure ends the byte stream with an `Err` item, which HTTP layers surface
//! as an aborted body rather than a clean end-of-stream.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use futures_util::StreamExt;
use tokio::time::Instant;

use super::frame::EventFrame;
use crate::error::RelayError;
use crate::provider::FragmentStreamHandle;
use crate::utils::cancel::CancelOnDrop;

/// Byte stream suitable for HTTP responses.
pub type FrameByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, RelayError>> + Send>>;

#[derive(Debug, Clone, Default)]
pub struct EncoderOptions {
    /// Upper bound on the whole session; the upstream is cancelled when exceeded.
    pub session_timeout: Option<Duration>,
    /// Absolute end of the session. Takes precedence over `session_timeout`
    /// when the session budget started before the upstream was opened.
    pub deadline: Option<Instant>,
    /// Identifier attached to log records of this session.
    pub session_id: Option<String>,
}

impl EncoderOptions {
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = Some(timeout);
        self
    }

    /// Share a deadline computed before `start`, so opening the upstream and
    /// streaming from it draw on one budget.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }
}

/// Encode a fragment stream into event frames.
///
/// Empty fragments produce no frame. If the returned stream is dropped before
/// it finishes (consumer disconnect), the upstream handle is cancelled.
pub fn encode_fragment_stream(handle: FragmentStreamHandle, opts: EncoderOptions) -> FrameByteStream {
    let FragmentStreamHandle {
        stream: mut fragments,
        cancel,
    } = handle;
    let mut guard = CancelOnDrop::new(cancel.clone());
    let session_id = opts.session_id.unwrap_or_default();
    let deadline = match (opts.deadline, opts.session_timeout) {
        (Some(at), limit) => Some((limit, at)),
        (None, Some(limit)) => Some((Some(limit), Instant::now() + limit)),
        (None, None) => None,
    };

    let s = async_stream::stream! {
        let mut frames = 0usize;
        let mut bytes_out = 0usize;

        loop {
            let next = match deadline {
                Some((limit, at)) => match tokio::time::timeout_at(at, fragments.next()).await {
                    Ok(item) => item,
                    Err(_) => {
                        cancel.cancel();
                        guard.disarm();
                        tracing::warn!(session_id = %session_id, frames, "session exceeded its lifetime; upstream cancelled");
                        yield Err(session_timeout_error(limit));
                        return;
                    }
                },
                None => fragments.next().await,
            };

            match next {
                Some(Ok(text)) => {
                    if text.is_empty() {
                        continue;
                    }
                    match EventFrame::Fragment(text).encode() {
                        Ok(bytes) => {
                            frames += 1;
                            bytes_out += bytes.len();
                            yield Ok(bytes);
                        }
                        Err(e) => {
                            cancel.cancel();
                            guard.disarm();
                            yield Err(e);
                            return;
                        }
                    }
                }
                Some(Err(e)) => {
                    guard.disarm();
                    tracing::warn!(session_id = %session_id, frames, error = %e, "upstream failed mid-stream");
                    yield Err(e);
                    return;
                }
                None if cancel.is_cancelled() => {
                    guard.disarm();
                    tracing::debug!(session_id = %session_id, frames, "upstream cancelled before completion");
                    yield Err(RelayError::Cancelled("upstream stream was cancelled".to_string()));
                    return;
                }
                None => {
                    guard.disarm();
                    let done = EventFrame::Done.encode();
                    if let Ok(bytes) = &done {
                        bytes_out += bytes.len();
                    }
                    tracing::debug!(session_id = %session_id, frames, bytes = bytes_out, "stream completed");
                    yield done;
                    return;
                }
            }
        }
    };

    Box::pin(s)
}

/// Error reported when a session outlives its budget.
pub fn session_timeout_error(limit: Option<Duration>) -> RelayError {
    match limit {
        Some(limit) => RelayError::Timeout(format!("session exceeded {}s", limit.as_secs_f64())),
        None => RelayError::Timeout("session deadline passed".to_string()),
    }
}
