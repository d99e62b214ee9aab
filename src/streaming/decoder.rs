//! Stream decoder
//!
//! Client-side half of the relay. Bytes arrive in arbitrary chunks; a chunk
//! may hold zero, one or many frames, and a frame may be split anywhere,
//! including inside a multi-byte UTF-8 sequence. [`FrameDecoder`] keeps a
//! rolling byte buffer and only classifies complete lines. The async helpers
//! on top accumulate text and resolve the session to a [`StreamOutcome`].

use std::pin::Pin;

use futures::Stream;
use futures_util::StreamExt;

use super::frame::{DONE_MARKER, FramePayload};
use crate::error::RelayError;

/// Longest pending line accepted before it is reported as malformed.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

const DATA_FIELD: &[u8] = b"data:";

/// Decode outcome of one complete line carrying the frame marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedLine {
    /// A non-empty text fragment.
    Fragment(String),
    /// The terminal sentinel.
    Sentinel,
    /// The line carried the marker but its payload could not be used.
    Malformed { line: String, reason: String },
}

/// What to do with [`DecodedLine::Malformed`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MalformedPolicy {
    /// Skip the line silently.
    #[default]
    Drop,
    /// Skip the line and emit a warning.
    Log,
    /// Fail the session.
    FailFast,
}

/// Push-based line decoder.
#[derive(Debug)]
pub struct FrameDecoder {
    pending: Vec<u8>,
    max_line_bytes: usize,
    /// Skipping the rest of an oversize line.
    discarding: bool,
    finished: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_line_bytes(DEFAULT_MAX_LINE_BYTES)
    }

    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line_bytes,
            discarding: false,
            finished: false,
        }
    }

    /// Whether the sentinel was seen or the input was finished.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Bytes held back waiting for a line terminator.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Feed one chunk and return the outcomes of every line it completed.
    ///
    /// After the sentinel nothing more is decoded.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<DecodedLine> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }

        let mut chunk = chunk;
        if self.discarding {
            match chunk.iter().position(|b| *b == b'\n') {
                Some(index) => {
                    self.discarding = false;
                    chunk = &chunk[index + 1..];
                }
                None => return out,
            }
        }
        self.pending.extend_from_slice(chunk);

        let mut consumed = 0;
        while let Some(offset) = self.pending[consumed..].iter().position(|b| *b == b'\n') {
            let end = consumed + offset;
            let outcome = classify_line(&self.pending[consumed..end]);
            consumed = end + 1;
            if let Some(outcome) = outcome {
                let sentinel = outcome == DecodedLine::Sentinel;
                out.push(outcome);
                if sentinel {
                    self.finished = true;
                    self.pending.clear();
                    return out;
                }
            }
        }
        self.pending.drain(..consumed);

        if self.pending.len() > self.max_line_bytes {
            out.push(DecodedLine::Malformed {
                line: preview(&self.pending),
                reason: format!("line exceeds {} bytes", self.max_line_bytes),
            });
            self.pending.clear();
            self.discarding = true;
        }
        out
    }

    /// Signal end-of-data.
    ///
    /// A trailing line without its terminator is decoded once, so a final
    /// frame that only lost its newline is not lost.
    pub fn finish(&mut self) -> Vec<DecodedLine> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        let rest = std::mem::take(&mut self.pending);
        if self.discarding || rest.is_empty() {
            return Vec::new();
        }
        classify_line(&rest).into_iter().collect()
    }
}

/// Classify one line (terminator already removed).
///
/// Lines without the `data:` field are not frames (blank separators, SSE
/// comments, `event:` lines) and yield nothing.
fn classify_line(line: &[u8]) -> Option<DecodedLine> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let payload = line.strip_prefix(DATA_FIELD)?;
    let payload = payload.strip_prefix(b" ").unwrap_or(payload);

    let payload = match std::str::from_utf8(payload) {
        Ok(s) => s,
        Err(e) => {
            return Some(DecodedLine::Malformed {
                line: preview(line),
                reason: format!("invalid UTF-8: {e}"),
            });
        }
    };

    if payload.trim_end() == DONE_MARKER {
        return Some(DecodedLine::Sentinel);
    }

    match serde_json::from_str::<FramePayload>(payload) {
        Ok(FramePayload { text }) if text.is_empty() => None,
        Ok(FramePayload { text }) => Some(DecodedLine::Fragment(text)),
        Err(e) => Some(DecodedLine::Malformed {
            line: preview(line),
            reason: e.to_string(),
        }),
    }
}

fn preview(bytes: &[u8]) -> String {
    const LIMIT: usize = 120;
    let text = String::from_utf8_lossy(&bytes[..bytes.len().min(LIMIT)]);
    if bytes.len() > LIMIT {
        format!("{text}...")
    } else {
        text.into_owned()
    }
}

/// How a completed session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The sentinel frame was received.
    Sentinel,
    /// The channel closed cleanly without a sentinel; the text may be incomplete.
    EndOfData,
}

/// Terminal outcome of one decoded session.
#[derive(Debug, Clone)]
pub enum StreamOutcome {
    Completed {
        text: String,
        termination: Termination,
    },
    /// The channel failed; `partial_text` holds everything decoded before that.
    Failed {
        partial_text: String,
        error: RelayError,
    },
}

impl StreamOutcome {
    /// Accumulated text, complete or not.
    pub fn text(&self) -> &str {
        match self {
            Self::Completed { text, .. } => text,
            Self::Failed { partial_text, .. } => partial_text,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// True unless the sentinel was received.
    pub fn is_incomplete(&self) -> bool {
        !matches!(
            self,
            Self::Completed {
                termination: Termination::Sentinel,
                ..
            }
        )
    }

    pub fn error(&self) -> Option<&RelayError> {
        match self {
            Self::Failed { error, .. } => Some(error),
            Self::Completed { .. } => None,
        }
    }

    /// `Ok(text)` for a completed session, `Err` for a failed one.
    pub fn into_result(self) -> Result<String, RelayError> {
        match self {
            Self::Completed { text, .. } => Ok(text),
            Self::Failed { error, .. } => Err(error),
        }
    }
}

/// One appended fragment as seen by the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextDelta<'a> {
    /// The fragment just decoded.
    pub delta: &'a str,
    /// Accumulated text including `delta`.
    pub accumulated: &'a str,
}

enum Step {
    Continue,
    Sentinel,
    Fail(RelayError),
}

/// Apply `policy` to one malformed line; `Some` means fail the session.
fn handle_malformed(policy: MalformedPolicy, line: String, reason: String) -> Option<RelayError> {
    match policy {
        MalformedPolicy::Drop => {
            tracing::trace!(%reason, "dropping malformed frame");
            None
        }
        MalformedPolicy::Log => {
            tracing::warn!(%reason, %line, "dropping malformed frame");
            None
        }
        MalformedPolicy::FailFast => Some(RelayError::MalformedFrame { line, reason }),
    }
}

fn apply_lines<F>(
    lines: Vec<DecodedLine>,
    policy: MalformedPolicy,
    text: &mut String,
    on_delta: &mut F,
) -> Step
where
    F: FnMut(TextDelta<'_>),
{
    for line in lines {
        match line {
            DecodedLine::Fragment(fragment) => {
                text.push_str(&fragment);
                on_delta(TextDelta {
                    delta: &fragment,
                    accumulated: text.as_str(),
                });
            }
            DecodedLine::Sentinel => return Step::Sentinel,
            DecodedLine::Malformed { line, reason } => {
                if let Some(err) = handle_malformed(policy, line, reason) {
                    return Step::Fail(err);
                }
            }
        }
    }
    Step::Continue
}

/// Drive a byte channel to its terminal outcome.
///
/// `on_delta` is called once per decoded fragment, in arrival order. The
/// channel is not read past the sentinel.
pub async fn consume_byte_stream<S, B, E, F>(
    stream: S,
    policy: MalformedPolicy,
    mut on_delta: F,
) -> StreamOutcome
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<RelayError>,
    F: FnMut(TextDelta<'_>),
{
    futures::pin_mut!(stream);
    let mut decoder = FrameDecoder::new();
    let mut text = String::new();

    loop {
        let (lines, at_end) = match stream.next().await {
            Some(Ok(chunk)) => (decoder.feed(chunk.as_ref()), false),
            Some(Err(e)) => {
                let error: RelayError = e.into();
                tracing::debug!(error = %error, received = text.len(), "byte channel failed");
                return StreamOutcome::Failed {
                    partial_text: text,
                    error,
                };
            }
            None => (decoder.finish(), true),
        };

        match apply_lines(lines, policy, &mut text, &mut on_delta) {
            Step::Sentinel => {
                return StreamOutcome::Completed {
                    text,
                    termination: Termination::Sentinel,
                };
            }
            Step::Fail(error) => {
                return StreamOutcome::Failed {
                    partial_text: text,
                    error,
                };
            }
            Step::Continue if at_end => {
                tracing::debug!(received = text.len(), "byte channel ended without sentinel");
                return StreamOutcome::Completed {
                    text,
                    termination: Termination::EndOfData,
                };
            }
            Step::Continue => {}
        }
    }
}

/// Delta stream - decoded fragments as a stream.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String, RelayError>> + Send>>;

/// Convert a byte channel into a stream of text deltas.
///
/// The stream ends after the sentinel or at end-of-data; channel failures and
/// `FailFast` violations are yielded as a final `Err`.
pub fn delta_stream<S, B, E>(stream: S, policy: MalformedPolicy) -> DeltaStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<RelayError> + Send + 'static,
{
    let s = async_stream::stream! {
        futures::pin_mut!(stream);
        let mut decoder = FrameDecoder::new();
        loop {
            let lines = match stream.next().await {
                Some(Ok(chunk)) => decoder.feed(chunk.as_ref()),
                Some(Err(e)) => {
                    let err: RelayError = e.into();
                    yield Err(err);
                    return;
                }
                None => decoder.finish(),
            };
            for line in lines {
                match line {
                    DecodedLine::Fragment(fragment) => yield Ok(fragment),
                    DecodedLine::Sentinel => return,
                    DecodedLine::Malformed { line, reason } => {
                        if let Some(err) = handle_malformed(policy, line, reason) {
                            yield Err(err);
                            return;
                        }
                    }
                }
            }
            if decoder.is_finished() {
                return;
            }
        }
    };
    Box::pin(s)
}
