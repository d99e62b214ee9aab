//! Event frames
//!
//! Wire format shared by the encoder and the decoder:
//!
//! ```text
//! data: {"text":"Hello"}\n\n
//! data: [DONE]\n\n
//! ```
//!
//! The JSON encoder escapes newlines inside the text, so every frame occupies
//! exactly one line followed by a blank separator line.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Marker every frame line starts with.
pub const DATA_PREFIX: &str = "data: ";

/// Payload of the terminal sentinel frame.
pub const DONE_MARKER: &str = "[DONE]";

/// Frame terminator: end of line plus the blank separator line.
pub const FRAME_TERMINATOR: &str = "\n\n";

const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";

/// JSON payload carried by a fragment frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramePayload {
    pub text: String,
}

#[derive(Serialize)]
struct BorrowedPayload<'a> {
    text: &'a str,
}

/// One self-delimited unit on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFrame {
    Fragment(String),
    Done,
}

impl EventFrame {
    /// Serialize this frame including its terminator.
    pub fn encode(&self) -> Result<Bytes, RelayError> {
        match self {
            Self::Fragment(text) => encode_fragment(text),
            Self::Done => Ok(done_frame()),
        }
    }
}

/// Encode one fragment as `data: {"text":...}\n\n`.
pub fn encode_fragment(text: &str) -> Result<Bytes, RelayError> {
    let json = serde_json::to_string(&BorrowedPayload { text })
        .map_err(|e| RelayError::InternalError(format!("Failed to encode frame: {e}")))?;
    let mut out = String::with_capacity(DATA_PREFIX.len() + json.len() + FRAME_TERMINATOR.len());
    out.push_str(DATA_PREFIX);
    out.push_str(&json);
    out.push_str(FRAME_TERMINATOR);
    Ok(Bytes::from(out))
}

/// The terminal sentinel frame.
fn done_frame() -> Bytes {
    Bytes::from_static(DONE_FRAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_frame_layout() {
        let bytes = encode_fragment("Hello").unwrap();
        assert_eq!(&bytes[..], b"data: {\"text\":\"Hello\"}\n\n");
    }

    #[test]
    fn newlines_stay_inside_one_line() {
        let bytes = encode_fragment("line one\nline two\r\n").unwrap();
        let s = std::str::from_utf8(&bytes).unwrap();
        assert_eq!(s.matches('\n').count(), 2);
        assert!(s.ends_with("\n\n"));
        assert!(s.contains(r"line one\nline two\r\n"));
    }

    #[test]
    fn done_frame_matches_marker() {
        assert_eq!(
            EventFrame::Done.encode().unwrap(),
            Bytes::from(format!("{DATA_PREFIX}{DONE_MARKER}{FRAME_TERMINATOR}"))
        );
    }
}
