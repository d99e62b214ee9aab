//! Streaming Module
//!
//! Both halves of the relay wire protocol:
//! - Event frames and wire constants
//! - The encoder (fragment stream -> framed bytes)
//! - The decoder (arbitrarily chunked bytes -> text deltas -> outcome)

mod decoder;
mod encoder;
pub mod frame;

pub use decoder::*;
pub use encoder::*;
pub use frame::{DATA_PREFIX, DONE_MARKER, EventFrame, FramePayload};
