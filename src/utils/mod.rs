//! Utility modules for tokenrelay

pub mod cancel;

pub use cancel::{CancelHandle, CancelOnDrop, cancellable_with, make_cancellable_stream};
