//! Session plumbing around the MDB decoder: capture input, trace output.

pub mod capture;
pub mod trace;

pub use capture::{parse_capture, read_capture, CaptureError};
pub use trace::TraceStore;
