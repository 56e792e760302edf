//! Frame-level error taxonomy.
//!
//! None of these are fatal: a bad frame produces a [`DecodedEvent`] with the
//! rendered error text attached, and decoding resumes with the next frame.
//!
//! [`DecodedEvent`]: crate::DecodedEvent

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// VMC frame whose first byte lacks the address marker, or where a
    /// later byte incorrectly carries it.
    #[error("Invalid Mode bit")]
    InvalidModeBit,

    /// Trailing CHK byte disagrees with the mod-256 sum of the body.
    #[error("Invalid CHK, expected {expected}, got {actual}.")]
    InvalidChecksum { expected: u8, actual: u8 },

    /// A command requiring an exact payload size received a different one.
    #[error("invalid VMC data length for {command}")]
    InvalidPayloadLength { command: &'static str },

    /// EXPANSION command with no sub-command byte at all.
    #[error("Invalid expansion command: subcommand missing")]
    SubcommandMissing,
}
