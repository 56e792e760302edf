//! Mod-256 frame checksum.
//!
//! Every multi-byte MDB frame ends in a CHK byte equal to the sum of all
//! preceding bytes, truncated to 8 bits. There is no CRC on this bus.

/// Sum of `bytes` modulo 256.
pub fn sum_mod_256(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Outcome of checking a frame's trailing CHK byte.
///
/// Carries both values so a mismatch can be reported verbatim in the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumCheck {
    /// Sum of the frame body, mod 256.
    pub expected: u8,
    /// The CHK byte actually received.
    pub actual: u8,
}

impl ChecksumCheck {
    pub fn is_valid(&self) -> bool {
        self.expected == self.actual
    }
}

/// Check the trailing byte of `frame` against the mod-256 sum of the rest.
///
/// Callers guarantee `frame` is non-empty; an empty slice trivially passes.
pub fn verify(frame: &[u8]) -> ChecksumCheck {
    match frame.split_last() {
        Some((&actual, body)) => ChecksumCheck {
            expected: sum_mod_256(body),
            actual,
        },
        None => ChecksumCheck {
            expected: 0,
            actual: 0,
        },
    }
}
