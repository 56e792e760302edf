//! Frame accumulation.
//!
//! Both directions assemble frames the same way: bytes are appended to a
//! single owned buffer until the direction's boundary rule fires, the
//! buffer is finalized into a [`RawFrame`] for interpretation, and
//! accumulation restarts. At most one frame is ever in flight per decoder.

use crate::{ByteEvent, TimeSpan};

/// Bus-idle threshold in milliseconds.
///
/// On the VMC side a gap longer than this between consecutive bytes is an
/// implicit frame boundary.
pub const GAP_TIMEOUT_MS: f64 = 1.25;

/// True if the gap between the previous byte's end and the current byte's
/// start exceeds the bus-idle threshold.
pub fn gap_exceeded(prev_end_s: f64, start_s: f64) -> bool {
    (start_s - prev_end_s) * 1000.0 > GAP_TIMEOUT_MS
}

/// A finalized frame handed to an interpreter.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub bytes: Vec<u8>,
    /// Mode bit per byte, same length as `bytes`.
    pub mode_bits: Vec<bool>,
    /// First byte's start to last byte's end.
    pub span: TimeSpan,
}

/// The frame currently being accumulated.
///
/// `append` opens the frame on the first byte (recording its start time)
/// and extends the running end time on every byte; `finalize` hands the
/// buffered bytes out and resets the accumulator. Finalizing an empty
/// accumulator is a no-op so idle boundary ticks never produce events.
#[derive(Debug, Default)]
pub struct PendingFrame {
    bytes: Vec<u8>,
    mode_bits: Vec<bool>,
    start_s: f64,
    end_s: f64,
}

impl PendingFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn append(&mut self, event: ByteEvent) {
        if self.bytes.is_empty() {
            self.start_s = event.start_s;
        }
        self.bytes.push(event.byte);
        self.mode_bits.push(event.mode_bit);
        self.end_s = event.end_s;
    }

    /// Take the buffered frame, leaving the accumulator empty.
    pub fn finalize(&mut self) -> Option<RawFrame> {
        if self.bytes.is_empty() {
            return None;
        }
        Some(RawFrame {
            bytes: std::mem::take(&mut self.bytes),
            mode_bits: std::mem::take(&mut self.mode_bits),
            span: TimeSpan {
                start_s: self.start_s,
                end_s: self.end_s,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Times chosen to be exactly representable so span asserts are exact.
    fn event(byte: u8, mode_bit: bool, start_s: f64) -> ByteEvent {
        ByteEvent {
            byte,
            mode_bit,
            start_s,
            end_s: start_s + 0.25,
        }
    }

    #[test]
    fn finalize_empty_is_noop() {
        let mut pending = PendingFrame::new();
        assert!(pending.finalize().is_none());
    }

    #[test]
    fn span_covers_first_start_to_last_end() {
        let mut pending = PendingFrame::new();
        pending.append(event(0x0B, true, 1.0));
        pending.append(event(0x0B, false, 1.5));
        let frame = pending.finalize().unwrap();
        assert_eq!(frame.bytes, vec![0x0B, 0x0B]);
        assert_eq!(frame.mode_bits, vec![true, false]);
        assert_eq!(frame.span.start_s, 1.0);
        assert_eq!(frame.span.end_s, 1.75);
    }

    #[test]
    fn finalize_resets_for_the_next_frame() {
        let mut pending = PendingFrame::new();
        pending.append(event(0x08, true, 1.0));
        pending.finalize().unwrap();
        assert!(pending.is_empty());

        pending.append(event(0x30, true, 2.0));
        let frame = pending.finalize().unwrap();
        assert_eq!(frame.bytes, vec![0x30]);
        assert_eq!(frame.span.start_s, 2.0);
    }

    #[test]
    fn byte_count_matches_mode_bit_count() {
        let mut pending = PendingFrame::new();
        for i in 0..5 {
            pending.append(event(i, i == 0, f64::from(i) * 0.001));
        }
        let frame = pending.finalize().unwrap();
        assert_eq!(frame.bytes.len(), frame.mode_bits.len());
    }

    #[test]
    fn gap_threshold_is_1_25_ms() {
        assert!(!gap_exceeded(1.0, 1.0012));
        assert!(gap_exceeded(1.0, 1.0013));
    }
}
