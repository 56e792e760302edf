//! PERI→VMC decoding: frame assembly and response interpretation.
//!
//! # Frame format
//!
//! ```text
//! [<data>...] <chk*>
//! ```
//!
//! In this direction the mode bit marks the *last* byte of a response, so
//! frames terminate explicitly and no idle timeout is involved. The
//! response body is interpreted by its length: the coin changer's SETUP
//! response is always 23 payload bytes, TUBE STATUS always 18, and POLL
//! responses are up to 16 bytes of variable-length activity records.
//! Properly distinguishing same-length responses would require tracking
//! the command that solicited them, which a one-direction tap cannot see.
//!
//! Single-byte 0x00/0xFF frames are the peripheral's ACK/NAK codes and
//! carry no checksum.

use crate::checksum;
use crate::coin::coin_value;
use crate::error::FrameError;
use crate::frame::{PendingFrame, RawFrame};
use crate::{ByteEvent, DecodedEvent, EventCategory, TimeSpan};

/// Acknowledge.
pub const ACK: u8 = 0x00;
/// Negative acknowledge.
pub const NAK: u8 = 0xFF;

/// PERI→VMC frame assembler.
#[derive(Debug, Default)]
pub struct PeriDecoder {
    pending: PendingFrame,
}

impl PeriDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte event; returns the decoded response when the byte
    /// carries the terminator bit.
    pub fn push_byte(&mut self, event: ByteEvent) -> Option<DecodedEvent> {
        self.pending.append(event);
        if event.mode_bit {
            self.pending.finalize().map(|raw| interpret_response(&raw))
        } else {
            None
        }
    }

    /// Finalize and interpret the buffered frame (end of capture).
    pub fn flush(&mut self) -> Option<DecodedEvent> {
        self.pending.finalize().map(|raw| interpret_response(&raw))
    }
}

/// Interpret a finalized PERI→VMC frame.
pub fn interpret_response(raw: &RawFrame) -> DecodedEvent {
    let span = raw.span;

    // Acknowledgement codes bypass checksum and field logic. Any other
    // single byte falls through to the checksum check below.
    if raw.bytes.len() == 1 {
        match raw.bytes[0] {
            ACK => return DecodedEvent::named(EventCategory::PeriVmc, span, "ACK"),
            NAK => return DecodedEvent::named(EventCategory::PeriVmc, span, "NAK"),
            _ => {}
        }
    }

    let check = checksum::verify(&raw.bytes);
    if !check.is_valid() {
        return DecodedEvent::failed(
            EventCategory::PeriVmc,
            span,
            FrameError::InvalidChecksum {
                expected: check.expected,
                actual: check.actual,
            },
        );
    }

    let payload = &raw.bytes[..raw.bytes.len() - 1];
    match payload.len() {
        23 => setup_response(span, payload),
        18 => tube_status(span, payload),
        len if len <= 16 => poll_response(span, payload),
        _ => DecodedEvent::named(EventCategory::PeriVmc, span, "DATA").with_payload(payload),
    }
}

/// 23-byte coin-changer SETUP response.
fn setup_response(span: TimeSpan, payload: &[u8]) -> DecodedEvent {
    let country = u16::from_be_bytes([payload[1], payload[2]]);
    let routing = u16::from_be_bytes([payload[5], payload[6]]);
    DecodedEvent::named(EventCategory::PeriVmc, span, "DATA")
        .with_payload(payload)
        .with_annotation(format!(
            "Feature level: {}; Country code: {country:04X}; Coin Scaling Factor: {}; \
             Decimal places: {}; Coin type routing: {routing:04X}; Coin type credit: {:?}",
            payload[0],
            payload[3],
            payload[4],
            &payload[7..23]
        ))
}

/// 18-byte coin-changer TUBE STATUS response.
fn tube_status(span: TimeSpan, payload: &[u8]) -> DecodedEvent {
    let full = u16::from_be_bytes([payload[0], payload[1]]);
    DecodedEvent::named(EventCategory::PeriVmc, span, "DATA")
        .with_payload(payload)
        .with_annotation(format!(
            "Tube full status: {full:04X}; Tube status: {:?};",
            &payload[2..18]
        ))
}

/// Variable-record POLL response (up to 16 bytes).
///
/// Records are scanned left to right; the high bits of each record's first
/// byte select its shape. A two-byte record truncated at the end of the
/// payload is marked unparsed and the scan advances by a single byte --
/// recovery, not verified resynchronization.
fn poll_response(span: TimeSpan, payload: &[u8]) -> DecodedEvent {
    let mut text = String::new();
    let mut idx = 0;
    while idx < payload.len() {
        let first = payload[idx];
        if first >= 128 {
            // Manual-dispense record: count, coin type, tube level.
            match payload.get(idx + 1) {
                None => {
                    text.push_str(" BYTE NOT PARSED;");
                    idx += 1;
                }
                Some(&in_tube) => {
                    let count = (first & 0b0111_0000) >> 4;
                    let value = coin_value(first & 0x0F);
                    text.push_str(&format!(
                        " Coins dispensed manually: {count} x cointype {} (EUR {value:.2}) = EUR {:.2}, {in_tube} in tube;",
                        first & 0x0F,
                        value * f64::from(count)
                    ));
                    idx += 2;
                }
            }
        } else if first > 64 {
            // Deposit record: routing, coin type, tube level.
            match payload.get(idx + 1) {
                None => {
                    text.push_str(" BYTE NOT PARSED;");
                    idx += 1;
                }
                Some(&in_tube) => {
                    let routing = match (first & 0b0011_0000) >> 4 {
                        0 => "CASH BOX",
                        1 => "TUBES",
                        2 => "NOT USED",
                        _ => "REJECT",
                    };
                    let coin_type = first & 0x0F;
                    text.push_str(&format!(
                        " Coins deposited: routing {routing}, cointype {coin_type} (EUR {:.2}), {in_tube} in tube;",
                        coin_value(coin_type)
                    ));
                    idx += 2;
                }
            }
        } else if first > 32 {
            text.push_str(&format!(" Slugs: {};", first & 0x0F));
            idx += 1;
        } else {
            text.push_str(&format!(" Status: {};", status_name(first)));
            idx += 1;
        }
    }
    DecodedEvent::named(EventCategory::PeriVmc, span, "DATA")
        .with_payload(payload)
        .with_annotation(text)
}

/// Changer status codes reported in POLL responses.
fn status_name(code: u8) -> &'static str {
    match code {
        0x01 => "ESCROW REQUEST",
        0x02 => "CHANGER PAYOUT BUSY",
        0x03 => "NO CREDIT",
        0x04 => "DEFECTIVE TUBE SENSOR",
        0x05 => "DOUBLE ARRIVAL",
        0x06 => "ACCEPTOR UNPLUGGED",
        0x07 => "TUBE JAM",
        0x08 => "ROM CHECKSUM ERROR",
        0x09 => "COIN ROUTING ERROR",
        0x0A => "CHANGER BUSY",
        0x0B => "CHANGER RESET",
        0x0C => "COIN JAM",
        0x0D => "POSSIBLE THEFT",
        _ => "UNKNOWN",
    }
}
