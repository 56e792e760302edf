//! VMC→PERI decoding: frame assembly and command interpretation.
//!
//! # Frame format
//!
//! ```text
//! <addr*> [<data>...] <chk>
//! ```
//!
//! - `addr*`: address byte, mode bit set. High bits select the peripheral
//!   (0x08 coin changer, 0x30 bill validator, 0x10/0x60 cashless), low bits
//!   the command.
//! - `data`: command payload, mode bit clear on every byte.
//! - `chk`: mod-256 sum of all preceding bytes.
//!
//! A frame boundary is only observable one byte late: the assembler learns
//! a command has ended when the *next* address byte arrives, or when the
//! bus stays idle past [`GAP_TIMEOUT_MS`]. Single bytes with the mode bit
//! clear are the VMC's acknowledgement codes (ACK/RET/NAK) echoed into the
//! command stream; they carry no checksum.
//!
//! [`GAP_TIMEOUT_MS`]: crate::frame::GAP_TIMEOUT_MS

use crate::checksum;
use crate::coin::coin_value;
use crate::error::FrameError;
use crate::frame::{self, PendingFrame, RawFrame};
use crate::{ByteEvent, DecodedEvent, EventCategory, TimeSpan};

/// Acknowledge.
pub const ACK: u8 = 0x00;
/// Retransmit request.
pub const RET: u8 = 0xAA;
/// Negative acknowledge.
pub const NAK: u8 = 0xFF;

/// VMC→PERI frame assembler.
///
/// Feed bytes in timestamp order with [`push_byte`]; each call returns the
/// decoded event for the *previous* frame if this byte opened a new one.
///
/// [`push_byte`]: VmcDecoder::push_byte
#[derive(Debug, Default)]
pub struct VmcDecoder {
    pending: PendingFrame,
    last_end_s: Option<f64>,
}

impl VmcDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_byte(&mut self, event: ByteEvent) -> Option<DecodedEvent> {
        let timeout = self
            .last_end_s
            .is_some_and(|prev| frame::gap_exceeded(prev, event.start_s));

        let mut emitted = None;
        if event.mode_bit || timeout {
            emitted = self.pending.finalize().map(|raw| interpret_command(&raw));
        }
        self.pending.append(event);
        self.last_end_s = Some(event.end_s);
        emitted
    }

    /// Finalize and interpret the buffered frame (end of capture).
    pub fn flush(&mut self) -> Option<DecodedEvent> {
        self.pending.finalize().map(|raw| interpret_command(&raw))
    }
}

/// Interpret a finalized VMC→PERI frame.
pub fn interpret_command(raw: &RawFrame) -> DecodedEvent {
    let span = raw.span;

    // Acknowledgement codes bypass mode-bit, checksum and field logic.
    if raw.bytes.len() == 1 && !raw.mode_bits[0] {
        match raw.bytes[0] {
            ACK => return DecodedEvent::named(EventCategory::VmcPeri, span, "ACK"),
            RET => return DecodedEvent::named(EventCategory::VmcPeri, span, "RET"),
            NAK => return DecodedEvent::named(EventCategory::VmcPeri, span, "NAK"),
            _ => {}
        }
    }

    // Only the address byte may carry the mode bit.
    if !raw.mode_bits[0] || raw.mode_bits[1..].contains(&true) {
        return DecodedEvent::failed(EventCategory::VmcPeri, span, FrameError::InvalidModeBit);
    }

    let check = checksum::verify(&raw.bytes);
    if !check.is_valid() {
        return DecodedEvent::failed(
            EventCategory::VmcPeri,
            span,
            FrameError::InvalidChecksum {
                expected: check.expected,
                actual: check.actual,
            },
        );
    }

    let addr = raw.bytes[0];
    // Empty for a lone address byte (reachable when addr is 0x00, which
    // checksums against an empty body).
    let data = raw.bytes.get(1..raw.bytes.len() - 1).unwrap_or(&[]);
    match addr {
        // Coin changer
        0x08 => DecodedEvent::named(EventCategory::VmcCoinChanger, span, "RESET"),
        0x09 => DecodedEvent::named(EventCategory::VmcCoinChanger, span, "SETUP"),
        0x0A => DecodedEvent::named(EventCategory::VmcCoinChanger, span, "TUBE STATUS"),
        0x0B => DecodedEvent::named(EventCategory::VmcCoinChanger, span, "POLL"),
        0x0C => coin_type(span, data),
        0x0D => dispense(span, data),
        0x0F => expansion(span, data),
        // Cashless devices
        0x10 => DecodedEvent::named(EventCategory::VmcCashless1, span, "RESET"),
        0x60 => DecodedEvent::named(EventCategory::VmcCashless2, span, "RESET"),
        // Bill validator
        0x30 => DecodedEvent::named(EventCategory::VmcBillValidator, span, "RESET"),
        0x31 => DecodedEvent::named(EventCategory::VmcBillValidator, span, "SETUP"),
        0x32 => DecodedEvent::named(EventCategory::VmcBillValidator, span, "SECURITY")
            .with_payload(data),
        0x33 => DecodedEvent::named(EventCategory::VmcBillValidator, span, "POLL"),
        0x34 => DecodedEvent::named(EventCategory::VmcBillValidator, span, "BILL TYPE")
            .with_payload(data),
        0x35 => {
            DecodedEvent::named(EventCategory::VmcBillValidator, span, "ESCROW").with_payload(data)
        }
        0x36 => DecodedEvent::named(EventCategory::VmcBillValidator, span, "STACKER"),
        0x37 => DecodedEvent::named(EventCategory::VmcBillValidator, span, "EXPANSION")
            .with_payload(data),
        // Anything else is surfaced raw under its address.
        other => DecodedEvent::named(EventCategory::VmcPeri, span, &format!("0x{other:02X}"))
            .with_payload(data),
    }
}

/// COIN TYPE: two 16-bit big-endian enable masks.
fn coin_type(span: TimeSpan, data: &[u8]) -> DecodedEvent {
    let event = DecodedEvent::named(EventCategory::VmcCoinChanger, span, "COIN TYPE")
        .with_payload(data);
    if data.len() != 4 {
        return event.with_error(FrameError::InvalidPayloadLength {
            command: "COIN TYPE",
        });
    }
    let enable = u16::from_be_bytes([data[0], data[1]]);
    let manual = u16::from_be_bytes([data[2], data[3]]);
    event.with_annotation(format!(
        "coin enable: {enable:04X}; manual dispense enable: {manual:04X}"
    ))
}

/// DISPENSE: high nibble coin count, low nibble coin type.
fn dispense(span: TimeSpan, data: &[u8]) -> DecodedEvent {
    let event =
        DecodedEvent::named(EventCategory::VmcCoinChanger, span, "DISPENSE").with_payload(data);
    if data.len() != 1 {
        return event.with_error(FrameError::InvalidPayloadLength {
            command: "DISPENSE",
        });
    }
    let count = (data[0] & 0xF0) >> 4;
    let value = coin_value(data[0] & 0x0F);
    event.with_annotation(format!(
        "{count} x EUR {value:.2} = EUR {:.2}",
        value * f64::from(count)
    ))
}

/// EXPANSION: first payload byte selects the sub-command.
fn expansion(span: TimeSpan, data: &[u8]) -> DecodedEvent {
    let Some((&sub, rest)) = data.split_first() else {
        return DecodedEvent::named(EventCategory::VmcCoinChanger, span, "EXPANSION")
            .with_error(FrameError::SubcommandMissing);
    };
    let named = |name: &str| DecodedEvent::named(EventCategory::VmcCoinChanger, span, name);
    match sub {
        0x00 => named("EXPANSION: IDENTIFICATION"),
        0x01 => named("EXPANSION: FEATURE ENABLE"),
        0x02 => {
            let event = named("EXPANSION: PAYOUT").with_payload(rest);
            if rest.len() == 1 {
                event.with_annotation(format!("Value: {}", rest[0]))
            } else {
                event.with_error(FrameError::InvalidPayloadLength {
                    command: "EXPANSION: PAYOUT",
                })
            }
        }
        0x03 => named("EXPANSION: PAYOUT STATUS"),
        0x04 => named("EXPANSION: PAYOUT VALUE POOL"),
        0x05 => named("EXPANSION: SEND DIAGNOSTIC STATUS"),
        0x06 => named("EXPANSION: SEND CONTROLLED MANUAL FILL REPORT"),
        0x07 => named("EXPANSION: SEND CONTROLLED MANUAL PAYOUT REPORT"),
        0xFA..=0xFE => named("EXPANSION: FTL"),
        0xFF => named("EXPANSION: DIAGNOSTICS"),
        _ => named("EXPANSION: UNKNOWN"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::sum_mod_256;

    // Builds a byte stream with back-to-back timing: `mode` applies to the
    // first byte, later bytes have it clear.
    fn frame_events(bytes: &[u8], start_s: f64) -> Vec<ByteEvent> {
        bytes
            .iter()
            .enumerate()
            .map(|(i, &byte)| ByteEvent {
                byte,
                mode_bit: i == 0,
                start_s: start_s + i as f64 * 0.0002,
                end_s: start_s + i as f64 * 0.0002 + 0.0001,
            })
            .collect()
    }

    // Appends the checksum byte to a frame body.
    fn with_chk(body: &[u8]) -> Vec<u8> {
        let mut bytes = body.to_vec();
        bytes.push(sum_mod_256(body));
        bytes
    }

    // Feeds a whole command frame and flushes the decoder.
    fn decode_one(bytes: &[u8]) -> DecodedEvent {
        let mut decoder = VmcDecoder::new();
        for event in frame_events(bytes, 1.0) {
            assert!(decoder.push_byte(event).is_none());
        }
        decoder.flush().expect("one frame buffered")
    }

    // ---------------------------------------------------------------
    // Acknowledgement codes
    // ---------------------------------------------------------------

    #[test]
    fn single_byte_acknowledgements() {
        for (byte, name) in [(0x00, "ACK"), (0xAA, "RET"), (0xFF, "NAK")] {
            let mut decoder = VmcDecoder::new();
            assert!(decoder
                .push_byte(ByteEvent {
                    byte,
                    mode_bit: false,
                    start_s: 1.0,
                    end_s: 1.0001,
                })
                .is_none());
            let event = decoder.flush().unwrap();
            assert_eq!(event.name.as_deref(), Some(name));
            assert_eq!(event.category, EventCategory::VmcPeri);
            assert!(event.error.is_none());
        }
    }

    #[test]
    fn single_byte_non_ack_is_a_mode_bit_error() {
        let mut decoder = VmcDecoder::new();
        decoder.push_byte(ByteEvent {
            byte: 0x42,
            mode_bit: false,
            start_s: 1.0,
            end_s: 1.0001,
        });
        let event = decoder.flush().unwrap();
        assert_eq!(event.error.as_deref(), Some("Invalid Mode bit"));
    }

    // ---------------------------------------------------------------
    // Frame boundaries
    // ---------------------------------------------------------------

    #[test]
    fn frame_emitted_when_next_address_byte_arrives() {
        let mut decoder = VmcDecoder::new();
        for event in frame_events(&with_chk(&[0x0B]), 1.0) {
            assert!(decoder.push_byte(event).is_none());
        }
        // The next command's address byte closes the POLL frame.
        let event = decoder
            .push_byte(ByteEvent {
                byte: 0x08,
                mode_bit: true,
                start_s: 1.001,
                end_s: 1.0011,
            })
            .expect("previous frame finalized");
        assert_eq!(event.name.as_deref(), Some("POLL"));
        assert_eq!(event.category, EventCategory::VmcCoinChanger);
    }

    #[test]
    fn bus_idle_gap_finalizes_the_buffered_frame() {
        let mut decoder = VmcDecoder::new();
        for event in frame_events(&with_chk(&[0x0B]), 1.0) {
            assert!(decoder.push_byte(event).is_none());
        }
        // 2 ms of silence, then a data byte without the address marker.
        let event = decoder
            .push_byte(ByteEvent {
                byte: 0x00,
                mode_bit: false,
                start_s: 1.0025,
                end_s: 1.0026,
            })
            .expect("timeout finalized the frame");
        assert_eq!(event.name.as_deref(), Some("POLL"));
    }

    #[test]
    fn gap_under_threshold_keeps_accumulating() {
        let mut decoder = VmcDecoder::new();
        decoder.push_byte(ByteEvent {
            byte: 0x0B,
            mode_bit: true,
            start_s: 1.0,
            end_s: 1.0001,
        });
        // 1 ms gap: same frame.
        assert!(decoder
            .push_byte(ByteEvent {
                byte: 0x0B,
                mode_bit: false,
                start_s: 1.0011,
                end_s: 1.0012,
            })
            .is_none());
        let event = decoder.flush().unwrap();
        assert_eq!(event.name.as_deref(), Some("POLL"));
    }

    #[test]
    fn decoding_is_deterministic_across_instances() {
        let mut stream = Vec::new();
        stream.extend(frame_events(&with_chk(&[0x0A]), 1.0));
        stream.extend(frame_events(&with_chk(&[0x0D, 0x21]), 1.01));
        stream.extend(frame_events(&with_chk(&[0x33]), 1.02));

        let run = |stream: &[ByteEvent]| {
            let mut decoder = VmcDecoder::new();
            let mut out: Vec<DecodedEvent> = stream
                .iter()
                .filter_map(|&event| decoder.push_byte(event))
                .collect();
            out.extend(decoder.flush());
            out
        };
        let first = run(&stream);
        let second = run(&stream);
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    // ---------------------------------------------------------------
    // Validity checks
    // ---------------------------------------------------------------

    #[test]
    fn data_byte_with_address_marker_is_rejected() {
        let mut decoder = VmcDecoder::new();
        let mut events = frame_events(&with_chk(&[0x0C, 0x00, 0x01, 0x00, 0x00]), 1.0);
        events[2].mode_bit = true;
        // The stray marker splits the stream into two frames; both are bad.
        let mut out: Vec<DecodedEvent> =
            events.into_iter().filter_map(|e| decoder.push_byte(e)).collect();
        out.extend(decoder.flush());
        assert_eq!(out.len(), 2);
        assert!(out
            .iter()
            .all(|e| e.error.as_deref() == Some("Invalid Mode bit")
                || e.error.as_deref().is_some_and(|t| t.starts_with("Invalid CHK"))));
    }

    #[test]
    fn checksum_mismatch_stops_interpretation() {
        let event = decode_one(&[0x0B, 0x99]);
        assert_eq!(
            event.error.as_deref(),
            Some("Invalid CHK, expected 11, got 153.")
        );
        assert!(event.name.is_none());
        assert_eq!(event.category, EventCategory::VmcPeri);
    }

    // ---------------------------------------------------------------
    // Coin-changer commands
    // ---------------------------------------------------------------

    #[test]
    fn plain_coin_changer_commands() {
        for (addr, name) in [
            (0x08, "RESET"),
            (0x09, "SETUP"),
            (0x0A, "TUBE STATUS"),
            (0x0B, "POLL"),
        ] {
            let event = decode_one(&with_chk(&[addr]));
            assert_eq!(event.name.as_deref(), Some(name));
            assert_eq!(event.category, EventCategory::VmcCoinChanger);
            assert!(event.error.is_none());
        }
    }

    #[test]
    fn coin_type_decodes_both_masks() {
        let event = decode_one(&with_chk(&[0x0C, 0x00, 0x01, 0x00, 0x00]));
        assert_eq!(event.name.as_deref(), Some("COIN TYPE"));
        assert_eq!(
            event.annotation.as_deref(),
            Some("coin enable: 0001; manual dispense enable: 0000")
        );
        assert_eq!(event.payload.as_deref(), Some(&[0x00, 0x01, 0x00, 0x00][..]));
    }

    #[test]
    fn coin_type_wrong_length_keeps_payload() {
        let event = decode_one(&with_chk(&[0x0C, 0x00, 0x01]));
        assert_eq!(
            event.error.as_deref(),
            Some("invalid VMC data length for COIN TYPE")
        );
        assert_eq!(event.payload.as_deref(), Some(&[0x00, 0x01][..]));
        assert!(event.annotation.is_none());
    }

    #[test]
    fn dispense_renders_count_and_value() {
        // count 2, coin type 1 (EUR 0.02)
        let event = decode_one(&with_chk(&[0x0D, 0x21]));
        assert_eq!(event.name.as_deref(), Some("DISPENSE"));
        assert_eq!(event.annotation.as_deref(), Some("2 x EUR 0.02 = EUR 0.04"));
    }

    #[test]
    fn dispense_reserved_coin_type_is_zero_valued() {
        let event = decode_one(&with_chk(&[0x0D, 0x3A]));
        assert_eq!(event.annotation.as_deref(), Some("3 x EUR 0.00 = EUR 0.00"));
    }

    #[test]
    fn dispense_wrong_length_is_an_error() {
        let event = decode_one(&with_chk(&[0x0D, 0x21, 0x01]));
        assert_eq!(
            event.error.as_deref(),
            Some("invalid VMC data length for DISPENSE")
        );
    }

    // ---------------------------------------------------------------
    // Expansion sub-commands
    // ---------------------------------------------------------------

    #[test]
    fn expansion_subcommand_names() {
        for (sub, name) in [
            (0x00, "EXPANSION: IDENTIFICATION"),
            (0x01, "EXPANSION: FEATURE ENABLE"),
            (0x03, "EXPANSION: PAYOUT STATUS"),
            (0x04, "EXPANSION: PAYOUT VALUE POOL"),
            (0x05, "EXPANSION: SEND DIAGNOSTIC STATUS"),
            (0x06, "EXPANSION: SEND CONTROLLED MANUAL FILL REPORT"),
            (0x07, "EXPANSION: SEND CONTROLLED MANUAL PAYOUT REPORT"),
            (0xFA, "EXPANSION: FTL"),
            (0xFE, "EXPANSION: FTL"),
            (0xFF, "EXPANSION: DIAGNOSTICS"),
            (0x42, "EXPANSION: UNKNOWN"),
        ] {
            let event = decode_one(&with_chk(&[0x0F, sub]));
            assert_eq!(event.name.as_deref(), Some(name), "sub-command {sub:#04X}");
        }
    }

    #[test]
    fn expansion_payout_carries_the_value() {
        let event = decode_one(&with_chk(&[0x0F, 0x02, 0x32]));
        assert_eq!(event.name.as_deref(), Some("EXPANSION: PAYOUT"));
        assert_eq!(event.annotation.as_deref(), Some("Value: 50"));
        assert_eq!(event.payload.as_deref(), Some(&[0x32][..]));
    }

    #[test]
    fn expansion_payout_wrong_length() {
        let event = decode_one(&with_chk(&[0x0F, 0x02, 0x32, 0x01]));
        assert_eq!(
            event.error.as_deref(),
            Some("invalid VMC data length for EXPANSION: PAYOUT")
        );
    }

    #[test]
    fn expansion_without_subcommand() {
        let event = decode_one(&with_chk(&[0x0F]));
        assert_eq!(event.name.as_deref(), Some("EXPANSION"));
        assert_eq!(
            event.error.as_deref(),
            Some("Invalid expansion command: subcommand missing")
        );
    }

    // ---------------------------------------------------------------
    // Other peripherals
    // ---------------------------------------------------------------

    #[test]
    fn cashless_resets() {
        let event = decode_one(&with_chk(&[0x10]));
        assert_eq!(event.category, EventCategory::VmcCashless1);
        assert_eq!(event.name.as_deref(), Some("RESET"));

        let event = decode_one(&with_chk(&[0x60]));
        assert_eq!(event.category, EventCategory::VmcCashless2);
        assert_eq!(event.name.as_deref(), Some("RESET"));
    }

    #[test]
    fn bill_validator_commands() {
        for (addr, name, has_payload) in [
            (0x30, "RESET", false),
            (0x31, "SETUP", false),
            (0x32, "SECURITY", true),
            (0x33, "POLL", false),
            (0x34, "BILL TYPE", true),
            (0x35, "ESCROW", true),
            (0x36, "STACKER", false),
            (0x37, "EXPANSION", true),
        ] {
            let body = if has_payload {
                vec![addr, 0x01, 0x02]
            } else {
                vec![addr]
            };
            let event = decode_one(&with_chk(&body));
            assert_eq!(event.category, EventCategory::VmcBillValidator);
            assert_eq!(event.name.as_deref(), Some(name));
            assert_eq!(event.payload.is_some(), has_payload);
        }
    }

    #[test]
    fn lone_marked_zero_byte_is_an_unknown_address() {
        // Mode bit set, so not an ACK; 0x00 checksums against an empty body.
        let event = decode_one(&[0x00]);
        assert_eq!(event.name.as_deref(), Some("0x00"));
        assert_eq!(event.payload.as_deref(), Some(&[][..]));
        assert!(event.error.is_none());
    }

    #[test]
    fn unknown_address_is_surfaced_as_hex() {
        let event = decode_one(&with_chk(&[0x77, 0x01]));
        assert_eq!(event.category, EventCategory::VmcPeri);
        assert_eq!(event.name.as_deref(), Some("0x77"));
        assert_eq!(event.payload.as_deref(), Some(&[0x01][..]));
    }
}
