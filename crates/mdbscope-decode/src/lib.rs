//! MDB (Multi-Drop Bus) traffic decoding.
//!
//! MDB is the master/peripheral serial bus used by vending-machine
//! controllers. Every byte on the wire carries 9 bits: 8 data bits plus a
//! mode bit whose meaning depends on the direction of travel:
//!
//! - **VMC→PERI** (controller to peripheral): the mode bit marks an
//!   *address* byte, i.e. the first byte of a new command. A frame is also
//!   ended implicitly when the bus goes idle for more than
//!   [`frame::GAP_TIMEOUT_MS`].
//! - **PERI→VMC** (peripheral to controller): the mode bit marks the *last*
//!   byte of a response. Termination is always explicit.
//!
//! Every multi-byte frame ends in a checksum byte equal to the mod-256 sum
//! of the preceding bytes. Single-byte acknowledgement codes (ACK/RET/NAK)
//! carry no checksum.
//!
//! The decoders here are fed one [`ByteEvent`] at a time, in timestamp
//! order, by whatever captured the bus (a logic-analyzer export, a tap,
//! ...). Each call returns at most one [`DecodedEvent`]. A decoder instance
//! observes exactly one direction, chosen at construction via
//! [`BusDecoder::new`]; observing both sides of a bus takes two instances.

pub mod checksum;
pub mod coin;
pub mod error;
pub mod frame;
pub mod peri;
pub mod vmc;

pub use error::FrameError;
pub use peri::PeriDecoder;
pub use vmc::VmcDecoder;

use serde::Serialize;

/// Which side of the bus a decoder instance observes.
///
/// Static configuration: the direction is fixed for the lifetime of the
/// decoder, never inferred from traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    /// Controller (bus master) to peripherals.
    VmcToPeri,
    /// Peripherals to controller.
    PeriToVmc,
}

/// Start/end of a byte or frame on the capture clock, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeSpan {
    pub start_s: f64,
    pub end_s: f64,
}

/// One received bus byte: 8 data bits, the 9th mode bit, and its timing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ByteEvent {
    pub byte: u8,
    pub mode_bit: bool,
    pub start_s: f64,
    pub end_s: f64,
}

/// Direction/device-class label attached to every decoded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventCategory {
    /// Controller to peripheral, generic (ACK/RET/NAK, unknown addresses,
    /// malformed frames).
    VmcPeri,
    /// Controller to coin changer.
    VmcCoinChanger,
    /// Controller to bill validator.
    VmcBillValidator,
    /// Controller to cashless device 1.
    VmcCashless1,
    /// Controller to cashless device 2.
    VmcCashless2,
    /// Peripheral to controller.
    PeriVmc,
}

impl EventCategory {
    pub fn label(&self) -> &'static str {
        match self {
            EventCategory::VmcPeri => "VMC->PERI",
            EventCategory::VmcCoinChanger => "VMC->CC",
            EventCategory::VmcBillValidator => "VMC->BV",
            EventCategory::VmcCashless1 => "VMC->CD1",
            EventCategory::VmcCashless2 => "VMC->CD2",
            EventCategory::PeriVmc => "PERI->VMC",
        }
    }
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One decoded protocol event, produced per finalized frame.
///
/// All fields beyond the category and time span are optional: a clean
/// command carries a `name`, data-bearing commands also a `payload` and
/// possibly an `annotation`, and malformed frames an `error` alongside
/// whatever was already determined.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedEvent {
    pub category: EventCategory,
    pub span: TimeSpan,
    /// Command or response name, e.g. `"POLL"` or `"DATA"`.
    pub name: Option<String>,
    /// Raw sub-payload bytes (command data without address/checksum).
    pub payload: Option<Vec<u8>>,
    /// Human-readable rendering of the payload.
    pub annotation: Option<String>,
    /// Error description; decoding always continues with the next frame.
    pub error: Option<String>,
}

impl DecodedEvent {
    /// Event with just a name, no payload.
    pub fn named(category: EventCategory, span: TimeSpan, name: &str) -> Self {
        Self {
            category,
            span,
            name: Some(name.to_string()),
            payload: None,
            annotation: None,
            error: None,
        }
    }

    /// Error-only event (no command name could be determined).
    pub fn failed(category: EventCategory, span: TimeSpan, error: FrameError) -> Self {
        Self {
            category,
            span,
            name: None,
            payload: None,
            annotation: None,
            error: Some(error.to_string()),
        }
    }

    pub fn with_payload(mut self, payload: &[u8]) -> Self {
        self.payload = Some(payload.to_vec());
        self
    }

    pub fn with_annotation(mut self, annotation: String) -> Self {
        self.annotation = Some(annotation);
        self
    }

    pub fn with_error(mut self, error: FrameError) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Direction-selected bus decoder.
///
/// Thin enum over the two per-direction state machines so callers can pick
/// the pipeline with a [`Direction`] value at construction time.
#[derive(Debug)]
pub enum BusDecoder {
    Vmc(VmcDecoder),
    Peri(PeriDecoder),
}

impl BusDecoder {
    pub fn new(direction: Direction) -> Self {
        match direction {
            Direction::VmcToPeri => BusDecoder::Vmc(VmcDecoder::new()),
            Direction::PeriToVmc => BusDecoder::Peri(PeriDecoder::new()),
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            BusDecoder::Vmc(_) => Direction::VmcToPeri,
            BusDecoder::Peri(_) => Direction::PeriToVmc,
        }
    }

    /// Feed one byte event; returns the previously buffered frame's decoded
    /// event if this byte closed it.
    pub fn push_byte(&mut self, event: ByteEvent) -> Option<DecodedEvent> {
        match self {
            BusDecoder::Vmc(decoder) => decoder.push_byte(event),
            BusDecoder::Peri(decoder) => decoder.push_byte(event),
        }
    }

    /// Finalize and interpret whatever is still buffered (end of capture).
    pub fn flush(&mut self) -> Option<DecodedEvent> {
        match self {
            BusDecoder::Vmc(decoder) => decoder.flush(),
            BusDecoder::Peri(decoder) => decoder.flush(),
        }
    }
}
