//! Capture-file input.
//!
//! Stand-in for the acquisition side of the bus tap: a line-oriented text
//! format with one 9-bit byte event per line, as exported from a logic
//! analyzer's low-level serial decode:
//!
//! ```text
//! start_s,end_s,data,mode
//! 0.000000,0.000800,0x0B,1
//! 0.000900,0.001700,0x0B,0
//! ```
//!
//! `data` is hex (`0x` prefix) or decimal; `mode` is the 9th bit, `0` or
//! `1`. A header line is skipped; anything else malformed fails the load
//! with the offending line number.

use std::fs;
use std::path::Path;

use mdbscope_decode::ByteEvent;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

/// Load a capture file into a byte-event sequence.
pub fn read_capture(path: &Path) -> Result<Vec<ByteEvent>, CaptureError> {
    let text = fs::read_to_string(path)?;
    parse_capture(&text)
}

/// Parse capture text into a byte-event sequence.
pub fn parse_capture(text: &str) -> Result<Vec<ByteEvent>, CaptureError> {
    let mut events: Vec<ByteEvent> = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        let fields: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        if fields.len() != 4 {
            return Err(CaptureError::Malformed {
                line,
                reason: format!("expected 4 fields, got {}", fields.len()),
            });
        }
        let start_s = match fields[0].parse::<f64>() {
            Ok(value) => value,
            Err(_) if idx == 0 => {
                log::debug!("skipping header line: {trimmed}");
                continue;
            }
            Err(e) => {
                return Err(CaptureError::Malformed {
                    line,
                    reason: format!("bad start time {:?}: {e}", fields[0]),
                })
            }
        };
        let end_s = fields[1].parse::<f64>().map_err(|e| CaptureError::Malformed {
            line,
            reason: format!("bad end time {:?}: {e}", fields[1]),
        })?;
        let byte = parse_byte(fields[2]).map_err(|reason| CaptureError::Malformed { line, reason })?;
        let mode_bit = match fields[3] {
            "0" | "false" => false,
            "1" | "true" => true,
            other => {
                return Err(CaptureError::Malformed {
                    line,
                    reason: format!("bad mode bit {other:?}"),
                })
            }
        };
        if let Some(prev) = events.last() {
            if start_s < prev.start_s {
                log::warn!("line {line}: timestamp goes backwards ({start_s} < {})", prev.start_s);
            }
        }
        events.push(ByteEvent {
            byte,
            mode_bit,
            start_s,
            end_s,
        });
    }
    Ok(events)
}

fn parse_byte(field: &str) -> Result<u8, String> {
    let parsed = match field.strip_prefix("0x").or_else(|| field.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => field.parse::<u8>(),
    };
    parsed.map_err(|e| format!("bad data byte {field:?}: {e}"))
}
