// mdbscope -- replay an MDB bus capture and print the decoded trace.
//
// Usage:
//   mdbscope capture.csv
//   mdbscope capture.csv --direction peri-vmc
//   mdbscope capture.csv --json
//
// The capture is a text file with one 9-bit byte event per line
// (`start_s,end_s,data,mode`), as exported from a logic analyzer. One run
// decodes one direction of the bus; decode a two-sided capture by running
// once per direction.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use mdbscope_core::{read_capture, TraceStore};
use mdbscope_decode::{BusDecoder, DecodedEvent, Direction};

#[derive(Parser)]
#[command(name = "mdbscope", version, about = "Decode a captured MDB bus trace")]
struct Cli {
    /// Capture file, one `start_s,end_s,data,mode` line per bus byte.
    capture: PathBuf,

    /// Which side of the bus the capture was taken from.
    #[arg(short, long, value_enum, default_value = "vmc-peri")]
    direction: DirectionArg,

    /// Emit one JSON object per decoded event instead of trace text.
    #[arg(long)]
    json: bool,

    /// Omit the timestamp column from the trace text.
    #[arg(long)]
    no_timestamps: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectionArg {
    /// Controller to peripherals.
    VmcPeri,
    /// Peripherals to controller.
    PeriVmc,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::VmcPeri => Direction::VmcToPeri,
            DirectionArg::PeriVmc => Direction::PeriToVmc,
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let events = read_capture(&cli.capture)
        .with_context(|| format!("loading capture {}", cli.capture.display()))?;
    log::info!("loaded {} byte events", events.len());

    let mut decoder = BusDecoder::new(cli.direction.into());
    let mut decoded = Vec::new();
    for event in events {
        if let Some(frame) = decoder.push_byte(event) {
            decoded.push(frame);
        }
    }
    // The last frame has no following byte to close it.
    decoded.extend(decoder.flush());
    log::info!("decoded {} frames", decoded.len());

    if cli.json {
        for event in &decoded {
            println!("{}", serde_json::to_string(&json_line(event))?);
        }
    } else {
        let mut store = TraceStore::new(decoded.len().max(1));
        for event in decoded {
            store.push(event);
        }
        print!("{}", store.to_text(!cli.no_timestamps));
    }
    Ok(())
}

/// One JSON object per event, payload rendered as a hex string.
fn json_line(event: &DecodedEvent) -> serde_json::Value {
    serde_json::json!({
        "category": event.category.label(),
        "start_s": event.span.start_s,
        "end_s": event.span.end_s,
        "name": event.name,
        "payload": event.payload.as_deref().map(hex::encode_upper),
        "annotation": event.annotation,
        "error": event.error,
    })
}
