//! Decoded-event trace buffer.
//!
//! Accumulates [`DecodedEvent`]s for a bus-observation session and renders
//! them as one text line per event. Bounded: beyond `max_entries` the
//! oldest entries are dropped.

use mdbscope_decode::{DecodedEvent, EventCategory};

pub struct TraceStore {
    entries: Vec<DecodedEvent>,
    max_entries: usize,
    filter_commands: bool,
    filter_responses: bool,
}

impl TraceStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_entries,
            filter_commands: true,
            filter_responses: true,
        }
    }

    /// Select which directions `to_text` renders.
    pub fn set_filter(&mut self, show_commands: bool, show_responses: bool) {
        self.filter_commands = show_commands;
        self.filter_responses = show_responses;
    }

    pub fn push(&mut self, event: DecodedEvent) {
        self.entries.push(event);
        if self.entries.len() > self.max_entries {
            self.entries.remove(0);
        }
    }

    pub fn entries(&self) -> &[DecodedEvent] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Render the (filtered) trace, one line per event:
    ///
    /// ```text
    /// [  0.001700] VMC->CC COIN TYPE [00 01 00 00] coin enable: 0001; ...
    /// [  0.009100] PERI->VMC ! Invalid CHK, expected 3, got 153.
    /// ```
    pub fn to_text(&self, show_timestamp: bool) -> String {
        let mut result = String::new();
        for event in &self.entries {
            let is_response = event.category == EventCategory::PeriVmc;
            if (is_response && !self.filter_responses) || (!is_response && !self.filter_commands) {
                continue;
            }

            if show_timestamp {
                result.push_str(&format!("[{:10.6}] ", event.span.start_s));
            }
            result.push_str(event.category.label());
            if let Some(name) = &event.name {
                result.push(' ');
                result.push_str(name);
            }
            if let Some(payload) = &event.payload {
                result.push_str(" [");
                for (i, byte) in payload.iter().enumerate() {
                    if i > 0 {
                        result.push(' ');
                    }
                    result.push_str(&format!("{byte:02X}"));
                }
                result.push(']');
            }
            if let Some(text) = &event.annotation {
                result.push(' ');
                result.push_str(text.trim());
            }
            if let Some(error) = &event.error {
                result.push_str(" ! ");
                result.push_str(error);
            }
            result.push('\n');
        }
        result
    }
}
