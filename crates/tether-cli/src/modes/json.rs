use std::io::{self, Stdout, Write};

use tether_core::events::{EventSink, SessionEvent};

/// Writes each event as a single JSON line.
pub struct JsonRenderer<W: Write = Stdout> {
    out: W,
}

impl JsonRenderer<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> JsonRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> EventSink for JsonRenderer<W> {
    fn emit(&mut self, event: SessionEvent) {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize event");
                return;
            }
        };
        if let Err(err) = writeln!(self.out, "{line}").and_then(|()| self.out.flush()) {
            tracing::warn!(error = %err, "failed to write to stdout");
        }
    }
}
