use std::io::{self, IsTerminal, Stdout, Write};

use tether_core::events::{EventSink, SessionEvent};

const PROMPT: &str = "msg > ";

/// Clears the current terminal line so inbound messages do not land on the prompt.
const CLEAR_LINE: &str = "\r\x1b[2K";

/// Human-readable renderer.
///
/// Prompts and line clearing are only used when writing to a terminal, so
/// piped output stays one message per line.
pub struct TextRenderer<W: Write = Stdout> {
    out: W,
    interactive: bool,
}

impl TextRenderer<Stdout> {
    pub fn stdout() -> Self {
        let interactive = io::stdout().is_terminal();
        Self::new(io::stdout(), interactive)
    }
}

impl<W: Write> TextRenderer<W> {
    pub fn new(out: W, interactive: bool) -> Self {
        Self { out, interactive }
    }

    fn write_event(&mut self, event: &SessionEvent) -> io::Result<()> {
        match event {
            SessionEvent::Connected { peer, quit_keyword } => {
                writeln!(
                    self.out,
                    "Connected to server({peer}). Type '{quit_keyword}' to quit."
                )?;
                self.prompt()?;
            }
            SessionEvent::Sent { text } => {
                writeln!(self.out, "Sent: {text}")?;
                self.prompt()?;
            }
            SessionEvent::Received { text } => {
                if self.interactive {
                    write!(self.out, "{CLEAR_LINE}")?;
                }
                writeln!(self.out, "Received: {text}")?;
                self.prompt()?;
            }
            SessionEvent::Skipped => self.prompt()?,
            SessionEvent::Farewell => writeln!(self.out, "bye")?,
            SessionEvent::PeerClosed => {
                if self.interactive {
                    write!(self.out, "{CLEAR_LINE}")?;
                }
                writeln!(self.out, "Connection closed by server.")?;
            }
        }
        self.out.flush()
    }

    fn prompt(&mut self) -> io::Result<()> {
        if self.interactive {
            write!(self.out, "{PROMPT}")?;
        }
        Ok(())
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> EventSink for TextRenderer<W> {
    fn emit(&mut self, event: SessionEvent) {
        if let Err(err) = self.write_event(&event) {
            tracing::warn!(error = %err, "failed to write to stdout");
        }
    }
}
