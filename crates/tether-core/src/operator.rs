//! Operator input as a readiness source.
//!
//! Lines are produced by a dedicated reader thread and delivered over a
//! bounded channel, so the session can wait on them alongside the socket.

use std::io::BufRead;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

/// Lines buffered between the reader thread and the session.
const INPUT_CHANNEL_CAPACITY: usize = 32;

/// One readiness result from the operator source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorReady {
    Line(String),
    /// The input stream ended (EOF or reader gone).
    Closed,
}

/// Receiving end of the operator line channel.
#[derive(Debug)]
pub struct OperatorInput {
    rx: mpsc::Receiver<String>,
}

impl OperatorInput {
    pub fn new(rx: mpsc::Receiver<String>) -> Self {
        Self { rx }
    }

    /// Creates a connected sender/input pair.
    pub fn channel() -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
        (tx, Self::new(rx))
    }

    /// Spawns a thread that reads stdin line by line.
    ///
    /// A plain thread is used instead of `tokio::io::stdin` because a pending
    /// stdin read on the blocking pool would hold up runtime shutdown.
    pub fn stdin() -> std::io::Result<Self> {
        let (tx, input) = Self::channel();
        std::thread::Builder::new()
            .name("tether-stdin".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let mut line = match line {
                        Ok(line) => line,
                        Err(err) => {
                            tracing::warn!(error = %err, "stdin read failed");
                            break;
                        }
                    };
                    if line.ends_with('\r') {
                        line.pop();
                    }
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                tracing::debug!("stdin reader finished");
            })?;
        Ok(input)
    }

    /// Waits for the next line.
    ///
    /// Cancel-safe, so it can be one arm of a `select!`.
    pub async fn recv(&mut self) -> OperatorReady {
        self.rx
            .recv()
            .await
            .map_or(OperatorReady::Closed, OperatorReady::Line)
    }

    /// Returns a line only if one is already waiting.
    pub fn try_recv(&mut self) -> Option<OperatorReady> {
        match self.rx.try_recv() {
            Ok(line) => Some(OperatorReady::Line(line)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(OperatorReady::Closed),
        }
    }
}
