//! Byte-stream transport owned by the session.
//!
//! `connect` opens a TCP stream; `Transport` wraps any async stream and
//! classifies I/O faults into the categories the session reports.

use std::fmt;
use std::io;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// Which side of the stream failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Send,
    Receive,
    /// Sending a heartbeat probe
    Heartbeat,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Send => write!(f, "send"),
            Operation::Receive => write!(f, "receive"),
            Operation::Heartbeat => write!(f, "heartbeat"),
        }
    }
}

/// Categories of transport faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Peer reset or aborted the connection
    Reset,
    /// Write to a connection the peer already closed
    BrokenPipe,
    /// Any other socket error
    Other,
}

impl FaultKind {
    pub fn classify(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => FaultKind::Reset,
            io::ErrorKind::BrokenPipe => FaultKind::BrokenPipe,
            _ => FaultKind::Other,
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::Reset => write!(f, "reset"),
            FaultKind::BrokenPipe => write!(f, "broken_pipe"),
            FaultKind::Other => write!(f, "other"),
        }
    }
}

/// A send or receive failure. Always terminal for the session.
#[derive(Debug)]
pub struct TransportError {
    pub op: Operation,
    pub kind: FaultKind,
    pub source: io::Error,
}

impl TransportError {
    pub fn new(op: Operation, source: io::Error) -> Self {
        Self {
            op,
            kind: FaultKind::classify(&source),
            source,
        }
    }

    /// Relabels the failed operation, keeping the classification.
    #[must_use]
    pub fn during(mut self, op: Operation) -> Self {
        self.op = op;
        self
    }

    fn closed(op: Operation) -> Self {
        Self::new(
            op,
            io::Error::new(io::ErrorKind::NotConnected, "transport already closed"),
        )
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FaultKind::Reset | FaultKind::BrokenPipe => {
                write!(f, "Connection to server was forcibly closed ({})", self.op)
            }
            FaultKind::Other => write!(f, "Socket error during {}", self.op),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// The connection could not be established.
#[derive(Debug)]
pub struct ConnectError {
    pub addr: String,
    pub source: io::Error,
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cannot connect to server {}", self.addr)
    }
}

impl std::error::Error for ConnectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Opens a TCP connection to `host:port`, bounded by `timeout` when set.
pub async fn connect(
    host: &str,
    port: u16,
    timeout: Option<Duration>,
) -> Result<Transport<TcpStream>, ConnectError> {
    let addr = format!("{host}:{port}");
    tracing::debug!(%addr, ?timeout, "connecting");

    let attempt = TcpStream::connect((host, port));
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, attempt).await {
            Ok(result) => result,
            Err(_elapsed) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("timed out after {}s", limit.as_secs_f64()),
            )),
        },
        None => attempt.await,
    };

    match result {
        Ok(stream) => {
            if let Err(err) = stream.set_nodelay(true) {
                tracing::debug!(error = %err, "failed to set TCP_NODELAY");
            }
            tracing::info!(%addr, "connected");
            Ok(Transport::new(stream))
        }
        Err(source) => Err(ConnectError { addr, source }),
    }
}

/// Exclusively owned connected stream.
#[derive(Debug)]
pub struct Transport<S> {
    stream: S,
    closed: bool,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    /// Writes the whole payload and flushes it.
    pub async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::closed(Operation::Send));
        }
        self.stream
            .write_all(bytes)
            .await
            .map_err(|e| TransportError::new(Operation::Send, e))?;
        self.stream
            .flush()
            .await
            .map_err(|e| TransportError::new(Operation::Send, e))
    }

    /// Reads at most `buf.len()` bytes. `Ok(0)` means the peer closed the stream.
    ///
    /// Cancel-safe: dropping the future before completion loses no data.
    pub async fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if self.closed {
            return Err(TransportError::closed(Operation::Receive));
        }
        self.stream
            .read(buf)
            .await
            .map_err(|e| TransportError::new(Operation::Receive, e))
    }

    /// Shuts the stream down. Safe to call more than once.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(err) = self.stream.shutdown().await {
            tracing::debug!(error = %err, "shutdown after close");
        }
    }
}
