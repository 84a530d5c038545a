//! Session loop: one connection, one operator, one suspension point.
//!
//! Each cycle waits for operator input, inbound data, the heartbeat deadline
//! or an interrupt, then handles whatever became ready in a fixed order:
//! operator input, stream input, heartbeat check. Operator sends therefore
//! reset the deadline before the heartbeat check of the same cycle runs.
//!
//! Every I/O fault is terminal. The transport is closed exactly once, on
//! every exit path, before `run` returns.

use std::fmt;
use std::time::Duration;

use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;

use crate::config::Config;
use crate::events::{EventSink, SessionEvent};
use crate::heartbeat::{ControlFilter, HeartbeatClock, SentinelFilter};
use crate::interrupt;
use crate::operator::{OperatorInput, OperatorReady};
use crate::transport::{Operation, Transport, TransportError};

/// Wait bound used when heartbeats are disabled, so a pending terminate
/// signal is still noticed.
pub const IDLE_POLL_DURATION: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Connecting,
    Active,
    ClosedClean,
    ClosedPeer,
    ClosedError,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::ClosedClean | SessionState::ClosedPeer | SessionState::ClosedError
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Active => write!(f, "active"),
            SessionState::ClosedClean => write!(f, "closed_clean"),
            SessionState::ClosedPeer => write!(f, "closed_peer"),
            SessionState::ClosedError => write!(f, "closed_error"),
        }
    }
}

/// Why the loop stopped.
#[derive(Debug)]
pub enum SessionOutcome {
    /// Operator typed the quit keyword.
    OperatorQuit,
    /// Operator input reached EOF.
    InputClosed,
    /// Ctrl+C or a terminate signal.
    Interrupted,
    /// Zero-length read.
    PeerClosed,
    Fault(TransportError),
}

impl SessionOutcome {
    pub fn state(&self) -> SessionState {
        match self {
            SessionOutcome::OperatorQuit
            | SessionOutcome::InputClosed
            | SessionOutcome::Interrupted => SessionState::ClosedClean,
            SessionOutcome::PeerClosed => SessionState::ClosedPeer,
            SessionOutcome::Fault(_) => SessionState::ClosedError,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    /// `None` runs without heartbeats.
    pub heartbeat_interval: Option<Duration>,
    pub heartbeat_sentinel: Vec<u8>,
    pub receive_buffer_size: usize,
    pub quit_keyword: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval(),
            heartbeat_sentinel: config.heartbeat_sentinel.as_bytes().to_vec(),
            receive_buffer_size: config.receive_buffer_size,
            quit_keyword: config.quit_keyword.clone(),
        }
    }
}

/// Sources that became ready in one wait cycle. All empty means only the
/// heartbeat deadline fired.
#[derive(Debug, Default)]
pub struct Readiness {
    pub operator: Option<OperatorReady>,
    pub stream: Option<Result<usize, TransportError>>,
    pub interrupted: bool,
}

/// Trimmed, case-insensitive comparison against the quit keyword.
pub fn is_quit_command(line: &str, quit_keyword: &str) -> bool {
    line.trim().eq_ignore_ascii_case(quit_keyword.trim())
}

pub struct Session<S, F = SentinelFilter> {
    transport: Transport<S>,
    filter: F,
    clock: HeartbeatClock,
    quit_keyword: String,
    buffer: Vec<u8>,
    state: SessionState,
}

impl<S> Session<S, SentinelFilter>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(transport: Transport<S>, options: SessionOptions) -> Self {
        let filter = SentinelFilter::new(options.heartbeat_sentinel.clone());
        Self::with_filter(transport, options, filter)
    }
}

impl<S, F> Session<S, F>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: ControlFilter,
{
    /// Creates a session with a custom control filter.
    ///
    /// The heartbeat clock starts now: the connection has just succeeded.
    pub fn with_filter(transport: Transport<S>, options: SessionOptions, filter: F) -> Self {
        Self {
            transport,
            filter,
            clock: HeartbeatClock::new(options.heartbeat_interval, Instant::now()),
            quit_keyword: options.quit_keyword,
            buffer: vec![0; options.receive_buffer_size.max(1)],
            state: SessionState::Connecting,
        }
    }

    /// Runs the loop to completion and releases the transport.
    pub async fn run<E: EventSink>(
        mut self,
        input: &mut OperatorInput,
        sink: &mut E,
    ) -> SessionOutcome {
        self.transition(SessionState::Active);

        let outcome = loop {
            if interrupt::stop_requested() {
                break SessionOutcome::Interrupted;
            }
            let ready = self.wait_for_readiness(input).await;
            if let Some(outcome) = self.dispatch(ready, sink).await {
                break outcome;
            }
        };

        self.transition(outcome.state());
        self.transport.close().await;
        tracing::info!(state = %self.state, "session ended");
        outcome
    }

    /// Suspends until a source is ready or the heartbeat deadline passes.
    ///
    /// After waking, the other sources are probed without blocking so that
    /// everything ready in this cycle is reported together.
    pub async fn wait_for_readiness(&mut self, input: &mut OperatorInput) -> Readiness {
        let timeout = self
            .clock
            .remaining(Instant::now())
            .unwrap_or(IDLE_POLL_DURATION);
        let mut ready = Readiness::default();
        let Self {
            transport, buffer, ..
        } = self;

        tokio::select! {
            biased;
            () = interrupt::wait_for_interrupt() => {
                ready.interrupted = true;
                return ready;
            }
            line = input.recv() => ready.operator = Some(line),
            read = transport.receive(&mut buffer[..]) => ready.stream = Some(read),
            () = tokio::time::sleep(timeout) => {}
        }

        if ready.operator.is_none() {
            ready.operator = input.try_recv();
        }
        if ready.stream.is_none() {
            ready.stream = transport.receive(&mut buffer[..]).now_or_never();
        }
        ready
    }

    async fn dispatch<E: EventSink>(
        &mut self,
        ready: Readiness,
        sink: &mut E,
    ) -> Option<SessionOutcome> {
        if ready.interrupted {
            return Some(SessionOutcome::Interrupted);
        }
        if let Some(operator) = ready.operator
            && let Some(outcome) = self.handle_operator_input(operator, sink).await
        {
            return Some(outcome);
        }
        if let Some(read) = ready.stream
            && let Some(outcome) = self.handle_stream_input(read, sink)
        {
            return Some(outcome);
        }
        self.maybe_send_heartbeat(Instant::now()).await
    }

    /// Handles one operator line. Returns an outcome when the session ends.
    pub async fn handle_operator_input<E: EventSink>(
        &mut self,
        input: OperatorReady,
        sink: &mut E,
    ) -> Option<SessionOutcome> {
        let line = match input {
            OperatorReady::Line(line) => line,
            OperatorReady::Closed => {
                tracing::debug!("operator input closed");
                return Some(SessionOutcome::InputClosed);
            }
        };

        if is_quit_command(&line, &self.quit_keyword) {
            sink.emit(SessionEvent::Farewell);
            return Some(SessionOutcome::OperatorQuit);
        }
        if line.is_empty() {
            sink.emit(SessionEvent::Skipped);
            return None;
        }

        match self.transport.send(line.as_bytes()).await {
            Ok(()) => {
                self.clock.record_send(Instant::now());
                tracing::debug!(bytes = line.len(), "sent operator message");
                sink.emit(SessionEvent::Sent { text: line });
                None
            }
            Err(err) => {
                tracing::warn!(error = %err, cause = %err.source, "send failed");
                Some(SessionOutcome::Fault(err))
            }
        }
    }

    /// Handles the result of one bounded read.
    pub fn handle_stream_input<E: EventSink>(
        &mut self,
        read: Result<usize, TransportError>,
        sink: &mut E,
    ) -> Option<SessionOutcome> {
        match read {
            Ok(0) => {
                tracing::info!("peer closed the connection");
                sink.emit(SessionEvent::PeerClosed);
                Some(SessionOutcome::PeerClosed)
            }
            Ok(n) => {
                let payload = &self.buffer[..n];
                if self.filter.is_heartbeat(payload) {
                    tracing::trace!("discarded heartbeat from peer");
                    return None;
                }
                sink.emit(SessionEvent::Received {
                    text: String::from_utf8_lossy(payload).into_owned(),
                });
                None
            }
            Err(err) => {
                tracing::warn!(error = %err, cause = %err.source, "receive failed");
                Some(SessionOutcome::Fault(err))
            }
        }
    }

    /// Sends a probe if no outbound traffic happened for a full interval.
    pub async fn maybe_send_heartbeat(&mut self, now: Instant) -> Option<SessionOutcome> {
        if !self.clock.is_due(now) {
            return None;
        }
        match self.transport.send(self.filter.probe()).await {
            Ok(()) => {
                self.clock.record_send(now);
                tracing::debug!("heartbeat sent");
                None
            }
            Err(err) => {
                let err = err.during(Operation::Heartbeat);
                tracing::warn!(error = %err, cause = %err.source, "heartbeat failed");
                Some(SessionOutcome::Fault(err))
            }
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(!self.state.is_terminal(), "terminal state is final");
        tracing::debug!(from = %self.state, to = %next, "session state");
        self.state = next;
    }
}
