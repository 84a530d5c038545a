//! Session event types for the operator display.
//!
//! Events are serializable so the CLI can emit them as JSON lines.
//! Heartbeat traffic in either direction never produces an event.

use serde::{Deserialize, Serialize};

/// Events emitted by the session for the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Connection established, session about to start.
    Connected { peer: String, quit_keyword: String },

    /// An operator line was delivered to the peer.
    Sent { text: String },

    /// The peer sent a non-heartbeat payload.
    Received { text: String },

    /// The operator entered a blank line; nothing was sent.
    Skipped,

    /// The operator asked to quit.
    Farewell,

    /// The peer closed the stream.
    PeerClosed,
}

/// Receives session events in the order they happen.
pub trait EventSink {
    fn emit(&mut self, event: SessionEvent);
}

impl<T: EventSink + ?Sized> EventSink for Box<T> {
    fn emit(&mut self, event: SessionEvent) {
        (**self).emit(event);
    }
}

impl EventSink for Vec<SessionEvent> {
    fn emit(&mut self, event: SessionEvent) {
        self.push(event);
    }
}
