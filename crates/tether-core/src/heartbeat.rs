//! Heartbeat cadence and in-band control detection.
//!
//! The clock tracks the last outbound send; any send (user message or probe)
//! pushes the next heartbeat out by a full interval. Inbound traffic never
//! touches the clock.

use std::time::Duration;

use tokio::time::Instant;

/// Tracks when the next heartbeat probe is due.
#[derive(Debug, Clone)]
pub struct HeartbeatClock {
    interval: Option<Duration>,
    last_sent: Instant,
}

impl HeartbeatClock {
    /// Creates a clock whose first probe is due one interval after `now`.
    ///
    /// `None` disables heartbeats: nothing is ever due and there is no deadline.
    pub fn new(interval: Option<Duration>, now: Instant) -> Self {
        Self {
            interval,
            last_sent: now,
        }
    }

    /// Time left until the next probe, clamped at zero.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        let interval = self.interval?;
        Some(interval.saturating_sub(now.saturating_duration_since(self.last_sent)))
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.interval
            .is_some_and(|interval| now.saturating_duration_since(self.last_sent) >= interval)
    }

    /// Records an outbound send, restarting the interval.
    pub fn record_send(&mut self, now: Instant) {
        self.last_sent = now;
    }
}

/// Separates heartbeat probes from payload on a shared channel.
///
/// The session only talks to this trait, so a different framing (a control
/// byte, length-prefixed frames) can replace the sentinel comparison.
pub trait ControlFilter {
    /// Bytes written to the peer as a heartbeat probe.
    fn probe(&self) -> &[u8];

    /// Returns true when an inbound payload is a heartbeat and must not be shown.
    fn is_heartbeat(&self, payload: &[u8]) -> bool;
}

/// Reserved byte string compared by exact equality.
///
/// A legitimate message equal to the sentinel is indistinguishable from a
/// probe and is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelFilter {
    sentinel: Vec<u8>,
}

impl SentinelFilter {
    pub fn new(sentinel: impl Into<Vec<u8>>) -> Self {
        Self {
            sentinel: sentinel.into(),
        }
    }
}

impl ControlFilter for SentinelFilter {
    fn probe(&self) -> &[u8] {
        &self.sentinel
    }

    fn is_heartbeat(&self, payload: &[u8]) -> bool {
        payload == self.sentinel.as_slice()
    }
}
