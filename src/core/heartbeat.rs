//! Heartbeat controller
//!
//! Drives application-level ping/pong liveness detection over one
//! transport. The controller is pure bookkeeping: the socket task asks it
//! for the next deadline, tells it when the deadline elapsed, feeds it
//! inbound messages and host signals, and acts on the returned decision.
//! It starts when a transport opens and is dropped on any teardown.
//!
//! The ping clock is anchored to outbound activity. After
//! `interval` of send inactivity a ping goes out; the matching pong must
//! arrive within `ping_timeout` or the exchange counts as a miss. Once
//! more than `max_missed_pings` exchanges have missed, the controller
//! asks for the transport to be torn down.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::traits::pong::{PongMatcher, TextPongMatcher};
use crate::traits::transport::Message;

/// Default ping payload
pub const DEFAULT_PING_MESSAGE: &str = "ping";
/// Default pong text recognized by the default matcher
pub const DEFAULT_PONG_MESSAGE: &str = "pong";
/// Default wait for a pong after a ping went out
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_millis(3000);
/// Default number of tolerated consecutive misses
pub const DEFAULT_MAX_MISSED_PINGS: u32 = 1;

/// Heartbeat configuration
///
/// Heartbeat is off unless an interval is configured on the builder.
#[derive(Clone)]
pub struct HeartbeatOptions {
    /// Send inactivity span after which a ping goes out
    pub interval: Duration,
    /// Payload emitted as the ping
    pub ping: Message,
    /// Recognizer for the reciprocal pong
    pub pong: Arc<dyn PongMatcher>,
    /// How long to wait for the pong before counting a miss
    pub ping_timeout: Duration,
    /// Misses tolerated before the transport is torn down
    pub max_missed_pings: u32,
}

impl HeartbeatOptions {
    /// Heartbeat at `interval` with the default ping/pong payloads
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ping: Message::Text(DEFAULT_PING_MESSAGE.to_string()),
            pong: Arc::new(TextPongMatcher::new(DEFAULT_PONG_MESSAGE)),
            ping_timeout: DEFAULT_PING_TIMEOUT,
            max_missed_pings: DEFAULT_MAX_MISSED_PINGS,
        }
    }

    /// Replace the ping payload
    pub fn ping_message(mut self, ping: impl Into<Message>) -> Self {
        self.ping = ping.into();
        self
    }

    /// Replace the pong recognizer
    pub fn pong_matcher(mut self, matcher: impl PongMatcher + 'static) -> Self {
        self.pong = Arc::new(matcher);
        self
    }

    /// Replace the pong wait
    pub fn ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    /// Replace the tolerated miss count
    pub fn max_missed_pings(mut self, count: u32) -> Self {
        self.max_missed_pings = count;
        self
    }
}

impl fmt::Debug for HeartbeatOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeartbeatOptions")
            .field("interval", &self.interval)
            .field("ping", &self.ping)
            .field("ping_timeout", &self.ping_timeout)
            .field("max_missed_pings", &self.max_missed_pings)
            .finish()
    }
}

/// Decision returned when a heartbeat deadline elapses
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum HeartbeatTick {
    /// Send this ping now
    Ping(Message),
    /// A pong went missing but the miss is still tolerated
    Miss {
        /// Consecutive misses so far
        missed: u32,
    },
    /// Too many misses, tear the transport down
    Expire,
}

pub(crate) struct HeartbeatController {
    options: HeartbeatOptions,
    /// When the outstanding ping was sent, if one is in flight
    in_flight: Option<Instant>,
    missed: u32,
    /// Last outbound activity, the anchor for the next ping
    basis: Instant,
}

impl HeartbeatController {
    pub(crate) fn new(options: HeartbeatOptions, now: Instant) -> Self {
        Self { options, in_flight: None, missed: 0, basis: now }
    }

    /// When the socket task has to call [`on_deadline`](Self::on_deadline) next
    pub(crate) fn next_deadline(&self) -> Instant {
        match self.in_flight {
            Some(sent_at) => sent_at + self.options.ping_timeout,
            None => self.basis + self.options.interval,
        }
    }

    /// React to the deadline elapsing
    pub(crate) fn on_deadline(&mut self, now: Instant) -> HeartbeatTick {
        match self.in_flight {
            None => {
                self.in_flight = Some(now);
                HeartbeatTick::Ping(self.options.ping.clone())
            }
            Some(_) => {
                self.in_flight = None;
                self.missed += 1;
                self.basis = now;
                if self.missed > self.options.max_missed_pings {
                    HeartbeatTick::Expire
                } else {
                    HeartbeatTick::Miss { missed: self.missed }
                }
            }
        }
    }

    /// Inspect an inbound message; true when it was the awaited pong and
    /// must not reach message listeners
    pub(crate) fn on_message(&mut self, message: &Message) -> bool {
        if self.options.pong.is_pong(message) {
            self.in_flight = None;
            self.missed = 0;
            true
        } else {
            false
        }
    }

    /// Host signal: probe immediately unless a ping is already in flight
    pub(crate) fn trigger(&mut self, now: Instant) -> Option<Message> {
        if self.in_flight.is_some() {
            return None;
        }
        self.in_flight = Some(now);
        Some(self.options.ping.clone())
    }

    /// Note a successful outbound handoff, deferring the next ping
    pub(crate) fn note_activity(&mut self, now: Instant) {
        self.basis = now;
    }
}
