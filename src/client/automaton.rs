//! Client connection state machine
//!
//! Pure transition logic with no I/O: feed it [`Event`]s, carry out the
//! [`Action`]s it returns. The driver in [`crate::client`] owns the socket
//! and the timer.
//!
//! ```text
//! DISCONNECTED --connect--> CONNECTING --opened--> OPEN
//!      ^                       |   ^                 |
//!      |  (attempts used up)   |   | timer           | closed
//!      +-------closed----------+   |                 v
//!                              RECONNECT_WAIT <------+
//! ```

use std::time::Duration;

use crate::client::backoff::Backoff;
use crate::config::ClientConfig;

/// Connection state of a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    ReconnectWait,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::ReconnectWait => write!(f, "reconnect_wait"),
        }
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// `connect()` called, explicitly or implicitly by `send`
    Connect,
    /// Transport handshake succeeded
    Opened,
    /// Transport failed to open, closed, or errored
    Closed,
    /// The pending reconnect timer fired
    TimerFired,
    /// `disconnect()` called
    Disconnect,
}

/// Side effects requested by a transition, in execution order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    OpenTransport,
    CloseTransport,
    FlushQueue,
    /// Replace any pending timer with one firing after `delay`
    ScheduleReconnect { attempt: u32, delay: Duration },
    CancelTimer,
    /// Attempts exhausted; no timer is scheduled
    GiveUp,
}

#[derive(Debug, Clone)]
pub struct Automaton {
    state: ConnectionState,
    attempts: u32,
    max_attempts: u32,
    backoff: Backoff,
    timer_pending: bool,
}

impl Automaton {
    pub fn new(backoff: Backoff, max_attempts: u32) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempts: 0,
            max_attempts,
            backoff,
            timer_pending: false,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(Backoff::from_config(config), config.max_attempts)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive failures since the last successful open
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn has_pending_timer(&self) -> bool {
        self.timer_pending
    }

    /// Apply one event and return the actions to perform
    pub fn handle(&mut self, event: Event) -> Vec<Action> {
        use ConnectionState::*;

        match (self.state, event) {
            (Disconnected, Event::Connect) => {
                self.state = Connecting;
                vec![Action::OpenTransport]
            }
            (ReconnectWait, Event::Connect) => {
                // Manual connect skips the remaining wait
                self.timer_pending = false;
                self.state = Connecting;
                vec![Action::CancelTimer, Action::OpenTransport]
            }
            (Connecting | Open, Event::Connect) => Vec::new(),

            (Connecting, Event::Opened) => {
                self.attempts = 0;
                self.state = Open;
                vec![Action::FlushQueue]
            }
            // Late open after a disconnect: throw the transport away
            (_, Event::Opened) => vec![Action::CloseTransport],

            (Connecting | Open, Event::Closed) => self.schedule_reconnect(),
            (_, Event::Closed) => Vec::new(),

            (ReconnectWait, Event::TimerFired) => {
                self.timer_pending = false;
                self.state = Connecting;
                vec![Action::OpenTransport]
            }
            (_, Event::TimerFired) => Vec::new(),

            (state, Event::Disconnect) => {
                let mut actions = Vec::new();
                if self.timer_pending {
                    self.timer_pending = false;
                    actions.push(Action::CancelTimer);
                }
                if matches!(state, Connecting | Open) {
                    actions.push(Action::CloseTransport);
                }
                self.state = Disconnected;
                actions
            }
        }
    }

    fn schedule_reconnect(&mut self) -> Vec<Action> {
        if self.attempts >= self.max_attempts {
            self.timer_pending = false;
            self.state = ConnectionState::Disconnected;
            return vec![Action::GiveUp];
        }

        self.attempts += 1;
        self.timer_pending = true;
        self.state = ConnectionState::ReconnectWait;
        vec![Action::ScheduleReconnect {
            attempt: self.attempts,
            delay: self.backoff.delay(self.attempts),
        }]
    }
}
