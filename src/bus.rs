//! Typed signals emitted by the line parser.
//!
//! The parser never calls consumers directly. It emits [`Signal`]s into a
//! [`SignalSink`], usually an [`EventBus`]. The bus delivers each signal
//! synchronously to its observers in subscription order and keeps it in a
//! pending queue that the owning session drains after every parsed line.

use std::{collections::VecDeque, fmt};

use chrono::{DateTime, Utc};

use crate::event::NormalizedEvent;

/// Signals produced while parsing inbound lines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Signal {
    /// The backend asked for a heartbeat reply.
    HeartbeatRequest {
        /// Token to echo back.
        token: String,
        /// Time the request was parsed.
        at: DateTime<Utc>,
    },
    /// The backend answered one of our heartbeats.
    HeartbeatResponse {
        /// Token from the original request.
        token: String,
        /// Time the response was parsed.
        at: DateTime<Utc>,
    },
    /// The backend confirmed the connection handshake.
    Registered {
        /// Nick the backend registered us under.
        nick: String,
    },
    /// A translated event.
    Incoming(NormalizedEvent),
    /// A translated protocol-level error.
    Error(NormalizedEvent),
    /// A line the parser does not translate.
    Unrecognized(String),
}

impl Signal {
    /// Short topic name used in log fields.
    #[must_use]
    pub const fn topic(&self) -> &'static str {
        match self {
            Self::HeartbeatRequest { .. } => "heartbeat-request",
            Self::HeartbeatResponse { .. } => "heartbeat-response",
            Self::Registered { .. } => "registered",
            Self::Incoming(_) => "incoming",
            Self::Error(_) => "error",
            Self::Unrecognized(_) => "unrecognized",
        }
    }
}

/// Destination for parser output.
pub trait SignalSink {
    /// Accept one signal.
    fn emit(&mut self, signal: Signal);
}

impl SignalSink for Vec<Signal> {
    fn emit(&mut self, signal: Signal) { self.push(signal); }
}

type Observer = Box<dyn FnMut(&Signal) + Send + 'static>;

/// Synchronous publish/subscribe hub for parser signals.
#[derive(Default)]
pub struct EventBus {
    observers: Vec<Observer>,
    pending: VecDeque<Signal>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observers.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl EventBus {
    /// Create a bus without observers.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register an observer called for every signal, after any observers
    /// registered earlier.
    pub fn subscribe<F>(&mut self, observer: F)
    where
        F: FnMut(&Signal) + Send + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    /// Remove and return every signal emitted since the last drain.
    pub fn drain(&mut self) -> impl Iterator<Item = Signal> + '_ { self.pending.drain(..) }

    /// Number of signals waiting to be drained.
    #[must_use]
    pub fn pending(&self) -> usize { self.pending.len() }
}

impl SignalSink for EventBus {
    fn emit(&mut self, signal: Signal) {
        for observer in &mut self.observers {
            observer(&signal);
        }
        self.pending.push_back(signal);
    }
}
