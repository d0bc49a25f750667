#![doc(html_root_url = "https://docs.rs/chatgate/latest")]
//! Public API for the `chatgate` library.
//!
//! This crate implements the chat-protocol session engine of a protocol
//! gateway. Inbound protocol lines are translated into normalized activity
//! events, and client actions are issued over the same connection and
//! correlated with their completions without any native request identifier.
//!
//! The main entry points are [`session::Session`], which owns one connection
//! per identity, and [`registry::SessionRegistry`], which shares sessions
//! between clients acting as the same identity.

pub mod activity;
pub mod bus;
pub mod codec;
pub mod command;
pub mod config;
pub mod credentials;
pub mod event;
pub mod metrics;
pub mod panic;
pub mod parser;
pub mod registry;
pub mod role;
pub mod session;

pub use activity::{Activity, ActivityError};
pub use bus::{EventBus, Signal, SignalSink};
pub use codec::{CodecError, LineCodec};
pub use config::SessionConfig;
pub use credentials::Credentials;
pub use event::{ActivityObject, ActivityType, Entity, EntityKind, NormalizedEvent};
pub use metrics::{
    JOBS_COMPLETED,
    LINES_PROCESSED,
    LINES_UNRECOGNIZED,
    QUEUE_ANOMALIES,
    READER_PANICS,
    SESSIONS_ACTIVE,
};
pub use parser::LineParser;
pub use registry::{ActorId, SessionRegistry};
pub use role::Role;
pub use session::{LinkState, MessageKind, Session, SessionBuilder, SessionError};
