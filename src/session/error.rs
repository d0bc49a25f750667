//! Errors returned by session operations.

use std::io;

use thiserror::Error;

use crate::{
    activity::ActivityError,
    codec::{CodecError, FramingError},
};

/// Failure of a session action.
///
/// Every action resolves to exactly one `Result`; none of these errors is
/// fatal to the session except where noted.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No live connection and no credentials to open one.
    #[error("not connected; connect before issuing other actions")]
    NotConnected,
    /// Another caller's connect attempt did not finish in time. Retryable.
    #[error("connect already in progress, try again")]
    ConnectInProgress,
    /// Opening or registering the connection timed out.
    #[error("connection attempt timed out")]
    ConnectTimeout,
    /// Opening or registering the connection failed.
    #[error("connection failed: {0}")]
    ConnectFailed(String),
    /// The session was torn down while the connection was being registered.
    #[error("force disconnect active, aborting connect")]
    ForceDisconnect,
    /// The connection closed before the action completed.
    #[error("disconnected")]
    Disconnected,
    /// Sending to a room this session has not joined.
    #[error("cannot send to {0}: room not joined")]
    NotJoined(String),
    /// Message content was not text.
    #[error("message content must be a string")]
    InvalidContent,
    /// Query for something other than attendance.
    #[error("unknown query object type: {0}")]
    UnknownQueryType(String),
    /// Update of something other than an address or topic.
    #[error("unsupported update object type: {0}")]
    UnsupportedUpdate(String),
    /// A rename without a new identity.
    #[error("rename requires a target identity")]
    MissingTarget,
    /// The backend refused the action.
    #[error("{0}")]
    Rejected(String),
    /// The action was not completed in time; the session is cleaned up.
    #[error("action timed out")]
    ActionTimeout,
    /// The rename completed but persisting the new identity failed.
    #[error("identity update failed: {0}")]
    IdentityUpdate(String),
    /// The activity could not be mapped to an action.
    #[error(transparent)]
    Activity(#[from] ActivityError),
    /// An outbound line could not be framed, typically because it is too
    /// long.
    #[error("cannot send line: {0}")]
    Framing(#[from] FramingError),
    /// Transport failure while connecting.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

impl From<CodecError> for SessionError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(err) => Self::Io(err),
            CodecError::Framing(err) => Self::Framing(err),
        }
    }
}

impl SessionError {
    /// Whether the same action may succeed if retried unchanged.
    #[must_use]
    pub fn is_retryable(&self) -> bool { matches!(self, Self::ConnectInProgress) }
}
