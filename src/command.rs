//! Outbound protocol commands.
//!
//! [`Command`] is the closed set of lines a session writes to the backend.
//! Rendering strips CR, LF and NUL from every argument, so content supplied
//! by a client can never terminate the line early and smuggle in a second
//! command.
//!
//! ```
//! use chatgate::command::Command;
//!
//! let line = Command::Privmsg {
//!     target: "#rust".into(),
//!     text: "hi\r\nQUIT".into(),
//! }
//! .to_line();
//! assert_eq!(line, "PRIVMSG #rust :hiQUIT");
//! ```

use std::{borrow::Cow, fmt};

const CTCP_DELIMITER: char = '\u{1}';

/// A single outbound protocol line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Connection password sent before registration.
    Pass(String),
    /// Request a capability.
    CapReq(String),
    /// Finish capability negotiation.
    CapEnd,
    /// SASL exchange step.
    Authenticate(String),
    /// Set or change the nick.
    Nick(String),
    /// Registration user record.
    User {
        /// Username, usually the nick.
        username: String,
        /// Free-form real name.
        real_name: String,
    },
    /// Join a room.
    Join(String),
    /// Leave a room.
    Part(String),
    /// Set a room topic.
    Topic {
        /// Room name.
        room: String,
        /// New topic text.
        topic: String,
    },
    /// Message to a room or person.
    Privmsg {
        /// Room or nick.
        target: String,
        /// Message text.
        text: String,
    },
    /// Notice to a room or person.
    Notice {
        /// Room or nick.
        target: String,
        /// Notice text.
        text: String,
    },
    /// `/me` action, sent as a CTCP `ACTION` inside a message.
    Action {
        /// Room or nick.
        target: String,
        /// Action text.
        text: String,
    },
    /// Request the member listing of a room.
    Names(String),
    /// Heartbeat request carrying a token.
    Ping(String),
    /// Heartbeat reply echoing a token.
    Pong(String),
    /// Close the connection.
    Quit(String),
}

/// Strip bytes that would split or truncate a protocol line.
#[must_use]
pub fn sanitize(value: &str) -> Cow<'_, str> {
    if value.contains(['\r', '\n', '\0']) {
        Cow::Owned(value.chars().filter(|c| !matches!(c, '\r' | '\n' | '\0')).collect())
    } else {
        Cow::Borrowed(value)
    }
}

/// Sanitize a positional parameter, which additionally may not contain
/// spaces or start with `:`.
fn middle(value: &str) -> String {
    sanitize(value)
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_start_matches(':')
        .to_owned()
}

impl Command {
    /// Command keyword, used as a log field.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Pass(_) => "PASS",
            Self::CapReq(_) | Self::CapEnd => "CAP",
            Self::Authenticate(_) => "AUTHENTICATE",
            Self::Nick(_) => "NICK",
            Self::User { .. } => "USER",
            Self::Join(_) => "JOIN",
            Self::Part(_) => "PART",
            Self::Topic { .. } => "TOPIC",
            Self::Privmsg { .. } | Self::Action { .. } => "PRIVMSG",
            Self::Notice { .. } => "NOTICE",
            Self::Names(_) => "NAMES",
            Self::Ping(_) => "PING",
            Self::Pong(_) => "PONG",
            Self::Quit(_) => "QUIT",
        }
    }

    /// Render the command as a line without its terminator.
    #[must_use]
    pub fn to_line(&self) -> String { self.to_string() }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass(secret) => write!(f, "PASS :{}", sanitize(secret)),
            Self::CapReq(capability) => write!(f, "CAP REQ :{}", sanitize(capability)),
            Self::CapEnd => f.write_str("CAP END"),
            Self::Authenticate(payload) => write!(f, "AUTHENTICATE {}", middle(payload)),
            Self::Nick(nick) => write!(f, "NICK {}", middle(nick)),
            Self::User {
                username,
                real_name,
            } => write!(f, "USER {} 0 * :{}", middle(username), sanitize(real_name)),
            Self::Join(room) => write!(f, "JOIN {}", middle(room)),
            Self::Part(room) => write!(f, "PART {}", middle(room)),
            Self::Topic { room, topic } => write!(f, "TOPIC {} :{}", middle(room), sanitize(topic)),
            Self::Privmsg { target, text } => {
                write!(f, "PRIVMSG {} :{}", middle(target), sanitize(text))
            }
            Self::Notice { target, text } => {
                write!(f, "NOTICE {} :{}", middle(target), sanitize(text))
            }
            Self::Action { target, text } => {
                let text = sanitize(text).replace(CTCP_DELIMITER, "");
                write!(
                    f,
                    "PRIVMSG {} :{CTCP_DELIMITER}ACTION {text}{CTCP_DELIMITER}",
                    middle(target)
                )
            }
            Self::Names(room) => write!(f, "NAMES {}", middle(room)),
            Self::Ping(token) => write!(f, "PING {}", middle(token)),
            Self::Pong(token) => write!(f, "PONG :{}", sanitize(token)),
            Self::Quit(reason) => write!(f, "QUIT :{}", sanitize(reason)),
        }
    }
}
