//! Canned server lines.
//!
//! Each helper renders one line exactly as a typical server sends it, without
//! the terminator. Users are given the fixed `user@test.host` mask.

/// Server name used as the prefix of numeric replies.
pub const SERVER: &str = "irc.test";

/// Registration confirmation for `nick`.
#[must_use]
pub fn welcome(nick: &str) -> String { format!(":{SERVER} 001 {nick} :Welcome to the test network {nick}") }

/// `nick` joined `room`.
#[must_use]
pub fn join(nick: &str, room: &str) -> String { format!(":{nick}!user@test.host JOIN {room}") }

/// `nick` left `room`.
#[must_use]
pub fn part(nick: &str, room: &str) -> String { format!(":{nick}!user@test.host PART {room}") }

/// `old` is now known as `new`.
#[must_use]
pub fn nick_change(old: &str, new: &str) -> String { format!(":{old}!user@test.host NICK :{new}") }

/// `nick` set the topic of `room`.
#[must_use]
pub fn topic(nick: &str, room: &str, text: &str) -> String {
    format!(":{nick}!user@test.host TOPIC {room} :{text}")
}

/// Message from `nick` to `target`.
#[must_use]
pub fn privmsg(nick: &str, target: &str, text: &str) -> String {
    format!(":{nick}!user@test.host PRIVMSG {target} :{text}")
}

/// Heartbeat reply carrying `token`.
#[must_use]
pub fn pong(token: &str) -> String { format!(":{SERVER} PONG {SERVER} :{token}") }

/// Server heartbeat request.
#[must_use]
pub fn ping(token: &str) -> String { format!("PING :{token}") }

/// Numeric error `code` addressed to `nick` about `subject`.
#[must_use]
pub fn numeric_error(code: &str, nick: &str, subject: &str, text: &str) -> String {
    format!(":{SERVER} {code} {nick} {subject} :{text}")
}

/// Member listing for `room` followed by its terminator.
#[must_use]
pub fn names(nick: &str, room: &str, members: &[&str]) -> [String; 2] {
    [
        format!(":{SERVER} 353 {nick} = {room} :{}", members.join(" ")),
        format!(":{SERVER} 366 {nick} {room} :End of /NAMES list."),
    ]
}
