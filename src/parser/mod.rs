//! Protocol-to-event translator.
//!
//! [`LineParser`] turns one line of IRC protocol text at a time into zero or
//! one [`NormalizedEvent`] (or a side signal such as a heartbeat). The only
//! state it keeps is the multi-line buffers in [`buffer`]; everything else is
//! derived from the line being parsed.
//!
//! ```
//! use chatgate::{bus::Signal, parser::LineParser};
//!
//! let mut parser = LineParser::new("irc", "irc.example.org");
//! let mut signals = Vec::new();
//! assert!(parser.input(":alice!a@host JOIN #rust", &mut signals));
//! assert!(matches!(signals.as_slice(), [Signal::Incoming(_)]));
//! ```

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::{
    bus::{Signal, SignalSink},
    event::{
        ActivityObject,
        ActivityType,
        Entity,
        NormalizedEvent,
        PresenceSubject,
        is_room_name,
    },
    role::Role,
};

mod buffer;
mod line;

use buffer::{ListingKind, Member, ParserBuffers};
pub(crate) use line::ParsedLine;

/// Shortest line that can carry a command.
pub const MIN_LINE_LENGTH: usize = 3;

const ACTION_MARKER: &str = "\u{1}ACTION ";
const CTCP_DELIMITER: char = '\u{1}';
const LEAVE_MESSAGE: &str = "user has left the channel";
const QUIT_MESSAGE: &str = "user has quit";

/// Stateful line-by-line translator for one backend connection.
#[derive(Debug)]
pub struct LineParser {
    context: String,
    host: String,
    buffers: ParserBuffers,
}

impl LineParser {
    /// Create a parser for events in `context` (for example `irc`) whose
    /// identities live on `host`.
    #[must_use]
    pub fn new(context: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            host: host.into(),
            buffers: ParserBuffers::default(),
        }
    }

    /// Host used to qualify identities.
    #[must_use]
    pub fn host(&self) -> &str { &self.host }

    /// Whether any multi-line reply is partially buffered.
    #[must_use]
    pub fn has_buffered_state(&self) -> bool { !self.buffers.is_empty() }

    /// Parse raw bytes, rejecting input that is not valid UTF-8.
    pub fn input_bytes(&mut self, bytes: &[u8], sink: &mut impl SignalSink) -> bool {
        match std::str::from_utf8(bytes) {
            Ok(line) => self.input(line, sink),
            Err(_) => false,
        }
    }

    /// Parse one line and emit the resulting signals into `sink`.
    ///
    /// Returns `false`, emitting nothing, when the line is too short to be a
    /// frame or has no command code. Every other line is accepted, including
    /// ones that only produce an [`Signal::Unrecognized`] signal.
    pub fn input(&mut self, line: &str, sink: &mut impl SignalSink) -> bool {
        if line.len() < MIN_LINE_LENGTH {
            return false;
        }
        let trimmed = line.trim();
        let Some(parsed) = ParsedLine::parse(trimmed) else {
            return false;
        };
        crate::metrics::inc_lines(crate::metrics::Direction::Inbound);
        trace!(line = trimmed, "parsing line");

        if parsed.prefix.is_none() && parsed.code == "PING" {
            sink.emit(Signal::HeartbeatRequest {
                token: parsed.content_or_last().unwrap_or_default().to_owned(),
                at: Utc::now(),
            });
            return true;
        }

        self.dispatch(&parsed, trimmed, sink);
        true
    }

    fn dispatch(&mut self, line: &ParsedLine<'_>, raw: &str, sink: &mut impl SignalSink) {
        let handled = match line.code {
            "PONG" => {
                sink.emit(Signal::HeartbeatResponse {
                    token: line.content_or_last().unwrap_or_default().to_owned(),
                    at: Utc::now(),
                });
                true
            }
            "001" => line.param(0).is_some_and(|nick| {
                sink.emit(Signal::Registered {
                    nick: nick.to_owned(),
                });
                true
            }),
            "JOIN" => self.on_join(line, sink),
            "PART" => self.on_part(line, sink),
            "QUIT" => self.on_quit(line, sink),
            "NICK" => self.on_nick(line, sink),
            "353" => self.on_names(line),
            "366" => self.flush_listing(ListingKind::Names, line.param(1), sink),
            "352" => self.on_who(line),
            "315" => self.flush_listing(ListingKind::Who, line.param(1), sink),
            "MODE" => self.on_mode(line, sink),
            "TOPIC" => self.on_topic(line, sink),
            "332" => self.on_topic_query(line),
            "333" => self.on_topic_set_by(line, sink),
            "375" => {
                self.buffers.start_banner();
                true
            }
            "372" => {
                self.buffers
                    .push_banner_line(line.content.unwrap_or_default().trim());
                true
            }
            "376" => {
                self.flush_banner(line, sink);
                true
            }
            "PRIVMSG" | "NOTICE" => self.on_message(line, sink),
            "904" | "905" | "906" => {
                let actor = Entity::person(line.param(0).unwrap_or("*"), &self.host);
                let event = self
                    .event(ActivityType::Connect, actor)
                    .with_error(line.content.unwrap_or("authentication failed"));
                self.error(sink, event);
                true
            }
            "ERROR" => {
                let event = NormalizedEvent::new(
                    self.context.as_str(),
                    ActivityType::Disconnect,
                    Entity::service(&self.host),
                )
                .with_error(line.content_or_last().unwrap_or("connection error"));
                self.error(sink, event);
                true
            }
            code => self.on_numeric_error(code, line, sink),
        };

        if !handled {
            crate::metrics::inc_unrecognized();
            debug!(line = raw, "unrecognized line");
            sink.emit(Signal::Unrecognized(raw.to_owned()));
        }
    }

    fn sender(&self, line: &ParsedLine<'_>) -> Entity {
        match line.sender_nick() {
            Some(nick) if line.from_user() => Entity::person(nick, &self.host),
            Some(server) => Entity::service(server),
            None => Entity::service(&self.host),
        }
    }

    fn incoming(&self, sink: &mut impl SignalSink, mut event: NormalizedEvent) {
        event.stamp_published(Utc::now());
        sink.emit(Signal::Incoming(event));
    }

    fn error(&self, sink: &mut impl SignalSink, mut event: NormalizedEvent) {
        event.stamp_published(Utc::now());
        sink.emit(Signal::Error(event));
    }

    fn event(&self, kind: ActivityType, actor: Entity) -> NormalizedEvent {
        NormalizedEvent::new(self.context.as_str(), kind, actor)
    }

    fn on_join(&self, line: &ParsedLine<'_>, sink: &mut impl SignalSink) -> bool {
        let Some(room) = line.param(0).or(line.content) else {
            return false;
        };
        let event = self
            .event(ActivityType::Join, self.sender(line))
            .with_target(Entity::room(room, &self.host));
        self.incoming(sink, event);
        true
    }

    fn on_part(&self, line: &ParsedLine<'_>, sink: &mut impl SignalSink) -> bool {
        let Some(room) = line.param(0).or(line.content) else {
            return false;
        };
        let event = self
            .event(ActivityType::Leave, self.sender(line))
            .with_target(Entity::room(room, &self.host))
            .with_object(ActivityObject::Message {
                content: LEAVE_MESSAGE.to_owned(),
            });
        self.incoming(sink, event);
        true
    }

    fn on_quit(&self, line: &ParsedLine<'_>, sink: &mut impl SignalSink) -> bool {
        let event = self
            .event(ActivityType::Leave, self.sender(line))
            .with_target(Entity::service(&self.host))
            .with_object(ActivityObject::Message {
                content: QUIT_MESSAGE.to_owned(),
            });
        self.incoming(sink, event);
        true
    }

    fn on_nick(&self, line: &ParsedLine<'_>, sink: &mut impl SignalSink) -> bool {
        let Some(new_nick) = line.content_or_last() else {
            return false;
        };
        let event = self
            .event(ActivityType::Update, self.sender(line))
            .with_target(Entity::person(new_nick, &self.host))
            .with_object(ActivityObject::Address);
        self.incoming(sink, event);
        true
    }

    fn on_names(&mut self, line: &ParsedLine<'_>) -> bool {
        let Some(room) = line.params.iter().skip(1).find(|p| is_room_name(p)) else {
            return false;
        };
        for entry in line.content.unwrap_or_default().split_whitespace() {
            let (role, nick) = Role::split_entry(entry);
            if nick.is_empty() {
                continue;
            }
            self.buffers.push_member(
                ListingKind::Names,
                room,
                Member {
                    nick: nick.to_owned(),
                    role,
                },
            );
        }
        true
    }

    fn on_who(&mut self, line: &ParsedLine<'_>) -> bool {
        // 352 <me> <room> <user> <host> <server> <nick> <flags> :<hops> <realname>
        let (Some(room), Some(nick), Some(flags)) = (line.param(1), line.param(5), line.param(6))
        else {
            return false;
        };
        if !is_room_name(room) {
            return true;
        }
        self.buffers.push_member(
            ListingKind::Who,
            room,
            Member {
                nick: nick.to_owned(),
                role: Role::from_who_flags(flags),
            },
        );
        true
    }

    fn flush_listing(
        &mut self,
        kind: ListingKind,
        room: Option<&str>,
        sink: &mut impl SignalSink,
    ) -> bool {
        let Some(room) = room else {
            return false;
        };
        for member in self.buffers.take_listing(kind, room) {
            let event = self
                .event(
                    ActivityType::Update,
                    Entity::person(&member.nick, &self.host),
                )
                .with_target(Entity::room(room, &self.host))
                .with_object(ActivityObject::Presence { role: member.role });
            self.incoming(sink, event);
        }
        true
    }

    fn on_mode(&self, line: &ParsedLine<'_>, sink: &mut impl SignalSink) -> bool {
        let (Some(room), Some(modes)) = (line.param(0), line.param(1)) else {
            return false;
        };
        if !is_room_name(room) {
            return false;
        }
        let mut args = line
            .params
            .iter()
            .skip(2)
            .copied()
            .chain(line.content.into_iter().flat_map(str::split_whitespace));
        let mut adding = true;
        let mut emitted = false;
        for letter in modes.chars() {
            match letter {
                '+' => adding = true,
                '-' => adding = false,
                letter => {
                    if let Some(role) = Role::from_mode(letter) {
                        let Some(member) = args.next() else { break };
                        let kind = if adding {
                            ActivityType::Add
                        } else {
                            ActivityType::Remove
                        };
                        let event = self
                            .event(kind, self.sender(line))
                            .with_target(Entity::person(member, &self.host))
                            .with_object(ActivityObject::Relationship {
                                relationship: "role".to_owned(),
                                subject: PresenceSubject { role },
                                object: Entity::room(room, &self.host),
                            });
                        self.incoming(sink, event);
                        emitted = true;
                    } else if mode_takes_argument(letter, adding) {
                        args.next();
                    }
                }
            }
        }
        emitted
    }

    fn on_topic(&self, line: &ParsedLine<'_>, sink: &mut impl SignalSink) -> bool {
        let Some(room) = line.param(0) else {
            return false;
        };
        let event = self
            .event(ActivityType::Update, self.sender(line))
            .with_target(Entity::room(room, &self.host))
            .with_object(ActivityObject::Topic {
                content: line.content.unwrap_or_default().to_owned(),
            });
        self.incoming(sink, event);
        true
    }

    fn on_topic_query(&mut self, line: &ParsedLine<'_>) -> bool {
        let Some(room) = line.param(1) else {
            return false;
        };
        self.buffers
            .set_pending_topic(room, line.content.unwrap_or_default());
        true
    }

    fn on_topic_set_by(&mut self, line: &ParsedLine<'_>, sink: &mut impl SignalSink) -> bool {
        // 333 <me> <room> <setter> <unix time>
        let (Some(room), Some(setter)) = (line.param(1), line.param(2)) else {
            return false;
        };
        let set_at = line
            .param(3)
            .or(line.content)
            .and_then(|secs| secs.trim().parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0));
        let Some(topic) = self.buffers.take_topic(room, set_at) else {
            debug!(room, "topic set-by line without pending topic");
            return true;
        };
        let setter = setter.split_once('!').map_or(setter, |(nick, _)| nick);
        let mut event = self
            .event(ActivityType::Update, Entity::person(setter, &self.host))
            .with_target(Entity::room(room, &self.host))
            .with_object(ActivityObject::Topic {
                content: topic.content,
            });
        if let Some(at) = topic.set_at {
            event = event.with_published(at);
        }
        self.incoming(sink, event);
        true
    }

    fn flush_banner(&mut self, line: &ParsedLine<'_>, sink: &mut impl SignalSink) {
        let Some(content) = self.buffers.take_banner() else {
            return;
        };
        let mut event = self
            .event(ActivityType::Update, self.sender(line))
            .with_object(ActivityObject::Topic { content });
        if let Some(nick) = line.param(0) {
            event = event.with_target(Entity::person(nick, &self.host));
        }
        self.incoming(sink, event);
    }

    fn on_message(&self, line: &ParsedLine<'_>, sink: &mut impl SignalSink) -> bool {
        let Some(target) = line.param(0) else {
            return false;
        };
        let content = line.content.unwrap_or_default();
        let object = if line.code == "NOTICE" {
            ActivityObject::Notice {
                content: content.to_owned(),
            }
        } else if let Some(action) = strip_action(content) {
            ActivityObject::Me {
                content: action.to_owned(),
            }
        } else if content.starts_with(CTCP_DELIMITER) {
            // Other CTCP queries (VERSION, PING, ...) carry no user content.
            return false;
        } else {
            ActivityObject::Message {
                content: content.to_owned(),
            }
        };
        let event = self
            .event(ActivityType::Send, self.sender(line))
            .with_target(Entity::room_or_person(target, &self.host))
            .with_object(object);
        self.incoming(sink, event);
        true
    }

    fn on_numeric_error(
        &self,
        code: &str,
        line: &ParsedLine<'_>,
        sink: &mut impl SignalSink,
    ) -> bool {
        let Some(class) = ErrorClass::from_code(code) else {
            return false;
        };
        let Some(me) = line.param(0) else {
            return false;
        };
        let actor = Entity::person(me, &self.host);
        let message = line.content.unwrap_or(code);
        let Some(subject) = line.param(1) else {
            return false;
        };
        let event = match class {
            ErrorClass::Channel(kind) | ErrorClass::ChannelNotFound(kind) => self
                .event(kind, actor)
                .with_target(Entity::room(subject, &self.host)),
            ErrorClass::RecipientNotFound => self
                .event(ActivityType::Send, actor)
                .with_target(Entity::person(subject, &self.host)),
            ErrorClass::NickConflict => self
                .event(ActivityType::Update, actor)
                .with_target(Entity::person(subject, &self.host))
                .with_object(ActivityObject::Address),
            ErrorClass::TemporarilyUnavailable if is_room_name(subject) => self
                .event(ActivityType::Join, actor)
                .with_target(Entity::room(subject, &self.host)),
            ErrorClass::TemporarilyUnavailable => self
                .event(ActivityType::Update, actor)
                .with_target(Entity::person(subject, &self.host))
                .with_object(ActivityObject::Address),
        };
        self.error(sink, event.with_error(message));
        true
    }
}

/// Classification of numeric error replies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ErrorClass {
    /// Permission, ban, invite, key, mask, mode, or capacity errors on a room.
    Channel(ActivityType),
    NickConflict,
    ChannelNotFound(ActivityType),
    RecipientNotFound,
    TemporarilyUnavailable,
}

impl ErrorClass {
    fn from_code(code: &str) -> Option<Self> {
        let class = match code {
            // full, invite only, banned, bad key, bad mask, mode restricted,
            // list full
            "471" | "473" | "474" | "475" | "476" | "477" | "478" => {
                Self::Channel(ActivityType::Join)
            }
            "404" => Self::Channel(ActivityType::Send),
            "482" => Self::Channel(ActivityType::Update),
            "432" | "433" | "436" => Self::NickConflict,
            "403" => Self::ChannelNotFound(ActivityType::Join),
            "401" => Self::RecipientNotFound,
            "437" => Self::TemporarilyUnavailable,
            _ => return None,
        };
        Some(class)
    }
}

fn strip_action(content: &str) -> Option<&str> {
    let content = content
        .strip_prefix(['+', '-'])
        .filter(|rest| rest.starts_with(ACTION_MARKER))
        .unwrap_or(content);
    content
        .strip_prefix(ACTION_MARKER)
        .map(|action| action.trim_end_matches(CTCP_DELIMITER))
}

fn mode_takes_argument(letter: char, adding: bool) -> bool {
    matches!(letter, 'b' | 'e' | 'I' | 'k') || (letter == 'l' && adding)
}
