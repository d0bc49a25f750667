//! Normalized activity events.
//!
//! Every line the parser understands is translated into a
//! [`NormalizedEvent`], the protocol-agnostic shape delivered to clients. The
//! types serialize to the JSON layout the rest of the gateway consumes:
//!
//! ```json
//! {
//!   "context": "irc",
//!   "type": "join",
//!   "actor": { "type": "person", "id": "alice@irc.example.org", "name": "alice" },
//!   "target": { "type": "room", "id": "irc.example.org/#rust", "name": "#rust" },
//!   "published": "2024-05-01T12:00:00+00:00"
//! }
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::role::Role;

/// Characters that mark a target name as a room rather than a person.
pub const ROOM_PREFIXES: [char; 2] = ['#', '&'];

/// Return `true` when `name` addresses a room.
#[must_use]
pub fn is_room_name(name: &str) -> bool { name.starts_with(ROOM_PREFIXES) }

/// Format `at` as the RFC 3339 string used for `published`.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Activity verbs carried in the `type` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    /// Joining a room.
    Join,
    /// Leaving a room or the service.
    Leave,
    /// Delivering content to a room or person.
    Send,
    /// Changing an identity, topic, or presence.
    Update,
    /// Granting a relationship such as a role.
    Add,
    /// Revoking a relationship such as a role.
    Remove,
    /// Requesting information such as attendance.
    Query,
    /// Establishing the backend connection.
    Connect,
    /// Tearing down the backend connection.
    Disconnect,
}

impl ActivityType {
    /// Name used on the wire and in log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::Leave => "leave",
            Self::Send => "send",
            Self::Update => "update",
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Query => "query",
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
        }
    }
}

/// Kind of an [`Entity`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A user identity.
    Person,
    /// A channel.
    Room,
    /// The backend server itself.
    Service,
}

/// Actor or target of an event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity kind.
    #[serde(rename = "type")]
    pub kind: EntityKind,
    /// Stable identifier, unique per backend host.
    pub id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Entity {
    /// A person identified by `nick` on `host`.
    #[must_use]
    pub fn person(nick: &str, host: &str) -> Self {
        Self {
            kind: EntityKind::Person,
            id: format!("{nick}@{host}"),
            name: Some(nick.to_owned()),
        }
    }

    /// A room named `room` on `host`.
    #[must_use]
    pub fn room(room: &str, host: &str) -> Self {
        Self {
            kind: EntityKind::Room,
            id: format!("{host}/{room}"),
            name: Some(room.to_owned()),
        }
    }

    /// The backend service at `host`.
    #[must_use]
    pub fn service(host: &str) -> Self {
        Self {
            kind: EntityKind::Service,
            id: host.to_owned(),
            name: None,
        }
    }

    /// A room when `name` carries a room prefix, otherwise a person.
    #[must_use]
    pub fn room_or_person(name: &str, host: &str) -> Self {
        if is_room_name(name) {
            Self::room(name, host)
        } else {
            Self::person(name, host)
        }
    }

    /// Display name, falling back to the identifier.
    #[must_use]
    pub fn display_name(&self) -> &str { self.name.as_deref().unwrap_or(&self.id) }
}

/// Role subject of a [`ActivityObject::Relationship`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "presence")]
pub struct PresenceSubject {
    /// Role granted or revoked.
    pub role: Role,
}

/// Payload carried in the `object` field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActivityObject {
    /// Plain message content.
    Message {
        /// Message text.
        content: String,
    },
    /// A `/me` action.
    Me {
        /// Action text without the control markers.
        content: String,
    },
    /// A notice.
    Notice {
        /// Notice text.
        content: String,
    },
    /// A room topic or the service banner.
    Topic {
        /// Topic text.
        content: String,
    },
    /// An identity change; the new identity is the event target.
    Address,
    /// A member's presence in a room.
    Presence {
        /// Member role within the room.
        role: Role,
    },
    /// A relationship change between a member and a room.
    Relationship {
        /// Relationship name; always `role` for chat backends.
        relationship: String,
        /// Role being changed.
        subject: PresenceSubject,
        /// Room the relationship applies to.
        object: Entity,
    },
}

impl ActivityObject {
    /// Textual content, if the variant carries any.
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Message { content }
            | Self::Me { content }
            | Self::Notice { content }
            | Self::Topic { content } => Some(content),
            Self::Address | Self::Presence { .. } | Self::Relationship { .. } => None,
        }
    }
}

/// Protocol-agnostic event delivered to clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// Backend family, for example `irc`.
    pub context: String,
    /// Activity verb.
    #[serde(rename = "type")]
    pub kind: ActivityType,
    /// Entity that performed the activity.
    pub actor: Entity,
    /// Entity the activity was directed at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Entity>,
    /// Activity payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<ActivityObject>,
    /// RFC 3339 timestamp; stamped with the current time on emission when
    /// the backend supplied none.
    #[serde(default)]
    pub published: String,
    /// Human-readable error for events on the error topic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NormalizedEvent {
    /// Create an event with no target, object, or timestamp.
    #[must_use]
    pub fn new(context: impl Into<String>, kind: ActivityType, actor: Entity) -> Self {
        Self {
            context: context.into(),
            kind,
            actor,
            target: None,
            object: None,
            published: String::new(),
            error: None,
        }
    }

    /// Set the target.
    #[must_use]
    pub fn with_target(mut self, target: Entity) -> Self {
        self.target = Some(target);
        self
    }

    /// Set the object.
    #[must_use]
    pub fn with_object(mut self, object: ActivityObject) -> Self {
        self.object = Some(object);
        self
    }

    /// Set the error description.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Set an explicit publication time.
    #[must_use]
    pub fn with_published(mut self, at: DateTime<Utc>) -> Self {
        self.published = format_timestamp(at);
        self
    }

    /// Fill `published` with `now` unless a timestamp is already present.
    pub fn stamp_published(&mut self, now: DateTime<Utc>) {
        if self.published.is_empty() {
            self.published = format_timestamp(now);
        }
    }

    /// Whether this event has the shape of a completion for an action the
    /// actor issued itself.
    ///
    /// Joins, room leaves, renames and topic changes are echoed back to the
    /// issuing connection. Presence listings, role changes and messages are
    /// broadcast to every member and never complete an action.
    #[must_use]
    pub fn is_completion_shaped(&self) -> bool {
        match self.kind {
            ActivityType::Join => true,
            ActivityType::Leave => self
                .target
                .as_ref()
                .is_some_and(|target| target.kind == EntityKind::Room),
            ActivityType::Update => matches!(
                self.object,
                Some(ActivityObject::Address | ActivityObject::Topic { .. })
            ) && self.actor.kind == EntityKind::Person,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[test]
    fn serializes_relationship_shape() {
        let event = NormalizedEvent::new(
            "irc",
            ActivityType::Add,
            Entity::person("op", "irc.example.org"),
        )
        .with_target(Entity::person("bob", "irc.example.org"))
        .with_object(ActivityObject::Relationship {
            relationship: "role".to_owned(),
            subject: PresenceSubject { role: Role::Owner },
            object: Entity::room("#rust", "irc.example.org"),
        })
        .with_published(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());

        let value = serde_json::to_value(&event).expect("serialize event");
        assert_eq!(
            value,
            json!({
                "context": "irc",
                "type": "add",
                "actor": { "type": "person", "id": "op@irc.example.org", "name": "op" },
                "target": { "type": "person", "id": "bob@irc.example.org", "name": "bob" },
                "object": {
                    "type": "relationship",
                    "relationship": "role",
                    "subject": { "type": "presence", "role": "owner" },
                    "object": { "type": "room", "id": "irc.example.org/#rust", "name": "#rust" }
                },
                "published": "2024-05-01T12:00:00+00:00"
            })
        );
    }

    #[test]
    fn stamp_keeps_existing_timestamp() {
        let set = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let mut event = NormalizedEvent::new(
            "irc",
            ActivityType::Update,
            Entity::service("irc.example.org"),
        )
        .with_published(set);
        event.stamp_published(Utc::now());
        assert_eq!(event.published, "2020-01-01T00:00:00+00:00");
    }

    #[test]
    fn stamp_fills_missing_timestamp() {
        let mut event = NormalizedEvent::new(
            "irc",
            ActivityType::Join,
            Entity::person("alice", "irc.example.org"),
        );
        event.stamp_published(Utc.with_ymd_and_hms(2021, 2, 3, 4, 5, 6).unwrap());
        assert_eq!(event.published, "2021-02-03T04:05:06+00:00");
    }

    #[rstest]
    #[case("#rust", EntityKind::Room)]
    #[case("&local", EntityKind::Room)]
    #[case("alice", EntityKind::Person)]
    fn classifies_target_names(#[case] name: &str, #[case] kind: EntityKind) {
        assert_eq!(Entity::room_or_person(name, "h").kind, kind);
    }

    #[test]
    fn presence_updates_are_broadcast() {
        let event = NormalizedEvent::new("irc", ActivityType::Update, Entity::person("a", "h"))
            .with_object(ActivityObject::Presence { role: Role::Member });
        assert!(!event.is_completion_shaped());
    }

    #[test]
    fn quit_is_not_a_completion() {
        let event = NormalizedEvent::new("irc", ActivityType::Leave, Entity::person("a", "h"))
            .with_target(Entity::service("h"));
        assert!(!event.is_completion_shaped());
    }
}
