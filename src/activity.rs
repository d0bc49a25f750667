//! Client-supplied activities.
//!
//! An [`Activity`] is the JSON request a client sends to act on its session.
//! It reuses the normalized event vocabulary: a verb, an actor, an optional
//! target and an optional object whose `content` is left untyped until the
//! session validates it.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::event::{ActivityType, Entity, EntityKind};

/// Malformed or unsupported activity.
#[derive(Debug, Error)]
pub enum ActivityError {
    /// The document is not a valid activity.
    #[error("invalid activity document: {0}")]
    Json(#[from] serde_json::Error),
    /// The verb needs a target that was not supplied.
    #[error("{0} activity requires a target")]
    MissingTarget(&'static str),
    /// The verb needs an object that was not supplied.
    #[error("{0} activity requires an object")]
    MissingObject(&'static str),
    /// The verb is not something a client may request.
    #[error("unsupported activity type: {0}")]
    Unsupported(&'static str),
}

/// Object of a client activity.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ActionObject {
    /// Object type such as `message`, `me`, `address` or `attendance`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Payload; must be a JSON string wherever text is expected.
    #[serde(default)]
    pub content: Option<Value>,
}

/// A request to act on a session.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Activity {
    /// Backend family the activity targets.
    #[serde(default)]
    pub context: Option<String>,
    /// Verb.
    #[serde(rename = "type")]
    pub kind: ActivityType,
    /// Identity acting.
    pub actor: Entity,
    /// Room or person acted on.
    #[serde(default)]
    pub target: Option<Entity>,
    /// Payload.
    #[serde(default)]
    pub object: Option<ActionObject>,
}

impl Activity {
    /// Parse an activity from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`ActivityError::Json`] when the document does not describe an
    /// activity.
    pub fn from_json(json: &str) -> Result<Self, ActivityError> { Ok(serde_json::from_str(json)?) }

    /// Name of the target as used on the wire.
    ///
    /// # Errors
    ///
    /// Returns [`ActivityError::MissingTarget`] when there is no target.
    pub fn target_name(&self) -> Result<&str, ActivityError> {
        self.target
            .as_ref()
            .map(wire_name)
            .ok_or(ActivityError::MissingTarget(self.kind.as_str()))
    }

    /// The object.
    ///
    /// # Errors
    ///
    /// Returns [`ActivityError::MissingObject`] when there is no object.
    pub fn object(&self) -> Result<&ActionObject, ActivityError> {
        self.object
            .as_ref()
            .ok_or(ActivityError::MissingObject(self.kind.as_str()))
    }
}

/// Wire name of an entity: its display name, or the identifier with the
/// host qualification removed.
#[must_use]
pub fn wire_name(entity: &Entity) -> &str {
    if let Some(name) = entity.name.as_deref().filter(|name| !name.is_empty()) {
        return name;
    }
    match entity.kind {
        EntityKind::Room => entity.id.split_once('/').map_or(&entity.id, |(_, room)| room),
        EntityKind::Person => entity.id.split_once('@').map_or(&entity.id, |(nick, _)| nick),
        EntityKind::Service => &entity.id,
    }
}
