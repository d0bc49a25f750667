//! Registry of live sessions keyed by actor.
//!
//! `SessionRegistry` is the explicit, injectable replacement for a
//! process-wide connection map: exactly one [`Session`] per actor identity,
//! shared by every client handle that acts as that identity. Eviction only
//! ever goes through [`Session::cleanup`].
use dashmap::{DashMap, mapref::entry::Entry};
use tracing::info;

use crate::session::Session;

/// Identifier of the actor a session acts as, for example
/// `alice@irc.example.org`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(String);

impl From<&str> for ActorId {
    fn from(value: &str) -> Self { Self(value.to_owned()) }
}

impl From<String> for ActorId {
    fn from(value: String) -> Self { Self(value) }
}

impl ActorId {
    /// Create a new [`ActorId`].
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

    /// Borrow the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(&self.0) }
}

/// Concurrent registry of sessions keyed by [`ActorId`].
#[derive(Debug, Default)]
pub struct SessionRegistry(DashMap<ActorId, Session>);

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Retrieve the session for `id`.
    pub fn get(&self, id: &ActorId) -> Option<Session> {
        self.0.get(id).map(|entry| entry.value().clone())
    }

    /// Register `session` under `id`, returning any session it replaced.
    pub fn insert(&self, id: ActorId, session: Session) -> Option<Session> { self.0.insert(id, session) }

    /// Return the session for `id`, creating it with `create` when absent.
    ///
    /// Concurrent callers for the same actor receive the same session.
    pub fn get_or_insert_with(&self, id: ActorId, create: impl FnOnce() -> Session) -> Session {
        match self.0.entry(id) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => entry.insert(create()).value().clone(),
        }
    }

    /// Remove the session for `id` without cleaning it up.
    pub fn remove(&self, id: &ActorId) -> Option<Session> { self.0.remove(id).map(|(_, session)| session) }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    /// Whether no sessions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Return the IDs of all registered sessions, sorted.
    #[must_use]
    pub fn active_ids(&self) -> Vec<ActorId> {
        let mut ids: Vec<_> = self.0.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Clean up and remove every idle session nobody else holds.
    ///
    /// A session is idle when it has no joined rooms and no pending actions,
    /// and unreferenced when the registry holds its only handle. Returns the
    /// IDs of the evicted sessions.
    ///
    /// `DashMap::retain` acquires per-bucket write locks, so other operations
    /// may contend briefly while the registry is swept.
    pub fn sweep_idle(&self) -> Vec<ActorId> {
        let mut evicted = Vec::new();
        self.0.retain(|id, session| {
            if session.handle_count() > 1 || !session.is_idle() {
                return true;
            }
            info!(actor = %id, "evicting idle session");
            session.cleanup();
            evicted.push(id.clone());
            false
        });
        evicted
    }
}
