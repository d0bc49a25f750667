//! Mutable state owned by one session.

use std::collections::HashSet;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::jobs::{Job, JobKind, JobQueue};
use crate::{command::Command, credentials::Credentials};

/// Connection phase of a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LinkState {
    /// No connection and no attempt running.
    #[default]
    Disconnected,
    /// A connect attempt is running.
    Connecting,
    /// Registered and ready for actions.
    Connected,
}

/// Handles to the tasks serving a live connection.
#[derive(Debug)]
pub(crate) struct Link {
    writer: mpsc::UnboundedSender<String>,
    shutdown: CancellationToken,
    pub(crate) generation: u64,
}

impl Link {
    pub(crate) fn new(
        writer: mpsc::UnboundedSender<String>,
        shutdown: CancellationToken,
        generation: u64,
    ) -> Self {
        Self {
            writer,
            shutdown,
            generation,
        }
    }

    /// Queue `command` for the writer task; `false` once the writer is gone.
    pub(crate) fn send(&self, command: &Command) -> bool {
        tracing::trace!(command = command.name(), "queueing line");
        self.writer.send(command.to_line()).is_ok()
    }

    /// Stop the reader. The writer drains queued lines, then exits once this
    /// link is dropped.
    pub(crate) fn close(self) { self.shutdown.cancel(); }
}

/// Case-insensitive key for a room name.
pub(crate) fn room_key(room: &str) -> String { room.to_ascii_lowercase() }

#[derive(Debug)]
pub(crate) struct SessionState {
    pub(crate) credentials: Credentials,
    /// Nick currently registered on the backend.
    pub(crate) nick: String,
    pub(crate) joined_rooms: HashSet<String>,
    pub(crate) handled_actors: HashSet<String>,
    pub(crate) jobs: JobQueue,
    pub(crate) force_disconnect: bool,
    pub(crate) link: Option<Link>,
    pub(crate) generation: u64,
}

impl SessionState {
    pub(crate) fn new(credentials: Credentials) -> Self {
        Self {
            nick: credentials.nick.clone(),
            credentials,
            joined_rooms: HashSet::new(),
            handled_actors: HashSet::new(),
            jobs: JobQueue::default(),
            force_disconnect: false,
            link: None,
            generation: 0,
        }
    }

    pub(crate) fn host(&self) -> &str { &self.credentials.host }

    /// Identifier of the person this session currently acts as.
    pub(crate) fn actor_id(&self) -> String { format!("{}@{}", self.nick, self.credentials.host) }

    pub(crate) fn mark_handled(&mut self) {
        let id = self.actor_id();
        self.handled_actors.insert(id);
    }

    pub(crate) fn is_joined(&self, room: &str) -> bool { self.joined_rooms.contains(&room_key(room)) }

    /// Apply the local effect of a completed action.
    pub(crate) fn apply(&mut self, kind: &JobKind) {
        match kind {
            JobKind::Join(room) => {
                self.joined_rooms.insert(room_key(room));
            }
            JobKind::Rename { old, new } => {
                self.handled_actors
                    .remove(&format!("{old}@{}", self.credentials.host));
                self.nick.clone_from(new);
                self.credentials.nick.clone_from(new);
                self.mark_handled();
            }
            JobKind::Leave(_) | JobKind::Send | JobKind::Topic(_) | JobKind::Query => {}
        }
    }

    /// Drop every piece of connection state, returning the outstanding jobs
    /// and the live link for the caller to finish outside any lock.
    pub(crate) fn reset(&mut self) -> (Vec<Job>, Option<Link>) {
        self.joined_rooms.clear();
        self.handled_actors.clear();
        self.nick.clone_from(&self.credentials.nick);
        (self.jobs.drain(), self.link.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SessionState { SessionState::new(Credentials::new("me", "irc.example.org")) }

    #[test]
    fn join_effect_is_case_insensitive() {
        let mut state = state();
        state.apply(&JobKind::Join("#Rust".into()));
        assert!(state.is_joined("#rust"));
    }

    #[test]
    fn rename_swaps_handled_actor() {
        let mut state = state();
        state.mark_handled();
        state.apply(&JobKind::Rename {
            old: "me".into(),
            new: "me2".into(),
        });
        assert_eq!(state.actor_id(), "me2@irc.example.org");
        assert_eq!(state.credentials.nick, "me2");
        assert!(state.handled_actors.contains("me2@irc.example.org"));
        assert!(!state.handled_actors.contains("me@irc.example.org"));
    }

    #[test]
    fn reset_clears_rooms_and_actors() {
        let mut state = state();
        state.mark_handled();
        state.apply(&JobKind::Join("#a".into()));
        let (jobs, link) = state.reset();
        assert!(jobs.is_empty());
        assert!(link.is_none());
        assert!(state.joined_rooms.is_empty());
        assert!(state.handled_actors.is_empty());
    }
}
