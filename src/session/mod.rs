//! Per-identity sessions.
//!
//! A [`Session`] owns one backend connection for one identity and exposes one
//! operation per client action. The backend has no request identifiers, so
//! every action is queued in issue order and completed from the head of the
//! queue, either by the backend echoing the action back to its own actor or
//! by the sentinel heartbeat sent after it. Completions are therefore observed
//! in the order actions were issued.
//!
//! ```no_run
//! use chatgate::{credentials::Credentials, session::Session};
//!
//! # async fn demo() -> Result<(), chatgate::session::SessionError> {
//! let session = Session::builder(Credentials::new("alice", "irc.example.org"))
//!     .on_event(|event| println!("{}", event.kind.as_str()))
//!     .build();
//! session.connect().await?;
//! session.join("#rust").await?;
//! session.send("#rust", chatgate::session::MessageKind::Message, &"hello".into()).await?;
//! # Ok(())
//! # }
//! ```

use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde_json::Value;
use tokio::{
    sync::{oneshot, watch},
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::{
    activity::{Activity, ActivityError},
    bus::Signal,
    command::Command,
    config::SessionConfig,
    credentials::Credentials,
    event::{ActivityType, NormalizedEvent, is_room_name},
    metrics,
};

mod error;
mod hooks;
mod jobs;
mod lifecycle;
mod routing;
mod state;
mod tasks;
pub mod transport;

#[cfg(test)]
mod tests;

pub use error::SessionError;
pub use hooks::{
    BoxFuture,
    EventHandler,
    IdentityUpdateError,
    IdentityUpdateHandler,
    SignalObserver,
};
use hooks::SessionHooks;
use jobs::{Job, JobKind};
pub use state::LinkState;
use state::{SessionState, room_key};
pub use transport::{Connector, TcpConnector, Transport};

/// The only query object type a session answers.
pub const ATTENDANCE_QUERY: &str = "attendance";

/// How message text is delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// Plain message.
    Message,
    /// `/me` action.
    Me,
    /// Notice.
    Notice,
}

impl MessageKind {
    /// Kind named by an activity object type; anything unknown is a plain
    /// message.
    #[must_use]
    pub fn from_object_type(kind: &str) -> Self {
        match kind {
            "me" => Self::Me,
            "notice" => Self::Notice,
            _ => Self::Message,
        }
    }

    /// Strip a leading `/me ` or `/notice ` command from `text`, returning the
    /// kind it selects.
    #[must_use]
    pub fn classify(self, text: &str) -> (Self, &str) {
        if let Some(rest) = text.strip_prefix("/me ") {
            (Self::Me, rest)
        } else if let Some(rest) = text.strip_prefix("/notice ") {
            (Self::Notice, rest)
        } else {
            (self, text)
        }
    }

    fn command(self, target: &str, text: &str) -> Command {
        let target = target.to_owned();
        let text = text.to_owned();
        match self {
            Self::Message => Command::Privmsg { target, text },
            Self::Me => Command::Action { target, text },
            Self::Notice => Command::Notice { target, text },
        }
    }
}

pub(crate) struct SessionInner {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    hooks: SessionHooks,
    state: Mutex<SessionState>,
    link_state: watch::Sender<LinkState>,
}

impl SessionInner {
    /// Lock the session state. Never held across an await.
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(link) = state.link.take() {
            link.close();
        }
        metrics::dec_sessions();
    }
}

/// Builder for [`Session`].
pub struct SessionBuilder {
    credentials: Credentials,
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    hooks: SessionHooks,
}

impl SessionBuilder {
    /// Start a builder for the identity described by `credentials`.
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            config: SessionConfig::default(),
            connector: Arc::new(TcpConnector),
            hooks: SessionHooks::default(),
        }
    }

    /// Replace the timeouts and limits.
    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Open connections through `connector` instead of TCP.
    #[must_use]
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    /// Deliver events that do not complete an action to `handler`.
    #[must_use]
    pub fn on_event<F>(mut self, handler: F) -> Self
    where
        F: Fn(NormalizedEvent) + Send + Sync + 'static,
    {
        self.hooks.on_event = Some(Arc::new(handler));
        self
    }

    /// Persist renamed credentials through `handler`.
    #[must_use]
    pub fn on_identity_update<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Credentials) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), IdentityUpdateError>> + Send + 'static,
    {
        self.hooks.on_identity_update = Some(Arc::new(move |credentials| {
            Box::pin(handler(credentials)) as BoxFuture<'static, _>
        }));
        self
    }

    /// Observe every raw signal parsed from the connection.
    #[must_use]
    pub fn on_signal<F>(mut self, observer: F) -> Self
    where
        F: Fn(&Signal) + Send + Sync + 'static,
    {
        self.hooks.on_signal = Some(Arc::new(observer));
        self
    }

    /// Create the session. No connection is opened until
    /// [`Session::connect`].
    #[must_use]
    pub fn build(self) -> Session {
        metrics::inc_sessions();
        Session {
            inner: Arc::new(SessionInner {
                config: self.config,
                connector: self.connector,
                hooks: self.hooks,
                state: Mutex::new(SessionState::new(self.credentials)),
                link_state: watch::Sender::new(LinkState::Disconnected),
            }),
        }
    }
}

/// Cloneable handle to one identity's session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("actor", &self.actor_id())
            .field("link_state", &self.link_state())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Start building a session for `credentials`.
    #[must_use]
    pub fn builder(credentials: Credentials) -> SessionBuilder { SessionBuilder::new(credentials) }

    /// Identifier of the person this session acts as.
    #[must_use]
    pub fn actor_id(&self) -> String { self.inner.lock().actor_id() }

    /// Current credentials, including any completed rename.
    #[must_use]
    pub fn credentials(&self) -> Credentials { self.inner.lock().credentials.clone() }

    /// Connection phase.
    #[must_use]
    pub fn link_state(&self) -> LinkState { *self.inner.link_state.borrow() }

    /// Rooms currently joined, sorted.
    #[must_use]
    pub fn joined_rooms(&self) -> Vec<String> {
        let mut rooms: Vec<_> = self.inner.lock().joined_rooms.iter().cloned().collect();
        rooms.sort();
        rooms
    }

    /// Actor ids whose self-echoes complete this session's actions, sorted.
    #[must_use]
    pub fn handled_actors(&self) -> Vec<String> {
        let mut actors: Vec<_> = self.inner.lock().handled_actors.iter().cloned().collect();
        actors.sort();
        actors
    }

    /// Number of actions awaiting completion.
    #[must_use]
    pub fn pending_actions(&self) -> usize { self.inner.lock().jobs.len() }

    /// Whether the session has no joined rooms and no pending actions.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        let state = self.inner.lock();
        state.joined_rooms.is_empty() && state.jobs.is_empty()
    }

    /// Number of live handles to this session.
    pub(crate) fn handle_count(&self) -> usize { Arc::strong_count(&self.inner) }

    /// Open the connection with the stored credentials, or join an attempt
    /// already in progress.
    ///
    /// # Errors
    ///
    /// Returns a connection error when the transport cannot be opened, the
    /// backend refuses registration, the attempt times out or the session is
    /// cleaned up before registration completes.
    pub async fn connect(&self) -> Result<(), SessionError> {
        let credentials = self.credentials();
        self.acquire(Some(credentials)).await
    }

    /// Join `room`. Joining a room already joined succeeds without traffic.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] before [`connect`](Self::connect)
    /// and [`SessionError::Rejected`] when the backend refuses the join.
    pub async fn join(&self, room: &str) -> Result<(), SessionError> {
        self.acquire(None).await?;
        if self.inner.lock().is_joined(room) {
            debug!(room, "already joined");
            return Ok(());
        }
        self.perform(JobKind::Join(room.to_owned()), vec![Command::Join(room.to_owned())])
            .await
    }

    /// Leave `room`. The room is forgotten immediately, without waiting for
    /// the backend to confirm.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] before [`connect`](Self::connect).
    pub async fn leave(&self, room: &str) -> Result<(), SessionError> {
        self.acquire(None).await?;
        self.inner.lock().joined_rooms.remove(&room_key(room));
        self.perform(JobKind::Leave(room.to_owned()), vec![Command::Part(room.to_owned())])
            .await
    }

    /// Send `content` to a room or person.
    ///
    /// A leading `/me ` or `/notice ` in the text overrides `kind`. Each line
    /// of multi-line text is sent as its own message.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidContent`] when `content` is not a
    /// string and [`SessionError::NotJoined`] when `target` is a room this
    /// session has not joined.
    pub async fn send(
        &self,
        target: &str,
        kind: MessageKind,
        content: &Value,
    ) -> Result<(), SessionError> {
        self.acquire(None).await?;
        let text = content.as_str().ok_or(SessionError::InvalidContent)?;
        if is_room_name(target) && !self.inner.lock().is_joined(target) {
            return Err(SessionError::NotJoined(target.to_owned()));
        }
        let (kind, text) = kind.classify(text);
        let commands = text
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| kind.command(target, line))
            .collect();
        self.perform(JobKind::Send, commands).await
    }

    /// Change this session's nick, then pass the updated credentials to the
    /// identity update handler.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::MissingTarget`] for an empty nick,
    /// [`SessionError::Rejected`] when the backend refuses it and
    /// [`SessionError::IdentityUpdate`] when persisting the change fails.
    pub async fn rename(&self, nick: &str) -> Result<(), SessionError> {
        self.acquire(None).await?;
        let nick = nick.trim();
        if nick.is_empty() {
            return Err(SessionError::MissingTarget);
        }
        let old = self.inner.lock().nick.clone();
        self.perform(
            JobKind::Rename {
                old,
                new: nick.to_owned(),
            },
            vec![Command::Nick(nick.to_owned())],
        )
        .await?;
        info!(nick, "identity renamed");
        let Some(handler) = self.inner.hooks.on_identity_update.clone() else {
            return Ok(());
        };
        handler(self.credentials())
            .await
            .map_err(|err| SessionError::IdentityUpdate(err.to_string()))
    }

    /// Set the topic of `room`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Rejected`] when the backend refuses the change.
    pub async fn set_topic(&self, room: &str, topic: &str) -> Result<(), SessionError> {
        self.acquire(None).await?;
        self.perform(
            JobKind::Topic(room.to_owned()),
            vec![Command::Topic {
                room: room.to_owned(),
                topic: topic.to_owned(),
            }],
        )
        .await
    }

    /// Request information about `room`. Only [`ATTENDANCE_QUERY`] is
    /// supported; the member listing arrives as presence events.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownQueryType`] for any other object type.
    pub async fn query(&self, room: &str, object_type: &str) -> Result<(), SessionError> {
        if object_type != ATTENDANCE_QUERY {
            return Err(SessionError::UnknownQueryType(object_type.to_owned()));
        }
        self.acquire(None).await?;
        self.perform(JobKind::Query, vec![Command::Names(room.to_owned())])
            .await
    }

    /// Close the connection; equivalent to [`cleanup`](Self::cleanup).
    ///
    /// # Errors
    ///
    /// Never fails; the `Result` keeps the signature uniform with the other
    /// actions.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.cleanup();
        Ok(())
    }

    /// Route a client activity to the matching operation.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Activity`] for malformed or unsupported
    /// activities and otherwise whatever the operation returns.
    pub async fn dispatch(&self, activity: &Activity) -> Result<(), SessionError> {
        debug!(kind = activity.kind.as_str(), "dispatching activity");
        match activity.kind {
            ActivityType::Connect => self.connect().await,
            ActivityType::Join => self.join(activity.target_name()?).await,
            ActivityType::Leave => self.leave(activity.target_name()?).await,
            ActivityType::Send => {
                let object = activity.object()?;
                let content = object.content.as_ref().unwrap_or(&Value::Null);
                self.send(
                    activity.target_name()?,
                    MessageKind::from_object_type(&object.kind),
                    content,
                )
                .await
            }
            ActivityType::Update => {
                let object = activity.object()?;
                match object.kind.as_str() {
                    "address" => {
                        let nick = activity
                            .target_name()
                            .map_err(|_| SessionError::MissingTarget)?;
                        self.rename(nick).await
                    }
                    "topic" => {
                        let topic = object
                            .content
                            .as_ref()
                            .and_then(Value::as_str)
                            .ok_or(SessionError::InvalidContent)?;
                        self.set_topic(activity.target_name()?, topic).await
                    }
                    other => Err(SessionError::UnsupportedUpdate(other.to_owned())),
                }
            }
            ActivityType::Query => {
                let object = activity.object()?;
                self.query(activity.target_name()?, &object.kind).await
            }
            ActivityType::Disconnect => self.disconnect().await,
            ActivityType::Add | ActivityType::Remove => {
                Err(ActivityError::Unsupported(activity.kind.as_str()).into())
            }
        }
    }

    /// Tear the session down: stop any connect attempt from completing, send
    /// `QUIT` and close the connection, fail pending actions and forget joined
    /// rooms and handled actors. Safe to call repeatedly.
    pub fn cleanup(&self) {
        let (jobs, link) = {
            let mut state = self.inner.lock();
            state.force_disconnect = true;
            let torn_down = state.reset();
            if *self.inner.link_state.borrow() == LinkState::Connected {
                self.inner.link_state.send_replace(LinkState::Disconnected);
            }
            torn_down
        };
        if let Some(link) = link {
            info!(actor = %self.actor_id(), "closing connection");
            link.send(&Command::Quit(String::new()));
            link.close();
        }
        for job in jobs {
            job.finish(Err(SessionError::Disconnected));
        }
    }

    /// Queue an action: write its commands and trailing sentinel, then wait
    /// for the job to complete or time out.
    async fn perform(&self, kind: JobKind, commands: Vec<Command>) -> Result<(), SessionError> {
        let max = self.inner.config.max_line_length_value();
        if let Some(line) = commands
            .iter()
            .map(Command::to_line)
            .find(|line| line.len() + 2 > max)
        {
            return Err(crate::codec::FramingError::OversizedLine {
                size: line.len() + 2,
                max,
            }
            .into());
        }

        let (completion, mut receiver) = oneshot::channel();
        let id = {
            let mut guard = self.inner.lock();
            // Reborrow so the link and the queue are borrowed as disjoint fields.
            let state = &mut *guard;
            let Some(link) = state.link.as_ref() else {
                return Err(SessionError::NotConnected);
            };
            let id = state.jobs.next_id();
            let job = Job::new(id, kind, completion);
            let delivered = commands.iter().all(|command| link.send(command))
                && link.send(&Command::Ping(job.token.clone()));
            if !delivered {
                return Err(SessionError::Disconnected);
            }
            debug!(job = id, kind = job.kind.name(), "action queued");
            state.jobs.push(job);
            id
        };

        match timeout(self.inner.config.action_timeout_value(), &mut receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SessionError::Disconnected),
            Err(_) => {
                let expired = self.inner.lock().jobs.remove(id);
                let Some(job) = expired else {
                    // Completed between the deadline and the removal.
                    return receiver.try_recv().unwrap_or(Err(SessionError::Disconnected));
                };
                warn!(job = id, kind = job.kind.name(), "action timed out, cleaning up session");
                job.finish(Err(SessionError::ActionTimeout));
                self.cleanup();
                Err(SessionError::ActionTimeout)
            }
        }
    }
}
