//! Routing of parsed signals to queued actions or the client.
//!
//! Heartbeat replies complete actions through their sentinel token.
//! Completion-shaped events from one of the session's own actors complete the
//! head of the queue when they echo it, and protocol errors addressed to the
//! session reject the head. Errors that follow a rejection, up to the rejected
//! action's sentinel, are trailing replies to it. Everything else is
//! forwarded to the client.

use chrono::Utc;
use tracing::{debug, trace, warn};

use super::{
    LinkState,
    Session,
    SessionError,
    jobs::{Job, JobKind},
    state::SessionState,
};
use crate::{
    bus::Signal,
    command::Command,
    event::{ActivityObject, ActivityType, Entity, NormalizedEvent},
    metrics,
};

const DEFAULT_REJECTION: &str = "action rejected by server";

impl Session {
    /// Route one signal, forwarding any resulting event outside the lock.
    pub(super) fn route(&self, signal: Signal) {
        let forward = route(&mut self.inner.lock(), signal);
        if let Some(event) = forward {
            self.inner.hooks.forward(event);
        }
    }

    /// Handle the loss of the connection identified by `generation`.
    ///
    /// Losses reported by tasks of an older connection are ignored.
    pub(super) fn on_link_lost(&self, generation: u64, reason: &str) {
        let (jobs, notice) = {
            let mut state = self.inner.lock();
            if state
                .link
                .as_ref()
                .is_none_or(|link| link.generation != generation)
            {
                return;
            }
            let (jobs, _link) = state.reset();
            self.inner.link_state.send_replace(LinkState::Disconnected);
            let notice = (!state.force_disconnect).then(|| {
                let host = state.host();
                let mut event = NormalizedEvent::new(
                    self.inner.config.context_value(),
                    ActivityType::Disconnect,
                    Entity::service(host),
                )
                .with_target(Entity::person(&state.nick, host))
                .with_error(reason);
                event.stamp_published(Utc::now());
                event
            });
            (jobs, notice)
        };
        warn!(reason, pending = jobs.len(), "connection lost");
        for job in jobs {
            job.finish(Err(SessionError::Disconnected));
        }
        if let Some(event) = notice {
            self.inner.hooks.forward(event);
        }
    }
}

fn resolve(state: &mut SessionState, jobs: Vec<Job>) {
    for job in jobs {
        state.apply(&job.kind);
        job.finish(Ok(()));
    }
}

/// Route `signal` against `state`, returning the event to forward, if any.
pub(super) fn route(state: &mut SessionState, signal: Signal) -> Option<NormalizedEvent> {
    match signal {
        Signal::HeartbeatRequest { token, .. } => {
            if let Some(link) = &state.link {
                link.send(&Command::Pong(token.clone()));
            }
            match state.jobs.pop_through(&token) {
                Some(jobs) => resolve(state, jobs),
                None => trace!(%token, "answered server heartbeat"),
            }
            None
        }
        Signal::HeartbeatResponse { token, .. } => {
            if let Some(jobs) = state.jobs.pop_through(&token) {
                resolve(state, jobs);
            } else if state.jobs.take_retired(&token) {
                trace!(%token, "sentinel of an echoed action");
            } else {
                warn!(%token, pending = state.jobs.len(), "heartbeat reply matched no queued action");
                metrics::inc_queue_anomalies();
            }
            None
        }
        Signal::Registered { nick } => {
            debug!(%nick, "registration confirmed again");
            None
        }
        Signal::Incoming(event) => route_incoming(state, event),
        Signal::Error(event) => {
            if !state.handled_actors.contains(&event.actor.id) {
                return Some(event);
            }
            if state.jobs.absorbs_errors() {
                debug!(error = ?event.error, "further error for an already rejected action");
                return None;
            }
            let Some(job) = state.jobs.reject_head() else {
                debug!(error = ?event.error, "error for this session with no queued action");
                return Some(event);
            };
            let message = event
                .error
                .unwrap_or_else(|| DEFAULT_REJECTION.to_owned());
            job.finish(Err(SessionError::Rejected(message)));
            None
        }
        Signal::Unrecognized(line) => {
            trace!(%line, "ignoring unrecognized line");
            None
        }
    }
}

fn route_incoming(state: &mut SessionState, event: NormalizedEvent) -> Option<NormalizedEvent> {
    if !state.handled_actors.contains(&event.actor.id) || !event.is_completion_shaped() {
        return Some(event);
    }
    if let Some(job) = state.jobs.pop_head_if(|job| job.kind.completed_by(&event)) {
        state.apply(&job.kind);
        job.finish(Ok(()));
        return None;
    }
    debug!(kind = event.kind.as_str(), "self event completes no queued action");
    // A rename the backend imposed still changes who this session is.
    if event.kind == ActivityType::Update && matches!(event.object, Some(ActivityObject::Address)) {
        let new = event.target.as_ref().and_then(|target| target.name.clone());
        if let (Some(old), Some(new)) = (event.actor.name.clone(), new) {
            state.apply(&JobKind::Rename { old, new });
        }
    }
    Some(event)
}
