//! FIFO correlation of queued actions with their completions.
//!
//! The backend gives no request identifiers, so every action is queued in
//! issue order and completed from the head. Each job owns a sentinel token
//! sent as the argument of its trailing `PING`; the matching `PONG` proves the
//! backend has processed everything up to and including that job.

use std::collections::{HashSet, VecDeque};

use tokio::sync::oneshot;

use super::SessionError;
use crate::{
    event::{ActivityObject, ActivityType, EntityKind, NormalizedEvent},
    metrics::{self, JobOutcome},
};

pub(crate) type Completion = oneshot::Sender<Result<(), SessionError>>;

/// What a queued action does, and the state change applied when it
/// completes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum JobKind {
    Join(String),
    Leave(String),
    Send,
    Rename { old: String, new: String },
    Topic(String),
    Query,
}

fn targets_room(event: &NormalizedEvent, room: &str) -> bool {
    event.target.as_ref().is_some_and(|target| {
        target.kind == EntityKind::Room
            && target
                .name
                .as_deref()
                .is_some_and(|name| name.eq_ignore_ascii_case(room))
    })
}

impl JobKind {
    pub(crate) const fn name(&self) -> &'static str {
        match self {
            Self::Join(_) => "join",
            Self::Leave(_) => "leave",
            Self::Send => "send",
            Self::Rename { .. } => "rename",
            Self::Topic(_) => "topic",
            Self::Query => "query",
        }
    }

    /// Whether `event` is the backend's echo of this action.
    ///
    /// Sends and queries produce no echo and complete only via their
    /// sentinel.
    pub(crate) fn completed_by(&self, event: &NormalizedEvent) -> bool {
        match self {
            Self::Join(room) => event.kind == ActivityType::Join && targets_room(event, room),
            Self::Leave(room) => event.kind == ActivityType::Leave && targets_room(event, room),
            Self::Rename { old, .. } => {
                event.kind == ActivityType::Update
                    && matches!(event.object, Some(ActivityObject::Address))
                    && event
                        .actor
                        .name
                        .as_deref()
                        .is_some_and(|nick| nick.eq_ignore_ascii_case(old))
            }
            Self::Topic(room) => {
                event.kind == ActivityType::Update
                    && matches!(event.object, Some(ActivityObject::Topic { .. }))
                    && targets_room(event, room)
            }
            Self::Send | Self::Query => false,
        }
    }
}

/// One outstanding action.
#[derive(Debug)]
pub(crate) struct Job {
    pub(crate) id: u64,
    pub(crate) token: String,
    pub(crate) kind: JobKind,
    completion: Completion,
}

impl Job {
    pub(crate) fn new(id: u64, kind: JobKind, completion: Completion) -> Self {
        Self {
            id,
            token: format!("sentinel-{id}"),
            kind,
            completion,
        }
    }

    /// Deliver `result` to the waiting caller.
    ///
    /// A caller that already gave up has dropped its receiver; the result is
    /// discarded.
    pub(crate) fn finish(self, result: Result<(), SessionError>) {
        let outcome = match &result {
            Ok(()) => JobOutcome::Resolved,
            Err(SessionError::Rejected(_)) => JobOutcome::Rejected,
            Err(SessionError::ActionTimeout) => JobOutcome::TimedOut,
            Err(_) => JobOutcome::Abandoned,
        };
        metrics::inc_jobs(outcome);
        tracing::debug!(job = self.id, kind = self.kind.name(), ?outcome, "action finished");
        let _ = self.completion.send(result);
    }
}

/// Strict FIFO of outstanding actions.
#[derive(Debug, Default)]
pub(crate) struct JobQueue {
    jobs: VecDeque<Job>,
    /// Sentinels of jobs completed by an echo whose `PONG` is still due.
    retired: HashSet<String>,
    /// Sentinel of the last rejected job; errors before it returns belong to
    /// that job.
    rejected: Option<String>,
    next_id: u64,
}

impl JobQueue {
    pub(crate) fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub(crate) fn push(&mut self, job: Job) { self.jobs.push_back(job); }

    pub(crate) fn len(&self) -> usize { self.jobs.len() }

    pub(crate) fn is_empty(&self) -> bool { self.jobs.is_empty() }

    /// Pop the head when `accept` approves it, retiring its sentinel.
    pub(crate) fn pop_head_if(&mut self, accept: impl FnOnce(&Job) -> bool) -> Option<Job> {
        if !accept(self.jobs.front()?) {
            return None;
        }
        let job = self.jobs.pop_front()?;
        self.retired.insert(job.token.clone());
        Some(job)
    }

    /// Pop every job from the head through the one owning `token`.
    ///
    /// Returns `None`, leaving the queue untouched, when no queued job owns
    /// the token.
    pub(crate) fn pop_through(&mut self, token: &str) -> Option<Vec<Job>> {
        let position = self.jobs.iter().position(|job| job.token == token)?;
        Some(self.jobs.drain(..=position).collect())
    }

    /// Pop the head after the backend rejected it.
    ///
    /// Until the head's sentinel returns, [`JobQueue::absorbs_errors`] reports
    /// that further errors are trailing replies to the rejected action.
    pub(crate) fn reject_head(&mut self) -> Option<Job> {
        let job = self.pop_head_if(|_| true)?;
        self.rejected = Some(job.token.clone());
        Some(job)
    }

    /// Whether a rejected job's sentinel is still outstanding.
    pub(crate) fn absorbs_errors(&self) -> bool { self.rejected.is_some() }

    /// Forget a retired sentinel, returning whether it was known.
    pub(crate) fn take_retired(&mut self, token: &str) -> bool {
        if self.rejected.as_deref() == Some(token) {
            self.rejected = None;
        }
        self.retired.remove(token)
    }

    /// Remove a job wherever it sits, for example after its caller timed out.
    pub(crate) fn remove(&mut self, id: u64) -> Option<Job> {
        let position = self.jobs.iter().position(|job| job.id == id)?;
        self.jobs.remove(position)
    }

    /// Remove every job in queue order.
    pub(crate) fn drain(&mut self) -> Vec<Job> {
        self.retired.clear();
        self.rejected = None;
        self.jobs.drain(..).collect()
    }
}
