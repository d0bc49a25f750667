//! Metric helpers for `chatgate`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. With the `metrics` feature
//! disabled every helper compiles to a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking live sessions.
pub const SESSIONS_ACTIVE: &str = "chatgate_sessions_active";
/// Name of the counter tracking protocol lines sent and received.
pub const LINES_PROCESSED: &str = "chatgate_lines_processed_total";
/// Name of the counter tracking inbound lines with no mapping.
pub const LINES_UNRECOGNIZED: &str = "chatgate_lines_unrecognized_total";
/// Name of the counter tracking completed actions by outcome.
pub const JOBS_COMPLETED: &str = "chatgate_jobs_completed_total";
/// Name of the counter tracking heartbeat replies that matched no job.
pub const QUEUE_ANOMALIES: &str = "chatgate_queue_anomalies_total";
/// Name of the counter tracking reader task panics.
pub const READER_PANICS: &str = "chatgate_reader_panics_total";

/// Direction of line processing.
#[derive(Clone, Copy, Debug)]
pub enum Direction {
    /// Lines received from the server.
    Inbound,
    /// Lines written to the server.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), allow(dead_code, reason = "only labels metrics"))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// How a queued action finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobOutcome {
    /// Completed by an echo or heartbeat.
    Resolved,
    /// Failed by a server error reply.
    Rejected,
    /// Expired before completion.
    TimedOut,
    /// Abandoned because the link went away.
    Abandoned,
}

impl JobOutcome {
    #[cfg_attr(not(feature = "metrics"), allow(dead_code, reason = "only labels metrics"))]
    fn as_str(self) -> &'static str {
        match self {
            JobOutcome::Resolved => "resolved",
            JobOutcome::Rejected => "rejected",
            JobOutcome::TimedOut => "timed_out",
            JobOutcome::Abandoned => "abandoned",
        }
    }
}

/// Increment the live sessions gauge.
pub fn inc_sessions() {
    #[cfg(feature = "metrics")]
    gauge!(SESSIONS_ACTIVE).increment(1.0);
}

/// Decrement the live sessions gauge.
pub fn dec_sessions() {
    #[cfg(feature = "metrics")]
    gauge!(SESSIONS_ACTIVE).decrement(1.0);
}

/// Record a processed line for the given direction.
pub fn inc_lines(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(LINES_PROCESSED, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record an inbound line that produced only an unrecognized signal.
pub fn inc_unrecognized() {
    #[cfg(feature = "metrics")]
    counter!(LINES_UNRECOGNIZED).increment(1);
}

/// Record a finished action.
pub fn inc_jobs(outcome: JobOutcome) {
    #[cfg(feature = "metrics")]
    counter!(JOBS_COMPLETED, "outcome" => outcome.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = outcome;
}

/// Record a heartbeat reply whose token matched no queued action.
pub fn inc_queue_anomalies() {
    #[cfg(feature = "metrics")]
    counter!(QUEUE_ANOMALIES).increment(1);
}

/// Record a panic in a connection reader task.
pub fn inc_reader_panics() {
    #[cfg(feature = "metrics")]
    counter!(READER_PANICS).increment(1);
}
