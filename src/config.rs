//! Session configuration.
//!
//! [`SessionConfig`] holds the timeouts and limits that govern one session's
//! connection. Every setter consumes and returns the config so values can be
//! chained from [`SessionConfig::default`].

use std::{num::NonZeroU32, time::Duration};

use crate::codec::MAX_LINE_LENGTH;

/// Default hard limit on connecting and registering.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default limit on waiting for another caller's connect attempt.
pub const DEFAULT_CONNECT_WAIT: Duration = Duration::from_secs(30);
/// Default limit on a queued action awaiting its completion.
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(30);
/// Default `context` field of emitted events.
pub const DEFAULT_CONTEXT: &str = "irc";

/// Timeouts and limits for a session.
///
/// # Examples
///
/// ```
/// use std::{num::NonZeroU32, time::Duration};
///
/// use chatgate::config::SessionConfig;
///
/// let config = SessionConfig::default()
///     .connect_timeout(Duration::from_secs(10))
///     .outbound_rate(NonZeroU32::new(2));
/// assert_eq!(config.connect_timeout_value(), Duration::from_secs(10));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    connect_timeout: Duration,
    connect_wait: Duration,
    action_timeout: Duration,
    max_line_length: usize,
    outbound_rate: Option<NonZeroU32>,
    context: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            connect_wait: DEFAULT_CONNECT_WAIT,
            action_timeout: DEFAULT_ACTION_TIMEOUT,
            max_line_length: MAX_LINE_LENGTH,
            outbound_rate: None,
            context: DEFAULT_CONTEXT.to_owned(),
        }
    }
}

impl SessionConfig {
    /// Limit on opening the transport and completing registration.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Limit on waiting for a connect attempt started by another caller.
    #[must_use]
    pub fn connect_wait(mut self, timeout: Duration) -> Self {
        self.connect_wait = timeout;
        self
    }

    /// Limit on a queued action awaiting its echo or heartbeat.
    #[must_use]
    pub fn action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }

    /// Maximum inbound and outbound line length in bytes.
    #[must_use]
    pub fn max_line_length(mut self, length: usize) -> Self {
        self.max_line_length = length;
        self
    }

    /// Outbound lines per second; `None` disables rate limiting.
    #[must_use]
    pub fn outbound_rate(mut self, rate: Option<NonZeroU32>) -> Self {
        self.outbound_rate = rate;
        self
    }

    /// `context` field stamped on emitted events.
    #[must_use]
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Configured connect timeout.
    #[must_use]
    pub fn connect_timeout_value(&self) -> Duration { self.connect_timeout }

    /// Configured connect wait.
    #[must_use]
    pub fn connect_wait_value(&self) -> Duration { self.connect_wait }

    /// Configured action timeout.
    #[must_use]
    pub fn action_timeout_value(&self) -> Duration { self.action_timeout }

    /// Configured line length limit.
    #[must_use]
    pub fn max_line_length_value(&self) -> usize { self.max_line_length }

    /// Configured outbound rate.
    #[must_use]
    pub fn outbound_rate_value(&self) -> Option<NonZeroU32> { self.outbound_rate }

    /// Configured event context.
    #[must_use]
    pub fn context_value(&self) -> &str { &self.context }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_mirror_connect_timeout() {
        let config = SessionConfig::default();
        assert_eq!(config.action_timeout_value(), config.connect_timeout_value());
        assert_eq!(config.context_value(), DEFAULT_CONTEXT);
        assert!(config.outbound_rate_value().is_none());
    }

    #[test]
    fn setters_chain() {
        let config = SessionConfig::default()
            .action_timeout(Duration::from_millis(50))
            .connect_wait(Duration::from_secs(1))
            .max_line_length(1024)
            .context("chat");
        assert_eq!(config.action_timeout_value(), Duration::from_millis(50));
        assert_eq!(config.connect_wait_value(), Duration::from_secs(1));
        assert_eq!(config.max_line_length_value(), 1024);
        assert_eq!(config.context_value(), "chat");
    }
}
