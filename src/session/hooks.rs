//! Callbacks a session uses to reach its collaborators.

use std::{future::Future, pin::Pin, sync::Arc};

use crate::{bus::Signal, credentials::Credentials, event::NormalizedEvent};

/// A boxed future that is `Send` with a specified lifetime.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Error returned by an identity update handler.
pub type IdentityUpdateError = Box<dyn std::error::Error + Send + Sync>;

/// Handler receiving every event forwarded to the session's client.
///
/// Called from the connection's reader task; it must not block.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use chatgate::session::EventHandler;
///
/// let handler: EventHandler = Arc::new(|event| println!("{}", event.kind.as_str()));
/// ```
pub type EventHandler = Arc<dyn Fn(NormalizedEvent) + Send + Sync>;

/// Handler persisting credentials after a successful rename.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use chatgate::session::IdentityUpdateHandler;
///
/// let handler: IdentityUpdateHandler = Arc::new(|credentials| {
///     Box::pin(async move {
///         println!("now known as {}", credentials.nick);
///         Ok(())
///     })
/// });
/// ```
pub type IdentityUpdateHandler = Arc<
    dyn Fn(Credentials) -> BoxFuture<'static, Result<(), IdentityUpdateError>> + Send + Sync,
>;

/// Observer subscribed to every connection's signal bus.
pub type SignalObserver = Arc<dyn Fn(&Signal) + Send + Sync>;

#[derive(Clone, Default)]
#[expect(
    clippy::struct_field_names,
    reason = "on_ prefix is idiomatic for callback fields"
)]
pub(crate) struct SessionHooks {
    pub(crate) on_event: Option<EventHandler>,
    pub(crate) on_identity_update: Option<IdentityUpdateHandler>,
    pub(crate) on_signal: Option<SignalObserver>,
}

impl SessionHooks {
    pub(crate) fn forward(&self, event: NormalizedEvent) {
        match &self.on_event {
            Some(handler) => handler(event),
            None => tracing::trace!(kind = event.kind.as_str(), "no event handler, dropping event"),
        }
    }
}
