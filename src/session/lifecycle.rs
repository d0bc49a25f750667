//! Connection lifecycle: acquisition, registration and installation.
//!
//! A session moves `Disconnected -> Connecting -> Connected` and back to
//! `Disconnected` on cleanup or link loss. Concurrent callers that find a
//! connect attempt running wait on the [`LinkState`] watch channel instead of
//! starting a second one.

use futures::{SinkExt, StreamExt};
use tokio::{sync::watch, time::timeout};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use super::{
    LinkState,
    Session,
    SessionError,
    tasks,
    transport::Transport,
};
use crate::{
    bus::Signal,
    codec::LineCodec,
    command::Command,
    config::SessionConfig,
    credentials::{AuthMethod, ConnectOptions, Credentials},
    event::NormalizedEvent,
    parser::{LineParser, ParsedLine},
};

const SASL_CAPABILITY: &str = "sasl";

/// A registered connection, ready to be handed to the session's tasks.
pub(super) struct Registration {
    pub(super) framed: Framed<Box<dyn Transport>, LineCodec>,
    pub(super) parser: LineParser,
    /// Nick confirmed by the backend.
    pub(super) nick: String,
    /// Events parsed before registration completed.
    pub(super) early_events: Vec<NormalizedEvent>,
}

/// What a caller of [`Session::acquire`] does once the state lock is released.
enum Acquisition {
    Ready,
    Wait(watch::Receiver<LinkState>),
    Establish(Credentials),
}

/// Returns the session to `Disconnected` when a connect attempt is dropped
/// before it finishes.
struct AttemptGuard<'a> {
    session: &'a Session,
    armed: bool,
}

impl<'a> AttemptGuard<'a> {
    fn new(session: &'a Session) -> Self {
        Self {
            session,
            armed: true,
        }
    }

    fn disarm(mut self) { self.armed = false; }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let inner = &self.session.inner;
        let mut state = inner.lock();
        state.force_disconnect = true;
        if *inner.link_state.borrow() == LinkState::Connecting {
            inner.link_state.send_replace(LinkState::Disconnected);
        }
        drop(state);
        warn!("connect attempt abandoned before registration completed");
    }
}

impl Session {
    /// Ensure a live connection for this session's actor.
    ///
    /// With `credentials`, a disconnected session opens a new connection;
    /// without them it fails with [`SessionError::NotConnected`].
    pub(super) async fn acquire(&self, credentials: Option<Credentials>) -> Result<(), SessionError> {
        let connecting = credentials.is_some();
        let next = {
            let mut state = self.inner.lock();
            let phase = *self.inner.link_state.borrow();
            match (phase, credentials) {
                (LinkState::Connected, _) => {
                    state.mark_handled();
                    Acquisition::Ready
                }
                (LinkState::Connecting, _) => Acquisition::Wait(self.inner.link_state.subscribe()),
                (LinkState::Disconnected, None) => return Err(SessionError::NotConnected),
                (LinkState::Disconnected, Some(credentials)) => {
                    state.force_disconnect = false;
                    state.nick.clone_from(&credentials.nick);
                    state.credentials = credentials.clone();
                    self.inner.link_state.send_replace(LinkState::Connecting);
                    Acquisition::Establish(credentials)
                }
            }
        };

        let mut phases = match next {
            Acquisition::Ready => return Ok(()),
            Acquisition::Establish(credentials) => return self.establish(credentials).await,
            Acquisition::Wait(phases) => phases,
        };

        debug!("connect already in progress, waiting");
        let waited = timeout(
            self.inner.config.connect_wait_value(),
            phases.wait_for(|phase| *phase != LinkState::Connecting),
        )
        .await;
        let phase = match waited {
            Err(_) => return Err(SessionError::ConnectInProgress),
            Ok(Err(_)) => LinkState::Disconnected,
            Ok(Ok(phase)) => *phase,
        };
        match phase {
            LinkState::Connected => {
                self.inner.lock().mark_handled();
                Ok(())
            }
            _ if connecting => Err(SessionError::ConnectFailed(
                "concurrent connect attempt failed".to_owned(),
            )),
            _ => Err(SessionError::NotConnected),
        }
    }

    async fn establish(&self, credentials: Credentials) -> Result<(), SessionError> {
        let options = credentials.connect_options();
        let config = &self.inner.config;
        let guard = AttemptGuard::new(self);
        let attempt = async {
            let transport = self
                .inner
                .connector
                .connect(&options)
                .await
                .map_err(|err| SessionError::ConnectFailed(err.to_string()))?;
            register(transport, &options, config).await
        };
        let result = match timeout(config.connect_timeout_value(), attempt).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::ConnectTimeout),
        };
        guard.disarm();

        match result {
            Ok(registration) => self.install(registration),
            Err(err) => {
                let mut state = self.inner.lock();
                state.force_disconnect = true;
                self.inner.link_state.send_replace(LinkState::Disconnected);
                drop(state);
                warn!(host = %options.host, error = %err, "connect failed");
                Err(err)
            }
        }
    }

    /// Hand a registered connection to fresh reader and writer tasks, unless
    /// the session was torn down while registering.
    fn install(&self, registration: Registration) -> Result<(), SessionError> {
        let Registration {
            framed,
            parser,
            nick,
            early_events,
        } = registration;
        let mut state = self.inner.lock();
        if state.force_disconnect {
            self.inner.link_state.send_replace(LinkState::Disconnected);
            drop(state);
            warn!("session cleaned up during registration, dropping connection");
            drop(framed);
            return Err(SessionError::ForceDisconnect);
        }

        state.generation += 1;
        let generation = state.generation;
        state.nick = nick;
        state.mark_handled();
        let link = tasks::spawn(
            framed,
            parser,
            &self.inner,
            generation,
            self.inner.config.outbound_rate_value(),
        );
        state.link = Some(link);
        self.inner.link_state.send_replace(LinkState::Connected);
        let actor = state.actor_id();
        drop(state);

        info!(%actor, "connected");
        for event in early_events {
            self.inner.hooks.forward(event);
        }
        Ok(())
    }
}

/// Perform capability negotiation and registration on a fresh transport.
async fn register(
    transport: Box<dyn Transport>,
    options: &ConnectOptions,
    config: &SessionConfig,
) -> Result<Registration, SessionError> {
    let mut framed = Framed::new(transport, LineCodec::new(config.max_line_length_value()));
    let mut parser = LineParser::new(config.context_value(), options.host.as_str());
    let sasl_payload = options.sasl_plain_payload();

    if let Some(auth) = options
        .auth
        .as_ref()
        .filter(|auth| auth.method == AuthMethod::Password)
    {
        framed.send(Command::Pass(auth.secret.clone()).to_line()).await?;
    }
    if sasl_payload.is_some() {
        framed
            .send(Command::CapReq(SASL_CAPABILITY.to_owned()).to_line())
            .await?;
    }
    framed.send(Command::Nick(options.nick.clone()).to_line()).await?;
    framed
        .send(
            Command::User {
                username: options.nick.clone(),
                real_name: options.real_name.clone(),
            }
            .to_line(),
        )
        .await?;

    let mut early_events = Vec::new();
    loop {
        let line = match framed.next().await {
            Some(Ok(line)) => line,
            Some(Err(err)) => return Err(SessionError::ConnectFailed(err.to_string())),
            None => {
                return Err(SessionError::ConnectFailed(
                    "connection closed during registration".to_owned(),
                ));
            }
        };
        let mut signals = Vec::new();
        parser.input(&line, &mut signals);
        for signal in signals {
            match signal {
                Signal::HeartbeatRequest { token, .. } => {
                    framed.send(Command::Pong(token).to_line()).await?;
                }
                Signal::Registered { nick } => {
                    debug!(%nick, "registration confirmed");
                    return Ok(Registration {
                        framed,
                        parser,
                        nick,
                        early_events,
                    });
                }
                Signal::Error(event) => {
                    return Err(SessionError::ConnectFailed(
                        event
                            .error
                            .unwrap_or_else(|| "registration rejected".to_owned()),
                    ));
                }
                Signal::Incoming(event) => early_events.push(event),
                Signal::HeartbeatResponse { .. } => {}
                Signal::Unrecognized(raw) => {
                    negotiate(&raw, sasl_payload.as_deref(), &mut framed).await?;
                }
            }
        }
    }
}

/// Answer one step of SASL capability negotiation.
async fn negotiate(
    raw: &str,
    sasl_payload: Option<&str>,
    framed: &mut Framed<Box<dyn Transport>, LineCodec>,
) -> Result<(), SessionError> {
    let (Some(payload), Some(line)) = (sasl_payload, ParsedLine::parse(raw)) else {
        return Ok(());
    };
    let reply = match (line.code, line.param(1)) {
        ("CAP", Some("ACK")) if line.content_or_last().is_some_and(|caps| {
            caps.split_whitespace().any(|cap| cap == SASL_CAPABILITY)
        }) =>
        {
            Command::Authenticate("PLAIN".to_owned())
        }
        ("CAP", Some("NAK")) => {
            return Err(SessionError::ConnectFailed(
                "server does not support SASL".to_owned(),
            ));
        }
        ("AUTHENTICATE", _) if line.param(0) == Some("+") => {
            Command::Authenticate(payload.to_owned())
        }
        ("903", _) => Command::CapEnd,
        _ => return Ok(()),
    };
    framed.send(reply.to_line()).await?;
    Ok(())
}
