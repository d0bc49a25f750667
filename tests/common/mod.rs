//! Shared utilities for integration tests.
//!
//! Provides a harness that connects a [`Session`] to an in-memory server and
//! collects every event the session forwards to its client.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use chatgate::{
    NormalizedEvent,
    config::SessionConfig,
    credentials::Credentials,
    session::{Session, SessionBuilder},
};
pub use chatgate_testing::TestResult;
use chatgate_testing::{MockBackend, MockServer, lines, mock_backend};
use tokio::sync::mpsc;

pub const NICK: &str = "me";
pub const HOST: &str = lines::SERVER;

/// A connected session with its server and collected events.
pub struct Harness {
    pub session: Session,
    pub server: MockServer,
    pub backend: MockBackend,
    pub events: mpsc::UnboundedReceiver<NormalizedEvent>,
}

impl Harness {
    /// Complete the queued action whose sentinel the server reads next.
    pub async fn ack_next(&mut self) -> TestResult<String> {
        let token = self.server.read_ping().await?;
        self.server.send_line(lines::pong(&token)).await?;
        Ok(token)
    }

    /// Join `room`, answering with an echo.
    pub async fn join(&mut self, room: &str) -> TestResult {
        let session = self.session.clone();
        let owned = room.to_owned();
        let joining = tokio::spawn(async move { session.join(&owned).await });
        assert_eq!(self.server.read_line().await?, format!("JOIN {room}"));
        self.server.read_ping().await?;
        self.server.send_line(lines::join(NICK, room)).await?;
        joining.await??;
        Ok(())
    }
}

/// Session builder for the test identity, forwarding events to `events`.
pub fn builder(events: mpsc::UnboundedSender<NormalizedEvent>) -> SessionBuilder {
    Session::builder(Credentials::new(NICK, HOST)).on_event(move |event| {
        let _ = events.send(event);
    })
}

/// Connect a session customized by `configure` and complete registration.
pub async fn connected_with(
    configure: impl FnOnce(SessionBuilder) -> SessionBuilder,
) -> TestResult<Harness> {
    let (connector, mut backend) = mock_backend();
    let (tx, events) = mpsc::unbounded_channel();
    let session = configure(builder(tx).connector(connector)).build();

    let connecting = {
        let session = session.clone();
        tokio::spawn(async move { session.connect().await })
    };
    let mut server = backend.accept().await.ok_or("no connection attempt")?;
    server.register(NICK).await?;
    connecting.await??;

    Ok(Harness {
        session,
        server,
        backend,
        events,
    })
}

/// Connect a session with `config`.
pub async fn connected(config: SessionConfig) -> TestResult<Harness> {
    connected_with(|builder| builder.config(config)).await
}
