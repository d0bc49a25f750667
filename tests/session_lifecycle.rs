//! Connection lifecycle: registration, coalesced connects, teardown and
//! link loss.

mod common;

use std::time::Duration;

use chatgate::{
    ActivityType,
    EntityKind,
    config::SessionConfig,
    credentials::{AuthMethod, Credentials},
    session::{LinkState, Session, SessionError},
};
use chatgate_testing::{lines, mock_backend};
use common::{HOST, NICK, TestResult, builder, connected};
use tokio::sync::mpsc;

#[tokio::test]
async fn registration_sends_nick_and_user() -> TestResult {
    let (connector, mut backend) = mock_backend();
    let (tx, _events) = mpsc::unbounded_channel();
    let session = builder(tx).connector(connector).build();
    assert_eq!(session.link_state(), LinkState::Disconnected);

    let connecting = {
        let session = session.clone();
        tokio::spawn(async move { session.connect().await })
    };
    let mut server = backend.accept().await.ok_or("no connection attempt")?;
    let sent = server.register(NICK).await?;
    connecting.await??;

    assert_eq!(sent, vec![format!("NICK {NICK}"), format!("USER {NICK} 0 * :{NICK}")]);
    assert_eq!(session.link_state(), LinkState::Connected);
    assert_eq!(session.handled_actors(), vec![format!("{NICK}@{HOST}")]);
    Ok(())
}

#[tokio::test]
async fn password_is_sent_before_nick() -> TestResult {
    let (connector, mut backend) = mock_backend();
    let mut credentials = Credentials::new(NICK, HOST);
    credentials.auth_method = Some(AuthMethod::Password);
    credentials.auth_secret = Some("hunter2".to_owned());
    let session = Session::builder(credentials).connector(connector).build();

    let connecting = tokio::spawn(async move { session.connect().await });
    let mut server = backend.accept().await.ok_or("no connection attempt")?;
    let sent = server.register(NICK).await?;
    connecting.await??;

    assert_eq!(sent.first().map(String::as_str), Some("PASS :hunter2"));
    Ok(())
}

#[tokio::test]
async fn sasl_plain_negotiation() -> TestResult {
    let (connector, mut backend) = mock_backend();
    let mut credentials = Credentials::new(NICK, HOST);
    credentials.auth_method = Some(AuthMethod::SaslPlain);
    credentials.auth_secret = Some("hunter2".to_owned());
    let payload = credentials
        .connect_options()
        .sasl_plain_payload()
        .ok_or("no payload")?;
    let session = Session::builder(credentials).connector(connector).build();

    let connecting = tokio::spawn(async move { session.connect().await });
    let mut server = backend.accept().await.ok_or("no connection attempt")?;
    assert_eq!(server.read_line().await?, "CAP REQ :sasl");
    server.read_until("USER ").await?;
    server
        .send_line(format!(":{} CAP * ACK :sasl", lines::SERVER))
        .await?;
    assert_eq!(server.read_line().await?, "AUTHENTICATE PLAIN");
    server.send_line("AUTHENTICATE +").await?;
    assert_eq!(server.read_line().await?, format!("AUTHENTICATE {payload}"));
    server
        .send_line(format!(
            ":{} 903 {NICK} :SASL authentication successful",
            lines::SERVER
        ))
        .await?;
    assert_eq!(server.read_line().await?, "CAP END");
    server.send_line(lines::welcome(NICK)).await?;

    connecting.await??;
    Ok(())
}

#[tokio::test]
async fn actions_before_connect_fail() -> TestResult {
    let (connector, backend) = mock_backend();
    let (tx, _events) = mpsc::unbounded_channel();
    let session = builder(tx).connector(connector).build();

    assert!(matches!(
        session.join("#test").await,
        Err(SessionError::NotConnected)
    ));
    assert_eq!(backend.attempts(), 0);
    Ok(())
}

#[tokio::test]
async fn refused_connection_fails_connect() -> TestResult {
    let (connector, backend) = mock_backend();
    let (tx, _events) = mpsc::unbounded_channel();
    let session = builder(tx).connector(connector.refusing()).build();

    let result = session.connect().await;

    assert!(matches!(result, Err(SessionError::ConnectFailed(_))));
    assert_eq!(session.link_state(), LinkState::Disconnected);
    assert_eq!(backend.attempts(), 1);
    Ok(())
}

#[tokio::test]
async fn registration_error_fails_connect() -> TestResult {
    let (connector, mut backend) = mock_backend();
    let (tx, _events) = mpsc::unbounded_channel();
    let session = builder(tx).connector(connector).build();

    let connecting = {
        let session = session.clone();
        tokio::spawn(async move { session.connect().await })
    };
    let mut server = backend.accept().await.ok_or("no connection attempt")?;
    server.read_until("USER ").await?;
    server
        .send_line(lines::numeric_error(
            "433",
            "*",
            NICK,
            "Nickname is already in use",
        ))
        .await?;

    let result = connecting.await?;
    assert!(
        matches!(&result, Err(SessionError::ConnectFailed(text)) if text == "Nickname is already in use"),
        "unexpected result: {result:?}"
    );
    assert_eq!(session.link_state(), LinkState::Disconnected);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn silent_server_times_out_connect() -> TestResult {
    let (connector, mut backend) = mock_backend();
    let (tx, _events) = mpsc::unbounded_channel();
    let session = builder(tx)
        .connector(connector)
        .config(SessionConfig::default().connect_timeout(Duration::from_secs(2)))
        .build();

    let connecting = {
        let session = session.clone();
        tokio::spawn(async move { session.connect().await })
    };
    let _server = backend.accept().await.ok_or("no connection attempt")?;

    assert!(matches!(
        connecting.await?,
        Err(SessionError::ConnectTimeout)
    ));
    assert_eq!(session.link_state(), LinkState::Disconnected);
    Ok(())
}

#[tokio::test]
async fn concurrent_connects_share_one_attempt() -> TestResult {
    let (connector, mut backend) = mock_backend();
    let (tx, _events) = mpsc::unbounded_channel();
    let session = builder(tx).connector(connector).build();

    let first = {
        let session = session.clone();
        tokio::spawn(async move { session.connect().await })
    };
    let mut server = backend.accept().await.ok_or("no connection attempt")?;
    let second = {
        let session = session.clone();
        tokio::spawn(async move { session.connect().await })
    };
    tokio::task::yield_now().await;
    server.register(NICK).await?;

    first.await??;
    second.await??;
    assert_eq!(backend.attempts(), 1);
    assert_eq!(session.link_state(), LinkState::Connected);
    Ok(())
}

#[tokio::test]
async fn abandoned_connect_allows_a_fresh_attempt() -> TestResult {
    let (connector, mut backend) = mock_backend();
    let (tx, _events) = mpsc::unbounded_channel();
    let session = builder(tx).connector(connector).build();

    let abandoned = {
        let session = session.clone();
        tokio::spawn(async move { session.connect().await })
    };
    let _stalled = backend.accept().await.ok_or("no connection attempt")?;
    assert_eq!(session.link_state(), LinkState::Connecting);
    abandoned.abort();
    assert!(abandoned.await.is_err_and(|err| err.is_cancelled()));
    assert_eq!(session.link_state(), LinkState::Disconnected);

    let retry = {
        let session = session.clone();
        tokio::spawn(async move { session.connect().await })
    };
    let mut server = backend.accept().await.ok_or("no second connection attempt")?;
    server.register(NICK).await?;
    retry.await??;
    assert_eq!(backend.attempts(), 2);
    assert_eq!(session.link_state(), LinkState::Connected);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn waiting_on_slow_connect_reports_in_progress() -> TestResult {
    let (connector, mut backend) = mock_backend();
    let (tx, _events) = mpsc::unbounded_channel();
    let session = builder(tx)
        .connector(connector)
        .config(
            SessionConfig::default()
                .connect_timeout(Duration::from_secs(60))
                .connect_wait(Duration::from_secs(1)),
        )
        .build();

    let _connecting = {
        let session = session.clone();
        tokio::spawn(async move { session.connect().await })
    };
    let _server = backend.accept().await.ok_or("no connection attempt")?;

    let error = session.join("#test").await.err().ok_or("join succeeded")?;
    assert!(matches!(error, SessionError::ConnectInProgress));
    assert!(error.is_retryable());
    Ok(())
}

#[tokio::test]
async fn cleanup_during_registration_aborts_connect() -> TestResult {
    let (connector, mut backend) = mock_backend();
    let (tx, _events) = mpsc::unbounded_channel();
    let session = builder(tx).connector(connector).build();

    let connecting = {
        let session = session.clone();
        tokio::spawn(async move { session.connect().await })
    };
    let mut server = backend.accept().await.ok_or("no connection attempt")?;
    server.read_until("USER ").await?;
    session.cleanup();
    server.send_line(lines::welcome(NICK)).await?;

    assert!(matches!(
        connecting.await?,
        Err(SessionError::ForceDisconnect)
    ));
    assert_eq!(session.link_state(), LinkState::Disconnected);
    Ok(())
}

#[tokio::test]
async fn cleanup_is_idempotent_and_allows_reconnect() -> TestResult {
    let mut h = connected(SessionConfig::default()).await?;
    h.join("#test").await?;

    h.session.cleanup();
    h.session.cleanup();

    assert_eq!(h.session.link_state(), LinkState::Disconnected);
    assert!(h.session.joined_rooms().is_empty());
    assert!(h.session.handled_actors().is_empty());
    assert_eq!(h.server.read_line().await?, "QUIT :");
    assert!(h.server.read_line().await.is_err());
    // A deliberate teardown is not reported as a lost connection.
    assert!(h.events.try_recv().is_err());

    let connecting = {
        let session = h.session.clone();
        tokio::spawn(async move { session.connect().await })
    };
    let mut server = h.backend.accept().await.ok_or("no reconnection")?;
    server.register(NICK).await?;
    connecting.await??;
    assert_eq!(h.backend.attempts(), 2);
    Ok(())
}

#[tokio::test]
async fn link_loss_fails_pending_actions_and_notifies_client() -> TestResult {
    let mut h = connected(SessionConfig::default()).await?;
    h.join("#test").await?;

    let session = h.session.clone();
    let sending = tokio::spawn(async move {
        session
            .send("#test", chatgate::MessageKind::Message, &"bye".into())
            .await
    });
    h.server.read_line().await?;
    h.server.read_ping().await?;
    h.server.close();

    assert!(matches!(sending.await?, Err(SessionError::Disconnected)));
    assert_eq!(h.session.link_state(), LinkState::Disconnected);
    assert!(h.session.joined_rooms().is_empty());

    let event = h.events.recv().await.ok_or("no disconnect notice")?;
    assert_eq!(event.kind, ActivityType::Disconnect);
    assert_eq!(event.actor.kind, EntityKind::Service);
    assert_eq!(
        event.target.map(|target| target.id),
        Some(format!("{NICK}@{HOST}"))
    );
    assert_eq!(event.error.as_deref(), Some("connection closed by server"));
    Ok(())
}

#[tokio::test]
async fn disconnect_event_is_stamped() -> TestResult {
    let mut h = connected(SessionConfig::default()).await?;

    h.server.close();

    let event = h.events.recv().await.ok_or("no disconnect notice")?;
    assert!(!event.published.is_empty());
    assert!(matches!(
        h.session.join("#test").await,
        Err(SessionError::NotConnected)
    ));
    Ok(())
}
