//! Log output for conditions an operator should see.

mod common;

use chatgate::config::SessionConfig;
use chatgate_testing::{LoggerHandle, lines, logger};
use common::{TestResult, connected};
use rstest::rstest;
use serial_test::serial;

#[rstest]
#[tokio::test]
#[serial]
async fn unknown_sentinel_reply_logs_warning(mut logger: LoggerHandle) -> TestResult {
    let mut h = connected(SessionConfig::default()).await?;

    h.server.send_line(lines::pong("sentinel-404")).await?;
    h.server.send_line(lines::ping("sync")).await?;
    assert_eq!(h.server.read_line().await?, "PONG :sync");

    assert!(logger.contains(log::Level::Warn, "heartbeat reply matched no queued action"));
    Ok(())
}

#[rstest]
#[tokio::test]
#[serial]
async fn lost_connection_logs_warning(mut logger: LoggerHandle) -> TestResult {
    let mut h = connected(SessionConfig::default()).await?;

    h.server.close();
    h.events.recv().await.ok_or("no disconnect notice")?;

    assert!(logger.contains(log::Level::Warn, "connection lost"));
    Ok(())
}

#[rstest]
#[tokio::test]
#[serial]
async fn refused_connect_logs_warning(mut logger: LoggerHandle) -> TestResult {
    let (connector, _backend) = chatgate_testing::mock_backend();
    let session = chatgate::Session::builder(chatgate::Credentials::new("me", lines::SERVER))
        .connector(connector.refusing())
        .build();

    assert!(session.connect().await.is_err());

    assert!(logger.contains(log::Level::Warn, "connect failed"));
    Ok(())
}

#[rstest]
#[tokio::test]
#[serial]
async fn reader_panic_is_logged_and_tears_down_link(mut logger: LoggerHandle) -> TestResult {
    let mut h = common::connected_with(|builder| {
        builder.on_signal(|signal| {
            if let chatgate::Signal::Unrecognized(line) = signal {
                assert!(!line.contains("boom"), "observer saw {line}");
            }
        })
    })
    .await?;

    h.server.send_line(":irc.test 999 me :boom").await?;

    let event = h.events.recv().await.ok_or("no disconnect notice")?;
    assert_eq!(event.error.as_deref(), Some("connection reader failed"));
    assert_eq!(h.session.link_state(), chatgate::LinkState::Disconnected);
    assert!(logger.contains(log::Level::Error, "connection reader panicked"));
    Ok(())
}
