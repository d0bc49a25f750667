//! Tests for the `SessionRegistry`.

mod common;

use chatgate::{
    ActorId,
    SessionRegistry,
    config::SessionConfig,
    session::{LinkState, Session},
};
use common::{TestResult, connected};
use rstest::{fixture, rstest};

#[allow(
    unused_braces,
    reason = "rustc false positive for single-line rstest fixtures"
)]
#[fixture]
fn registry() -> SessionRegistry { SessionRegistry::new() }

/// A session stays registered while it has joined rooms.
#[rstest]
#[tokio::test]
async fn sweep_keeps_sessions_with_rooms(registry: SessionRegistry) -> TestResult {
    let mut h = connected(SessionConfig::default()).await?;
    h.join("#test").await?;
    let id = ActorId::new(h.session.actor_id());
    registry.insert(id.clone(), h.session.clone());

    let session: Session = h.session;
    drop(session);
    assert!(registry.sweep_idle().is_empty());
    assert!(registry.get(&id).is_some());
    Ok(())
}

/// An idle session nobody holds is cleaned up and evicted.
#[rstest]
#[tokio::test]
async fn sweep_evicts_and_cleans_up_idle_sessions(registry: SessionRegistry) -> TestResult {
    let mut h = connected(SessionConfig::default()).await?;
    let id = ActorId::new(h.session.actor_id());
    let handle = h.session.clone();
    registry.insert(id.clone(), h.session);

    // The extra handle keeps the session referenced.
    assert!(registry.sweep_idle().is_empty());
    drop(handle);

    assert_eq!(registry.sweep_idle(), vec![id.clone()]);
    assert!(registry.is_empty());
    assert_eq!(h.server.read_line().await?, "QUIT :");
    Ok(())
}

#[rstest]
fn active_ids_are_sorted(registry: SessionRegistry) {
    for nick in ["carol", "alice", "bob"] {
        let credentials = chatgate::Credentials::new(nick, "irc.test");
        registry.insert(ActorId::new(credentials.actor_id()), Session::builder(credentials).build());
    }

    let ids: Vec<_> = registry
        .active_ids()
        .iter()
        .map(|id| id.as_str().to_owned())
        .collect();
    assert_eq!(ids, vec!["alice@irc.test", "bob@irc.test", "carol@irc.test"]);
    assert!(registry.get(&ActorId::from("dave@irc.test")).is_none());
    assert_eq!(
        registry
            .get(&ActorId::from("bob@irc.test"))
            .map(|session| session.link_state()),
        Some(LinkState::Disconnected)
    );
}
