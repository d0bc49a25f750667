//! Routing of parsed signals against a session's queue.

use rstest::{fixture, rstest};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

use super::{
    MessageKind,
    SessionError,
    jobs::{Job, JobKind},
    routing::route,
    state::{Link, SessionState},
};
use crate::{
    credentials::Credentials,
    event::ActivityType,
    parser::LineParser,
};

const HOST: &str = "irc.example.org";

type Outcome = oneshot::Receiver<Result<(), SessionError>>;

struct Fixture {
    state: SessionState,
    parser: LineParser,
    outbound: mpsc::UnboundedReceiver<String>,
}

impl Fixture {
    fn queue(&mut self, kind: JobKind) -> Outcome {
        let (tx, rx) = oneshot::channel();
        let id = self.state.jobs.next_id();
        self.state.jobs.push(Job::new(id, kind, tx));
        rx
    }

    /// Parse `line` and route every signal, returning forwarded events.
    fn feed(&mut self, line: &str) -> Vec<crate::event::NormalizedEvent> {
        let mut signals = Vec::new();
        self.parser.input(line, &mut signals);
        signals
            .into_iter()
            .filter_map(|signal| route(&mut self.state, signal))
            .collect()
    }
}

#[fixture]
#[allow(unused_braces, reason = "rstest fixtures use block bodies")]
fn connected() -> Fixture {
    let mut state = SessionState::new(Credentials::new("me", HOST));
    state.mark_handled();
    let (writer, outbound) = mpsc::unbounded_channel();
    state.link = Some(Link::new(writer, CancellationToken::new(), 1));
    Fixture {
        state,
        parser: LineParser::new("irc", HOST),
        outbound,
    }
}

fn pong(token: &str) -> String { format!(":{HOST} PONG {HOST} :{token}") }

#[rstest]
fn sentinel_reply_resolves_through_its_job(mut connected: Fixture) {
    let mut first = connected.queue(JobKind::Send);
    let mut second = connected.queue(JobKind::Query);
    let mut third = connected.queue(JobKind::Send);

    assert!(connected.feed(&pong("sentinel-2")).is_empty());

    assert!(matches!(first.try_recv(), Ok(Ok(()))));
    assert!(matches!(second.try_recv(), Ok(Ok(()))));
    assert!(third.try_recv().is_err());
    assert_eq!(connected.state.jobs.len(), 1);
}

#[rstest]
fn self_echo_completes_head_and_applies_join(mut connected: Fixture) {
    let mut join = connected.queue(JobKind::Join("#Test".into()));

    let forwarded = connected.feed(":me!u@host JOIN #test");

    assert!(forwarded.is_empty());
    assert!(matches!(join.try_recv(), Ok(Ok(()))));
    assert!(connected.state.is_joined("#TEST"));
    // The sentinel of an echoed action is consumed silently.
    assert!(connected.feed(&pong("sentinel-1")).is_empty());
    assert!(!connected.state.jobs.take_retired("sentinel-1"));
}

#[rstest]
fn self_event_not_matching_head_is_forwarded(mut connected: Fixture) {
    let mut join = connected.queue(JobKind::Join("#a".into()));

    let forwarded = connected.feed(":me!u@host PART #b");

    assert_eq!(forwarded.len(), 1);
    assert_eq!(forwarded[0].kind, ActivityType::Leave);
    assert!(join.try_recv().is_err());
    assert_eq!(connected.state.jobs.len(), 1);
}

#[rstest]
fn foreign_events_are_forwarded(mut connected: Fixture) {
    let mut join = connected.queue(JobKind::Join("#a".into()));

    let forwarded = connected.feed(":bob!b@host JOIN #a");

    assert_eq!(forwarded.len(), 1);
    assert_eq!(forwarded[0].actor.id, format!("bob@{HOST}"));
    assert!(join.try_recv().is_err());
}

#[rstest]
fn error_rejects_head_with_backend_text(mut connected: Fixture) {
    let mut join = connected.queue(JobKind::Join("#banned".into()));
    let mut send = connected.queue(JobKind::Send);

    let forwarded = connected.feed(&format!(
        ":{HOST} 474 me #banned :Cannot join channel (+b)"
    ));

    assert!(forwarded.is_empty());
    match join.try_recv() {
        Ok(Err(SessionError::Rejected(text))) => assert_eq!(text, "Cannot join channel (+b)"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(send.try_recv().is_err());
    assert!(!connected.state.is_joined("#banned"));
}

#[rstest]
fn error_with_empty_queue_is_forwarded(mut connected: Fixture) {
    let forwarded = connected.feed(&format!(":{HOST} 401 me nobody :No such nick/channel"));

    assert_eq!(forwarded.len(), 1);
    assert!(forwarded[0].error.is_some());
}

#[rstest]
#[traced_test]
fn unknown_sentinel_is_logged_and_leaves_queue_alone(mut connected: Fixture) {
    let mut send = connected.queue(JobKind::Send);

    assert!(connected.feed(&pong("sentinel-99")).is_empty());

    assert!(send.try_recv().is_err());
    assert_eq!(connected.state.jobs.len(), 1);
    assert!(logs_contain("heartbeat reply matched no queued action"));
}

#[rstest]
fn server_heartbeat_is_answered_without_resolving(mut connected: Fixture) {
    let mut send = connected.queue(JobKind::Send);

    assert!(connected.feed("PING :keepalive").is_empty());

    assert_eq!(
        connected.outbound.try_recv().ok().as_deref(),
        Some("PONG :keepalive")
    );
    assert!(send.try_recv().is_err());
}

#[rstest]
fn unsolicited_rename_updates_identity(mut connected: Fixture) {
    let forwarded = connected.feed(":me!u@host NICK :guest42");

    assert_eq!(forwarded.len(), 1);
    assert_eq!(connected.state.nick, "guest42");
    assert!(
        connected
            .state
            .handled_actors
            .contains(&format!("guest42@{HOST}"))
    );
    assert!(!connected.state.handled_actors.contains(&format!("me@{HOST}")));
}

#[rstest]
#[case(MessageKind::Message, "hello", MessageKind::Message, "hello")]
#[case(MessageKind::Message, "/me waves", MessageKind::Me, "waves")]
#[case(MessageKind::Message, "/notice heads up", MessageKind::Notice, "heads up")]
#[case(MessageKind::Notice, "plain", MessageKind::Notice, "plain")]
#[case(MessageKind::Message, "/mean", MessageKind::Message, "/mean")]
fn classify_strips_command_prefixes(
    #[case] kind: MessageKind,
    #[case] text: &str,
    #[case] expected_kind: MessageKind,
    #[case] expected_text: &str,
) {
    assert_eq!(kind.classify(text), (expected_kind, expected_text));
}

#[rstest]
#[case("me", MessageKind::Me)]
#[case("notice", MessageKind::Notice)]
#[case("message", MessageKind::Message)]
#[case("anything", MessageKind::Message)]
fn object_type_selects_kind(#[case] kind: &str, #[case] expected: MessageKind) {
    assert_eq!(MessageKind::from_object_type(kind), expected);
}
