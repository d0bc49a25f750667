//! Reader and writer tasks serving one live connection.

use std::{
    num::NonZeroU32,
    panic::AssertUnwindSafe,
    sync::{Arc, Weak},
    time::Duration,
};

use futures::{FutureExt, Sink, SinkExt, Stream, StreamExt};
use leaky_bucket::RateLimiter;
use tokio::sync::mpsc;
use tokio_util::{codec::Framed, sync::CancellationToken};
use tracing::{debug, error, warn};

use super::{Session, SessionInner, state::Link, transport::Transport};
use crate::{
    bus::EventBus,
    codec::{CodecError, LineCodec},
    metrics,
    panic::format_panic,
    parser::LineParser,
};

/// Start the tasks for a registered connection and return the link that
/// controls them.
pub(super) fn spawn(
    framed: Framed<Box<dyn Transport>, LineCodec>,
    parser: LineParser,
    inner: &Arc<SessionInner>,
    generation: u64,
    rate: Option<NonZeroU32>,
) -> Link {
    let (sink, stream) = framed.split();
    let (writer, lines) = mpsc::unbounded_channel();
    let shutdown = CancellationToken::new();
    let limiter = rate.map(|rate| {
        let rate = usize::try_from(rate.get()).unwrap_or(usize::MAX);
        RateLimiter::builder()
            .initial(rate)
            .refill(rate)
            .interval(Duration::from_secs(1))
            .max(rate)
            .build()
    });
    tokio::spawn(run_writer(sink, lines, limiter));

    let mut bus = EventBus::new();
    if let Some(observer) = inner.hooks.on_signal.clone() {
        bus.subscribe(move |signal| observer(signal));
    }
    let session = Arc::downgrade(inner);
    let reader = run_reader(stream, parser, bus, session.clone(), shutdown.clone(), generation);
    tokio::spawn(async move {
        if let Err(panic) = AssertUnwindSafe(reader).catch_unwind().await {
            metrics::inc_reader_panics();
            let message = format_panic(panic.as_ref());
            error!(panic = %message, generation, "connection reader panicked");
            if let Some(inner) = session.upgrade() {
                Session { inner }.on_link_lost(generation, "connection reader failed");
            }
        }
    });

    Link::new(writer, shutdown, generation)
}

async fn run_writer<S>(
    mut sink: S,
    mut lines: mpsc::UnboundedReceiver<String>,
    limiter: Option<RateLimiter>,
) where
    S: Sink<String, Error = CodecError> + Unpin,
{
    while let Some(line) = lines.recv().await {
        if let Some(limiter) = &limiter {
            limiter.acquire(1).await;
        }
        if let Err(err) = sink.send(line).await {
            if err.is_recoverable() {
                warn!(error = %err, "dropping unframeable line");
                continue;
            }
            warn!(error = %err, "write failed, stopping writer");
            break;
        }
    }
    if let Err(err) = sink.close().await {
        debug!(error = %err, "closing transport failed");
    }
}

async fn run_reader<S>(
    mut stream: S,
    mut parser: LineParser,
    mut bus: EventBus,
    session: Weak<SessionInner>,
    shutdown: CancellationToken,
    generation: u64,
) where
    S: Stream<Item = Result<String, CodecError>> + Unpin,
{
    let reason = loop {
        let item = tokio::select! {
            () = shutdown.cancelled() => return,
            item = stream.next() => item,
        };
        match item {
            Some(Ok(line)) => {
                parser.input(&line, &mut bus);
                let Some(inner) = session.upgrade() else {
                    return;
                };
                let session = Session { inner };
                for signal in bus.drain() {
                    session.route(signal);
                }
            }
            Some(Err(err)) if err.is_recoverable() => {
                warn!(error = %err, "skipping malformed inbound line");
            }
            Some(Err(err)) => break format!("read failed: {err}"),
            None => break "connection closed by server".to_owned(),
        }
    };
    if let Some(inner) = session.upgrade() {
        Session { inner }.on_link_lost(generation, &reason);
    }
}
