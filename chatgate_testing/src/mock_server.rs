//! In-memory chat server for session tests.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chatgate::{
    codec::LineCodec,
    credentials::ConnectOptions,
    session::{Connector, Transport},
};
use futures::{SinkExt, StreamExt};
use tokio::{
    io::DuplexStream,
    sync::mpsc,
};
use tokio_util::codec::Framed;

use crate::lines;

const DUPLEX_CAPACITY: usize = 64 * 1024;

/// Create a connector and the backend that receives its connections.
#[must_use]
pub fn mock_backend() -> (MockConnector, MockBackend) {
    let (accepted, incoming) = mpsc::unbounded_channel();
    let attempts = Arc::new(AtomicUsize::new(0));
    (
        MockConnector {
            accepted,
            attempts: Arc::clone(&attempts),
            refuse: false,
        },
        MockBackend { incoming, attempts },
    )
}

/// [`Connector`] handing out in-memory streams.
#[derive(Clone, Debug)]
pub struct MockConnector {
    accepted: mpsc::UnboundedSender<MockServer>,
    attempts: Arc<AtomicUsize>,
    refuse: bool,
}

impl MockConnector {
    /// Fail every connection attempt with `ConnectionRefused`.
    #[must_use]
    pub fn refusing(mut self) -> Self {
        self.refuse = true;
        self
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, options: &ConnectOptions) -> io::Result<Box<dyn Transport>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{} refused the connection", options.host),
            ));
        }
        let (client, server) = tokio::io::duplex(DUPLEX_CAPACITY);
        self.accepted
            .send(MockServer::new(server, options.clone()))
            .map_err(|_| io::Error::new(io::ErrorKind::NotConnected, "mock backend dropped"))?;
        Ok(Box::new(client))
    }
}

/// Receiving end of a [`MockConnector`].
#[derive(Debug)]
pub struct MockBackend {
    incoming: mpsc::UnboundedReceiver<MockServer>,
    attempts: Arc<AtomicUsize>,
}

impl MockBackend {
    /// Wait for the next connection.
    pub async fn accept(&mut self) -> Option<MockServer> { self.incoming.recv().await }

    /// Number of connection attempts made so far.
    #[must_use]
    pub fn attempts(&self) -> usize { self.attempts.load(Ordering::SeqCst) }
}

/// Server side of one in-memory connection.
#[derive(Debug)]
pub struct MockServer {
    framed: Framed<DuplexStream, LineCodec>,
    options: ConnectOptions,
}

impl MockServer {
    fn new(stream: DuplexStream, options: ConnectOptions) -> Self {
        Self {
            framed: Framed::new(stream, LineCodec::default()),
            options,
        }
    }

    /// Options the client connected with.
    #[must_use]
    pub fn options(&self) -> &ConnectOptions { &self.options }

    /// Read the next line sent by the client.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedEof` when the client closed the connection.
    pub async fn read_line(&mut self) -> io::Result<String> {
        match self.framed.next().await {
            Some(line) => Ok(line?),
            None => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "client closed the connection",
            )),
        }
    }

    /// Read lines until one starts with `prefix`, returning it.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedEof` when the client closes first.
    pub async fn read_until(&mut self, prefix: &str) -> io::Result<String> {
        loop {
            let line = self.read_line().await?;
            if line.starts_with(prefix) {
                return Ok(line);
            }
        }
    }

    /// Read the next line, which must be a sentinel `PING`, returning its
    /// token.
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` when the line is not a `PING`.
    pub async fn read_ping(&mut self) -> io::Result<String> {
        let line = self.read_line().await?;
        line.strip_prefix("PING ")
            .map(str::to_owned)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, format!("expected PING, got {line}")))
    }

    /// Send one line to the client.
    ///
    /// # Errors
    ///
    /// Returns an error when the client has gone away.
    pub async fn send_line(&mut self, line: impl AsRef<str>) -> io::Result<()> {
        self.framed.send(line.as_ref()).await.map_err(io::Error::from)
    }

    /// Consume the registration lines and confirm registration for `nick`.
    /// Returns the lines the client sent.
    ///
    /// # Errors
    ///
    /// Returns an error when the client closes before sending `USER`.
    pub async fn register(&mut self, nick: &str) -> io::Result<Vec<String>> {
        let mut received = Vec::new();
        loop {
            let line = self.read_line().await?;
            let done = line.starts_with("USER ");
            received.push(line);
            if done {
                break;
            }
        }
        self.send_line(lines::welcome(nick)).await?;
        Ok(received)
    }

    /// Close the connection from the server side.
    pub fn close(self) { drop(self); }
}
